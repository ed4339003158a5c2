//! The SH representation: child lookup is a hash table over edge records
//! keyed by (parent node, first edge letter). The letter is part of the
//! key but never stored — a probed slot is confirmed by re-deriving the
//! letter of the stored target from the window, so the table holds nothing
//! that edge-label maintenance would have to rewrite.
//!
//! Collision handling follows the configured [`Resolution`]: cuckoo
//! displacement over k prime-sized partitions with a rotating eviction
//! schedule, or double hashing with vacant tombstones. Rehashing builds a
//! fresh table with new random parameters and reinserts every record; node
//! ids are untouched by it.

use log::debug;
use rand::thread_rng;

use super::*;
use crate::hashing::{edge_key, HashError, HashSettings, Resolution};
use crate::unit::CodeUnit;
use crate::window::Window;

/// Cuckoo displacement budget, and the rehash attempt budget.
const DISPLACEMENT_BUDGET: u32 = 1024;
const REHASH_ATTEMPTS: u32 = 1024;

/// An edge table slot. Empty slots are all-zero; a vacant slot (double
/// hashing tombstone) has `source == 0` with the stale target left behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeCell {
    source: u32,
    target: NodeRef,
}

impl EdgeCell {
    fn is_empty(&self) -> bool {
        self.source == 0 && self.target == NodeRef::None
    }

    fn is_vacant(&self) -> bool {
        self.source == 0 && self.target != NodeRef::None
    }

    fn is_occupied(&self) -> bool {
        self.source != 0
    }
}

#[derive(Debug, Clone, Copy)]
struct HashedBranch {
    core: BranchCore,
    children: u32,
}

pub struct HashedTree<C: CodeUnit> {
    branches: Vec<HashedBranch>,
    released: Vec<u32>,
    /// Leaf parents; 0 marks an empty slot.
    leaves: Vec<u32>,
    ring: LeafRing,
    cells: Vec<EdgeCell>,
    settings: HashSettings,
    functions: u32,
    occupancy: usize,
    rehashes: u32,
    _unit: std::marker::PhantomData<C>,
}

impl<C: CodeUnit> HashedTree<C> {
    pub fn new(
        leaf_capacity: u32,
        resolution: Resolution,
        functions: u32,
        edge_capacity: usize,
    ) -> Result<Self, TreeError> {
        let mut rng = thread_rng();
        let settings = HashSettings::new(resolution, edge_capacity, functions, &mut rng)?;
        let root = HashedBranch {
            core: BranchCore {
                parent: 0,
                credit: false,
                depth: 0,
                head: 1,
                link: 0,
            },
            children: 0,
        };
        let released_rec = HashedBranch {
            core: BranchCore::released(),
            children: 0,
        };
        Ok(HashedTree {
            branches: vec![released_rec, root],
            released: Vec::new(),
            leaves: vec![0; leaf_capacity as usize + 1],
            ring: LeafRing::new(leaf_capacity),
            cells: vec![EdgeCell::default(); settings.table_size()],
            settings,
            functions,
            occupancy: 0,
            rehashes: 0,
            _unit: std::marker::PhantomData,
        })
    }

    /// How often the edge table has been rebuilt.
    pub fn rehash_count(&self) -> u32 {
        self.rehashes
    }

    pub fn table_size(&self) -> usize {
        self.settings.table_size()
    }

    /// Recompute the hash key of an occupied cell from the window.
    fn cell_key(&self, w: &Window<C>, cell: EdgeCell) -> u64 {
        let parent_depth = self.core(BranchId(cell.source)).depth;
        let letter = self.edge_first_letter(w, parent_depth, cell.target);
        edge_key(cell.source, letter.to_u32())
    }

    /// Slot index of the edge `(source, letter)`, if present.
    fn locate(&self, w: &Window<C>, source: u32, letter: C) -> Option<usize> {
        let key = edge_key(source, letter.to_u32());
        match self.settings.resolution() {
            Resolution::Cuckoo => {
                for i in 0..self.functions as usize {
                    let idx = self.settings.cuckoo_index(i, key);
                    let cell = self.cells[idx];
                    if cell.is_occupied()
                        && cell.source == source
                        && self.matches_letter(w, cell, letter)
                    {
                        return Some(idx);
                    }
                }
                None
            }
            Resolution::Double => {
                let size = self.settings.table_size();
                let mut idx = self.settings.primary(key);
                let step = self.settings.secondary(key);
                for _ in 0..size {
                    let cell = self.cells[idx];
                    if cell.is_empty() {
                        return None;
                    }
                    if cell.is_occupied()
                        && cell.source == source
                        && self.matches_letter(w, cell, letter)
                    {
                        return Some(idx);
                    }
                    idx = (idx + step) % size;
                }
                None
            }
        }
    }

    fn matches_letter(&self, w: &Window<C>, cell: EdgeCell, letter: C) -> bool {
        let parent_depth = self.core(BranchId(cell.source)).depth;
        self.edge_first_letter(w, parent_depth, cell.target) == letter
    }

    fn ht_insert(
        &mut self,
        w: &Window<C>,
        source: u32,
        letter: C,
        target: NodeRef,
        rehash_allowed: bool,
    ) -> Result<(), TreeError> {
        let key = edge_key(source, letter.to_u32());
        match self.settings.resolution() {
            Resolution::Double => {
                if rehash_allowed && (self.occupancy + 1) * 4 > self.settings.table_size() * 3 {
                    self.rehash(w, (self.occupancy + 1) * 2, None)?;
                }
                let size = self.settings.table_size();
                let mut idx = self.settings.primary(key);
                let step = self.settings.secondary(key);
                let mut first_vacant = None;
                for _ in 0..size {
                    let cell = self.cells[idx];
                    if cell.is_empty() {
                        let slot = first_vacant.unwrap_or(idx);
                        self.cells[slot] = EdgeCell { source, target };
                        self.occupancy += 1;
                        return Ok(());
                    }
                    if cell.is_vacant() {
                        if first_vacant.is_none() {
                            first_vacant = Some(idx);
                        }
                    } else if cell.source == source && self.matches_letter(w, cell, letter) {
                        self.cells[idx].target = target;
                        return Ok(());
                    }
                    idx = (idx + step) % size;
                }
                if let Some(slot) = first_vacant {
                    self.cells[slot] = EdgeCell { source, target };
                    self.occupancy += 1;
                    return Ok(());
                }
                if rehash_allowed {
                    self.rehash(w, (self.occupancy + 1) * 2, None)?;
                    self.ht_insert(w, source, letter, target, false)
                } else {
                    Err(TreeError::Table(HashError::TableFull))
                }
            }
            Resolution::Cuckoo => {
                let k = self.functions as usize;
                // an existing record for the key is overwritten in place
                for i in 0..k {
                    let idx = self.settings.cuckoo_index(i, key);
                    let cell = self.cells[idx];
                    if cell.is_occupied()
                        && cell.source == source
                        && self.matches_letter(w, cell, letter)
                    {
                        self.cells[idx].target = target;
                        return Ok(());
                    }
                }
                for i in 0..k {
                    let idx = self.settings.cuckoo_index(i, key);
                    if self.cells[idx].is_empty() {
                        self.cells[idx] = EdgeCell { source, target };
                        self.occupancy += 1;
                        return Ok(());
                    }
                }
                // displace, walking the functions backwards from the last
                let original_key = key;
                let mut current = EdgeCell { source, target };
                let mut current_key = key;
                let mut fi = k - 1;
                for _ in 0..DISPLACEMENT_BUDGET {
                    let idx = self.settings.cuckoo_index(fi, current_key);
                    std::mem::swap(&mut self.cells[idx], &mut current);
                    if current.is_empty() {
                        self.occupancy += 1;
                        return Ok(());
                    }
                    current_key = self.cell_key(w, current);
                    if current_key == original_key {
                        // displacement came full circle: restore and bail
                        std::mem::swap(&mut self.cells[idx], &mut current);
                        break;
                    }
                    for i in 0..k {
                        let idx2 = self.settings.cuckoo_index(i, current_key);
                        if self.cells[idx2].is_empty() {
                            self.cells[idx2] = current;
                            self.occupancy += 1;
                            return Ok(());
                        }
                    }
                    fi = (fi + k - 1) % k;
                }
                if rehash_allowed {
                    let grow = if (self.occupancy + 1) * 3 > self.settings.table_size() {
                        self.settings.table_size() * 2
                    } else {
                        self.settings.table_size()
                    };
                    self.rehash(w, grow, Some(current))?;
                    Ok(())
                } else {
                    Err(TreeError::Table(HashError::TableFull))
                }
            }
        }
    }

    fn ht_remove(&mut self, w: &Window<C>, source: u32, letter: C) -> Result<(), TreeError> {
        let idx = self
            .locate(w, source, letter)
            .ok_or(TreeError::MissingChild {
                parent: BranchId(source),
                letter: letter.to_u32(),
            })?;
        match self.settings.resolution() {
            Resolution::Cuckoo => {
                self.cells[idx] = EdgeCell::default();
            }
            Resolution::Double => {
                // tombstone: keep the stale target so the slot reads as
                // vacant, not empty, and probes continue past it
                debug_assert!(self.cells[idx].target != NodeRef::None);
                self.cells[idx].source = 0;
            }
        }
        self.occupancy -= 1;
        Ok(())
    }

    /// Rebuild the table with fresh parameters, reinserting every record
    /// (plus a displaced in-flight record, when a cuckoo insert aborted).
    fn rehash(
        &mut self,
        w: &Window<C>,
        capacity: usize,
        pending: Option<EdgeCell>,
    ) -> Result<(), TreeError> {
        // keys must be derived before the old table is torn down
        let mut records: Vec<(u64, EdgeCell)> = Vec::with_capacity(self.occupancy + 1);
        for cell in &self.cells {
            if cell.is_occupied() {
                records.push((self.cell_key(w, *cell), *cell));
            }
        }
        if let Some(cell) = pending {
            records.push((self.cell_key(w, cell), cell));
        }
        let mut rng = thread_rng();
        for _ in 0..REHASH_ATTEMPTS {
            let settings = HashSettings::new(
                self.settings.resolution(),
                capacity.max(records.len()),
                self.functions,
                &mut rng,
            )?;
            let mut fresh = vec![EdgeCell::default(); settings.table_size()];
            if Self::refill(&settings, self.functions as usize, &mut fresh, &records) {
                debug!(
                    "edge table rehashed: {} records into {} slots",
                    records.len(),
                    fresh.len()
                );
                self.settings = settings;
                self.cells = fresh;
                self.occupancy = records.len();
                self.rehashes += 1;
                return Ok(());
            }
        }
        Err(TreeError::Table(HashError::RehashFailed {
            attempts: REHASH_ATTEMPTS,
        }))
    }

    /// Insert precomputed records into a fresh table; false when a
    /// displacement chain cannot be placed.
    fn refill(
        settings: &HashSettings,
        k: usize,
        cells: &mut [EdgeCell],
        records: &[(u64, EdgeCell)],
    ) -> bool {
        // keys tracked alongside, so displacement needs no re-derivation
        let mut keys: Vec<u64> = vec![0; cells.len()];
        'record: for &(key, cell) in records {
            match settings.resolution() {
                Resolution::Double => {
                    let size = settings.table_size();
                    let mut idx = settings.primary(key);
                    let step = settings.secondary(key);
                    for _ in 0..size {
                        if cells[idx].is_empty() {
                            cells[idx] = cell;
                            keys[idx] = key;
                            continue 'record;
                        }
                        idx = (idx + step) % size;
                    }
                    return false;
                }
                Resolution::Cuckoo => {
                    let mut current = cell;
                    let mut current_key = key;
                    let mut fi = k - 1;
                    let mut placed = false;
                    'chain: for _ in 0..DISPLACEMENT_BUDGET {
                        for i in 0..k {
                            let idx = settings.cuckoo_index(i, current_key);
                            if cells[idx].is_empty() {
                                cells[idx] = current;
                                keys[idx] = current_key;
                                placed = true;
                                break 'chain;
                            }
                        }
                        let idx = settings.cuckoo_index(fi, current_key);
                        std::mem::swap(&mut cells[idx], &mut current);
                        std::mem::swap(&mut keys[idx], &mut current_key);
                        fi = (fi + k - 1) % k;
                    }
                    if !placed {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl<C: CodeUnit> TreeStore<C> for HashedTree<C> {
    fn core(&self, b: BranchId) -> &BranchCore {
        let rec = &self.branches[b.0 as usize];
        debug_assert!(rec.core.is_live() || b == BranchId::ROOT);
        &rec.core
    }

    fn core_mut(&mut self, b: BranchId) -> &mut BranchCore {
        &mut self.branches[b.0 as usize].core
    }

    fn ring(&self) -> &LeafRing {
        &self.ring
    }

    fn ring_mut(&mut self) -> &mut LeafRing {
        &mut self.ring
    }

    fn leaf_parent(&self, l: LeafId) -> Option<BranchId> {
        let p = self.leaves[l.0 as usize];
        if p == 0 {
            None
        } else {
            Some(BranchId(p))
        }
    }

    fn set_leaf_parent(&mut self, l: LeafId, p: BranchId) {
        self.leaves[l.0 as usize] = p.0;
    }

    fn create_branch(&mut self, parent: BranchId, depth: u32, head: u32) -> BranchId {
        let record = HashedBranch {
            core: BranchCore {
                parent: parent.0,
                credit: false,
                depth,
                head,
                link: 0,
            },
            children: 0,
        };
        match self.released.pop() {
            Some(slot) => {
                self.branches[slot as usize] = record;
                BranchId(slot)
            }
            None => {
                self.branches.push(record);
                BranchId(self.branches.len() as u32 - 1)
            }
        }
    }

    fn release_branch(&mut self, b: BranchId) {
        debug_assert!(b != BranchId::ROOT);
        self.branches[b.0 as usize] = HashedBranch {
            core: BranchCore::released(),
            children: 0,
        };
        self.released.push(b.0);
    }

    fn create_leaf(&mut self, parent: BranchId) -> Result<LeafId, TreeError> {
        let slot = self.ring.push().ok_or(TreeError::LeafRingFull)?;
        self.leaves[slot as usize] = parent.0;
        Ok(LeafId(slot))
    }

    fn clear_leaf(&mut self, l: LeafId) {
        self.leaves[l.0 as usize] = 0;
    }

    fn child_by_letter(&self, w: &Window<C>, parent: BranchId, letter: C) -> NodeRef {
        match self.locate(w, parent.0, letter) {
            Some(idx) => self.cells[idx].target,
            None => NodeRef::None,
        }
    }

    fn insert_child(
        &mut self,
        w: &Window<C>,
        parent: BranchId,
        letter: C,
        child: NodeRef,
    ) -> Result<(), TreeError> {
        debug_assert_eq!(self.child_by_letter(w, parent, letter), NodeRef::None);
        self.ht_insert(w, parent.0, letter, child, true)?;
        self.branches[parent.0 as usize].children += 1;
        Ok(())
    }

    fn remove_child(
        &mut self,
        w: &Window<C>,
        parent: BranchId,
        letter: C,
        child: NodeRef,
    ) -> Result<(), TreeError> {
        match self.locate(w, parent.0, letter) {
            Some(idx) if self.cells[idx].target == child => {
                self.ht_remove(w, parent.0, letter)?;
                self.branches[parent.0 as usize].children -= 1;
                Ok(())
            }
            _ => Err(TreeError::WrongChild {
                parent,
                expected: child,
            }),
        }
    }

    fn replace_child(
        &mut self,
        w: &Window<C>,
        parent: BranchId,
        letter: C,
        old: NodeRef,
        new: NodeRef,
    ) -> Result<(), TreeError> {
        let idx = self
            .locate(w, parent.0, letter)
            .ok_or(TreeError::MissingChild {
                parent,
                letter: letter.to_u32(),
            })?;
        if self.cells[idx].target != old {
            return Err(TreeError::WrongChild {
                parent,
                expected: old,
            });
        }
        self.cells[idx].target = new;
        Ok(())
    }

    fn child_count(&self, _w: &Window<C>, parent: BranchId) -> u32 {
        self.branches[parent.0 as usize].children
    }

    fn take_sole_child(&mut self, w: &Window<C>, parent: BranchId) -> Result<NodeRef, TreeError> {
        if self.branches[parent.0 as usize].children != 1 {
            return Err(TreeError::NotABranch {
                node: NodeRef::Branch(parent),
            });
        }
        // The head position of `parent` names an occurrence of its path;
        // the cell one past that occurrence is usually the letter of the
        // surviving edge. When the head is stale (batch maintenance) or
        // names the suffix being retired, fall back to a table sweep.
        let core = self.branches[parent.0 as usize].core;
        let hint = w.cell(w.advance(core.head, core.depth));
        let found = match self.locate(w, parent.0, hint) {
            Some(idx) => Some((idx, hint)),
            None => {
                let mut hit = None;
                for (idx, cell) in self.cells.iter().enumerate() {
                    if cell.is_occupied() && cell.source == parent.0 {
                        let letter = self.edge_first_letter(w, core.depth, cell.target);
                        hit = Some((idx, letter));
                        break;
                    }
                }
                hit
            }
        };
        let (_, letter) = found.ok_or(TreeError::NotABranch {
            node: NodeRef::Branch(parent),
        })?;
        let idx = self.locate(w, parent.0, letter).expect("edge just seen");
        let child = self.cells[idx].target;
        self.ht_remove(w, parent.0, letter)?;
        self.branches[parent.0 as usize].children -= 1;
        Ok(child)
    }

    fn for_each_edge<F: FnMut(BranchId, NodeRef)>(&self, _w: &Window<C>, mut f: F) {
        for cell in &self.cells {
            if cell.is_occupied() {
                f(BranchId(cell.source), cell.target);
            }
        }
    }

    fn branch_count(&self) -> u32 {
        (self.branches.len() - 1 - self.released.len()) as u32
    }
}
