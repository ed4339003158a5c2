//! The on-line construction and maintenance engine.
//!
//! Ukkonen's algorithm over the circular window. The engine tracks the
//! *active point*: `active_node` is the deepest branching node on the path
//! of the longest not-yet-explicit suffix, and `active_index` is the window
//! offset one past the last matched code unit of that suffix (the matched
//! frontier). The identity
//!
//! `active_index = starting_position + <depth of the active point>`
//!
//! holds whenever the engine is quiescent, and the point is always
//! canonical: either at `active_node` itself or strictly inside one of its
//! edges.
//!
//! Per new code unit, [`Engine::prolong_suffixes`] runs extensions until a
//! rule-3 termination; each rule-2 extension makes one suffix explicit and
//! moves to the next via a suffix-link hop (top-down simulation descends
//! from the hop target by depth, the minimized-branching variation instead
//! climbs from below, [`Algorithm::BottomUp`]). Once the window is
//! saturated, [`Engine::delete_longest_suffix`] retires the oldest suffix
//! after every extension, shrinking the tree from the far side.

use std::fmt;

use crate::tree::{BranchId, LeafId, NodeRef, TreeError, TreeStore};
use crate::unit::CodeUnit;
use crate::upkeep::Upkeep;
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Suffix-link simulation descends from the hop target (`U`).
    TopDown,
    /// Minimized branching: climb from the split edge's old target (`UB`).
    BottomUp,
}

#[derive(Debug)]
pub enum EngineError {
    Tree(TreeError),
    /// A suffix link that must exist is missing.
    MissingLink { node: BranchId },
    /// Depth navigation walked off the structure.
    BrokenPath { node: BranchId, target_depth: u32 },
    /// `delete_longest_suffix` on an empty tree.
    NothingToDelete,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Tree(e) => write!(f, "tree structure: {}", e),
            EngineError::MissingLink { node } => {
                write!(f, "branching node {} has no suffix link", node.0)
            }
            EngineError::BrokenPath { node, target_depth } => write!(
                f,
                "no path of depth {} below node {}",
                target_depth, node.0
            ),
            EngineError::NothingToDelete => write!(f, "no suffix left to delete"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<TreeError> for EngineError {
    fn from(e: TreeError) -> Self {
        EngineError::Tree(e)
    }
}

/// A suffix-link source still waiting for its target to exist.
#[derive(Debug, Clone, Copy)]
struct PendingLink {
    source: BranchId,
    target_depth: u32,
}

enum Extension {
    /// Rule 2 applied; the next shorter suffix is up.
    Continue,
    /// Rule 3: this and every shorter suffix are already present.
    Done,
}

pub struct Engine {
    algorithm: Algorithm,
    upkeep: Upkeep,
    /// First window offset of the longest suffix without an explicit leaf.
    pub starting_position: u32,
    pub active_node: BranchId,
    pub active_index: u32,
    pending: Option<PendingLink>,
}

impl Engine {
    pub fn new(algorithm: Algorithm, upkeep: Upkeep) -> Self {
        Engine {
            algorithm,
            upkeep,
            starting_position: 1,
            active_node: BranchId::ROOT,
            active_index: 1,
            pending: None,
        }
    }

    pub fn upkeep(&self) -> Upkeep {
        self.upkeep
    }

    /// Satisfy a pending suffix link if `node` sits at its target depth.
    fn arrive<C: CodeUnit, S: TreeStore<C>>(&mut self, tree: &mut S, node: BranchId) {
        if let Some(p) = self.pending {
            if tree.depth(node) == p.target_depth {
                tree.set_link(p.source, node);
                self.pending = None;
            }
        }
    }

    /// Descend from `node` to the unique point at `target_depth` on the
    /// current suffix's path, choosing edges by depth alone and reading one
    /// window cell per node. `pos` is the window offset of the first code
    /// unit below `node`. Returns the deepest branching node at or above
    /// the target; the point sits inside one of its edges when the node is
    /// shallower than the target.
    fn go_down<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        w: &Window<C>,
        mut node: BranchId,
        target_depth: u32,
        mut pos: u32,
    ) -> Result<BranchId, EngineError> {
        loop {
            let depth = tree.depth(node);
            if depth == target_depth {
                self.arrive(tree, node);
                return Ok(node);
            }
            debug_assert!(depth < target_depth);
            let letter = w.cell(pos);
            match tree.child_by_letter(w, node, letter) {
                NodeRef::None => {
                    return Err(EngineError::BrokenPath { node, target_depth });
                }
                NodeRef::Branch(child) => {
                    let child_depth = tree.depth(child);
                    if child_depth <= target_depth {
                        pos = w.advance(pos, child_depth - depth);
                        node = child;
                    } else {
                        // the target point is inside this edge
                        return Ok(node);
                    }
                }
                NodeRef::Leaf(leaf) => {
                    let leaf_depth = w.dist(tree.leaf_start(w, leaf), w.ap_end);
                    if leaf_depth >= target_depth {
                        return Ok(node);
                    }
                    return Err(EngineError::BrokenPath { node, target_depth });
                }
            }
        }
    }

    /// Climb from `node` until its depth is at most `target_depth`.
    fn go_up<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        mut node: BranchId,
        target_depth: u32,
    ) -> Result<BranchId, EngineError> {
        loop {
            let depth = tree.depth(node);
            if depth <= target_depth {
                if depth == target_depth {
                    self.arrive(tree, node);
                }
                return Ok(node);
            }
            node = tree.parent(node).ok_or(EngineError::BrokenPath {
                node,
                target_depth,
            })?;
        }
    }

    /// Rule 2 without a matching child: a new leaf directly under `node`.
    fn extend_leaf<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        w: &Window<C>,
        node: BranchId,
    ) -> Result<(), EngineError> {
        self.arrive(tree, node);
        let sp = self.starting_position;
        let depth = tree.depth(node);
        let leaf = tree.create_leaf(node)?;
        tree.insert_child(w, node, w.cell(w.advance(sp, depth)), NodeRef::Leaf(leaf))?;
        self.upkeep.on_new_leaf(tree, w, node, sp);
        self.starting_position = w.advance(sp, 1);
        if node != BranchId::ROOT {
            self.active_node = tree.link(node).ok_or(EngineError::MissingLink { node })?;
        }
        self.active_index = w.advance(
            self.starting_position,
            tree.depth(self.active_node),
        );
        Ok(())
    }

    /// Rule 2 inside the edge `node -> old_target`: split after `matched`
    /// edge units, hang the new suffix's leaf off the split node, then
    /// simulate the suffix link to reach the next suffix's point.
    fn split_edge<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        w: &Window<C>,
        node: BranchId,
        old_target: NodeRef,
        matched: u32,
    ) -> Result<(), EngineError> {
        let sp = self.starting_position;
        let parent_depth = tree.depth(node);
        let split_depth = parent_depth + matched;
        let edge_letter = w.cell(w.advance(sp, parent_depth));

        let split = tree.create_branch(node, split_depth, sp);
        tree.replace_child(w, node, edge_letter, old_target, NodeRef::Branch(split))?;

        // reattach the old target below the split node
        let old_start = match old_target {
            NodeRef::Branch(b) => tree.head(b),
            NodeRef::Leaf(l) => tree.leaf_start(w, l),
            NodeRef::None => unreachable!("split of an absent edge"),
        };
        let reattach_letter = w.cell(w.advance(old_start, split_depth));
        tree.insert_child(w, split, reattach_letter, old_target)?;
        match old_target {
            NodeRef::Branch(b) => tree.set_parent(b, split),
            NodeRef::Leaf(l) => tree.set_leaf_parent(l, split),
            NodeRef::None => unreachable!(),
        }

        // the new suffix's leaf
        let leaf = tree.create_leaf(split)?;
        tree.insert_child(w, split, w.cell(w.advance(sp, split_depth)), NodeRef::Leaf(leaf))?;
        self.upkeep.on_new_leaf(tree, w, split, sp);

        // a pending source whose target depth the split just realized
        if let Some(p) = self.pending.take() {
            if p.target_depth == split_depth {
                tree.set_link(p.source, split);
            } else {
                debug_assert!(false, "pending link skipped a depth");
                self.pending = Some(p);
            }
        }
        if split_depth == 1 {
            tree.set_link(split, BranchId::ROOT);
        } else {
            self.pending = Some(PendingLink {
                source: split,
                target_depth: split_depth - 1,
            });
        }

        // move to the next suffix
        let target_depth = split_depth - 1;
        self.starting_position = w.advance(sp, 1);
        match self.algorithm {
            Algorithm::TopDown => {
                let (from, pos) = if node == BranchId::ROOT {
                    (BranchId::ROOT, w.advance(sp, 1))
                } else {
                    let hop = tree.link(node).ok_or(EngineError::MissingLink { node })?;
                    (hop, w.advance(sp, parent_depth))
                };
                self.active_node = self.go_down(tree, w, from, target_depth, pos)?;
            }
            Algorithm::BottomUp => {
                let from = match old_target {
                    NodeRef::Branch(b) => {
                        tree.link(b).ok_or(EngineError::MissingLink { node: b })?
                    }
                    NodeRef::Leaf(l) => {
                        // the leaf of the one-unit-shorter suffix; climbing
                        // from its parent crosses the sought node
                        let shallower = LeafId(tree.ring().next(l.0));
                        tree.leaf_parent(shallower)
                            .ok_or(TreeError::EmptyLeafSlot { slot: shallower })?
                    }
                    NodeRef::None => unreachable!(),
                };
                self.active_node = self.go_up(tree, from, target_depth)?;
            }
        }
        self.active_index = w.advance(self.starting_position, target_depth);
        Ok(())
    }

    /// One extension step for the suffix at `starting_position`.
    fn prolong_suffix<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        w: &Window<C>,
    ) -> Result<Extension, EngineError> {
        let ep = w.ap_end;
        let sp = self.starting_position;
        if sp == ep {
            // every suffix is explicit; the empty suffix lives at the root
            self.active_node = BranchId::ROOT;
            self.active_index = ep;
            return Ok(Extension::Done);
        }
        let node = self.active_node;
        let depth = tree.depth(node);
        let base = w.advance(sp, depth);
        let on_edge = w.dist(base, self.active_index);
        debug_assert_eq!(w.dist(self.active_index, ep), 1);

        if on_edge == 0 {
            // the point is at `node` itself
            let next = w.cell(self.active_index);
            match tree.child_by_letter(w, node, next) {
                NodeRef::None => {
                    self.extend_leaf(tree, w, node)?;
                    Ok(Extension::Continue)
                }
                child => {
                    // rule 3 off a node: absorb the unit into the edge
                    self.absorb(tree, w, node, child, 1);
                    Ok(Extension::Done)
                }
            }
        } else {
            // the point is inside the edge picked by the base letter
            let child = tree.child_by_letter(w, node, w.cell(base));
            if child == NodeRef::None {
                return Err(EngineError::BrokenPath {
                    node,
                    target_depth: depth + on_edge,
                });
            }
            let edge_start = match child {
                NodeRef::Branch(b) => w.advance(tree.head(b), depth),
                NodeRef::Leaf(l) => w.advance(tree.leaf_start(w, l), depth),
                NodeRef::None => unreachable!(),
            };
            let edge_unit = w.cell(w.advance(edge_start, on_edge));
            if edge_unit == w.cell(self.active_index) {
                // rule 3 inside the edge
                self.absorb(tree, w, node, child, on_edge + 1);
                Ok(Extension::Done)
            } else {
                self.split_edge(tree, w, node, child, on_edge)?;
                Ok(Extension::Continue)
            }
        }
    }

    /// Rule 3: the next code unit continues inside the structure. Move the
    /// matched frontier over it and re-canonicalize the point.
    fn absorb<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        w: &Window<C>,
        node: BranchId,
        child: NodeRef,
        new_on_edge: u32,
    ) {
        self.active_index = w.advance(self.active_index, 1);
        if let NodeRef::Branch(b) = child {
            let edge_len = tree.depth(b) - tree.depth(node);
            debug_assert!(new_on_edge <= edge_len);
            if new_on_edge == edge_len {
                // landed exactly on the child node
                self.arrive(tree, b);
                self.active_node = b;
            }
        }
        // a leaf edge is open-ended; the point stays inside it and the
        // edge grows with the window
        debug_assert!(self.pending.is_none());
    }

    /// Fold the code unit at the old `ap_end` into the tree. The window
    /// must already have been grown over it.
    pub fn prolong_suffixes<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        w: &Window<C>,
    ) -> Result<(), EngineError> {
        loop {
            match self.prolong_suffix(tree, w)? {
                Extension::Continue => {}
                Extension::Done => return Ok(()),
            }
        }
    }

    /// Retire the longest suffix: drop (or shorten) the deepest leaf,
    /// contract its parent if that leaves a unary node, advance the leaf
    /// ring and the window.
    pub fn delete_longest_suffix<C: CodeUnit, S: TreeStore<C>>(
        &mut self,
        tree: &mut S,
        w: &mut Window<C>,
    ) -> Result<(), EngineError> {
        if tree.ring().live == 0 {
            return Err(EngineError::NothingToDelete);
        }
        let ep = w.ap_end;
        let leaf = LeafId(tree.ring().first);
        let parent = tree
            .leaf_parent(leaf)
            .ok_or(TreeError::EmptyLeafSlot { slot: leaf })?;
        let parent_depth = tree.depth(parent);

        let base = w.advance(self.starting_position, tree.depth(self.active_node));
        let on_edge = w.dist(base, self.active_index);
        let point_on_leaf_edge = self.active_node == parent
            && on_edge > 0
            && tree.child_by_letter(w, parent, w.cell(base)) == NodeRef::Leaf(leaf);

        if point_on_leaf_edge {
            // The active point sits on the edge into the deepest leaf: keep
            // the edge but hand it to a new, shallower leaf for the suffix
            // at starting_position, which thereby becomes explicit.
            let sp = self.starting_position;
            let replacement = tree.create_leaf(parent)?;
            tree.replace_child(
                w,
                parent,
                w.cell(base),
                NodeRef::Leaf(leaf),
                NodeRef::Leaf(replacement),
            )?;
            tree.clear_leaf(leaf);
            self.upkeep.on_new_leaf(tree, w, parent, sp);
            self.starting_position = w.advance(sp, 1);
            if self.active_node != BranchId::ROOT {
                self.active_node = tree
                    .link(self.active_node)
                    .ok_or(EngineError::MissingLink {
                        node: self.active_node,
                    })?;
            }
            if self.starting_position == ep {
                self.active_node = BranchId::ROOT;
                self.active_index = ep;
            } else {
                let target_depth = w.dist(self.starting_position, ep);
                let pos = w.advance(self.starting_position, tree.depth(self.active_node));
                self.active_node =
                    self.go_down(tree, w, self.active_node, target_depth, pos)?;
                self.active_index = w.advance(self.starting_position, target_depth);
            }
        } else {
            let letter = w.cell(w.advance(w.ap_begin, parent_depth));
            tree.remove_child(w, parent, letter, NodeRef::Leaf(leaf))?;
            tree.clear_leaf(leaf);
            let mut credit_from = parent;
            if parent != BranchId::ROOT && tree.child_count(w, parent) == 1 {
                // a unary branching node is contracted out
                let grandpa = tree.parent(parent).ok_or(TreeError::NotABranch {
                    node: NodeRef::Branch(parent),
                })?;
                let above_letter = w.cell(w.advance(tree.head(parent), tree.depth(grandpa)));
                let survivor = tree.take_sole_child(w, parent)?;
                tree.replace_child(
                    w,
                    grandpa,
                    above_letter,
                    NodeRef::Branch(parent),
                    survivor,
                )?;
                match survivor {
                    NodeRef::Branch(b) => tree.set_parent(b, grandpa),
                    NodeRef::Leaf(l) => tree.set_leaf_parent(l, grandpa),
                    NodeRef::None => unreachable!("sole child vanished"),
                }
                if self.active_node == parent {
                    self.active_node = grandpa;
                }
                tree.release_branch(parent);
                credit_from = grandpa;
            }
            if tree.ring().live > 1 {
                self.upkeep
                    .on_leaf_retired(tree, w, credit_from, w.advance(w.ap_begin, 1));
            }
        }
        tree.ring_mut().retire();
        w.shrink_ap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check;
    use crate::tree::list::ListTree;

    fn feed(
        engine: &mut Engine,
        tree: &mut ListTree<u8>,
        w: &mut Window<u8>,
        text: &[u8],
    ) {
        for (i, &b) in text.iter().enumerate() {
            w.write_cell(w.advance(1, i as u32), b);
        }
        for _ in text {
            w.grow_ap();
            engine.prolong_suffixes(tree, w).unwrap();
        }
    }

    fn build(text: &[u8]) -> (Engine, ListTree<u8>, Window<u8>) {
        let capacity = text.len() as u32 + 2;
        let mut w = Window::new(capacity, 1, 2).unwrap();
        let mut tree = ListTree::new(capacity + 1);
        let mut engine = Engine::new(Algorithm::TopDown, Upkeep::Batch);
        feed(&mut engine, &mut tree, &mut w, text);
        (engine, tree, w)
    }

    #[test]
    fn single_unit_gives_single_leaf() {
        let (mut engine, mut tree, mut w) = build(b"x");
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.branch_count(), 1);
        engine.delete_longest_suffix(&mut tree, &mut w).unwrap();
        assert_eq!(tree.leaf_count(), 0);
        assert!(matches!(
            engine.delete_longest_suffix(&mut tree, &mut w),
            Err(EngineError::NothingToDelete)
        ));
    }

    #[test]
    fn abab_structure() {
        let (engine, tree, w) = build(b"abab\xFF");
        assert_eq!(tree.leaf_count(), 5);
        // the two branching nodes below the root spell "ab" and "b"
        assert_eq!(tree.branch_count(), 3);
        check::validate(&tree, &w, engine.starting_position, check::HeadBounds::Batch).unwrap();
        let ab = match tree.child_by_letter(&w, BranchId::ROOT, b'a') {
            NodeRef::Branch(b) => b,
            other => panic!("expected a branching node, got {}", other),
        };
        let b = match tree.child_by_letter(&w, BranchId::ROOT, b'b') {
            NodeRef::Branch(b) => b,
            other => panic!("expected a branching node, got {}", other),
        };
        assert_eq!(tree.depth(ab), 2);
        assert_eq!(tree.depth(b), 1);
        assert_eq!(tree.link(ab), Some(b));
        assert_eq!(tree.link(b), Some(BranchId::ROOT));
    }

    #[test]
    fn leaf_depths_follow_suffix_order() {
        let (_, tree, w) = build(b"abab\xFF");
        // leaf k represents the suffix with depth order k-1
        for order in 0..tree.ring().live {
            let slot = tree.ring().slot_of(order);
            let start = tree.leaf_start(&w, LeafId(slot));
            assert_eq!(w.dist(start, w.ap_end), 5 - order);
        }
    }

    #[test]
    fn repetitive_text_stays_implicit() {
        let (engine, tree, _w) = build(b"aaaa");
        // without the sentinel only the first suffix is explicit
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(engine.starting_position, 2);
    }

    #[test]
    fn both_variations_agree_on_shape() {
        let texts: [&[u8]; 4] = [
            b"abcabxabcd\xFF",
            b"mississippi\xFF",
            b"aaaaaa\xFF",
            b"banana\xFF",
        ];
        for text in texts {
            let capacity = text.len() as u32 + 2;
            let mut w1 = Window::new(capacity, 1, 2).unwrap();
            let mut t1 = ListTree::new(capacity + 1);
            let mut e1 = Engine::new(Algorithm::TopDown, Upkeep::Batch);
            feed(&mut e1, &mut t1, &mut w1, text);

            let mut w2 = Window::new(capacity, 1, 2).unwrap();
            let mut t2 = ListTree::new(capacity + 1);
            let mut e2 = Engine::new(Algorithm::BottomUp, Upkeep::Batch);
            feed(&mut e2, &mut t2, &mut w2, text);

            assert_eq!(
                check::shape(&t1, &w1),
                check::shape(&t2, &w2),
                "variations disagree on {:?}",
                text
            );
            check::validate(&t2, &w2, e2.starting_position, check::HeadBounds::Batch).unwrap();
        }
    }
}
