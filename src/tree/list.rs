//! The SL representation: children of a branching node form an intrusive
//! singly linked sibling list through per-node brother pointers. Child
//! lookup walks the list comparing first edge letters read from the
//! window; order within a list is arbitrary but stable.

use super::*;
use crate::unit::CodeUnit;
use crate::window::Window;

#[derive(Debug, Clone, Copy)]
struct ListBranch {
    core: BranchCore,
    first_child: NodeRef,
    brother: NodeRef,
}

#[derive(Debug, Clone, Copy, Default)]
struct ListLeaf {
    /// 0 marks an empty slot.
    parent: u32,
    brother: NodeRef,
}

pub struct ListTree<C: CodeUnit> {
    branches: Vec<ListBranch>,
    released: Vec<u32>,
    leaves: Vec<ListLeaf>,
    ring: LeafRing,
    _unit: std::marker::PhantomData<C>,
}

impl<C: CodeUnit> ListTree<C> {
    pub fn new(leaf_capacity: u32) -> Self {
        let root = ListBranch {
            core: BranchCore {
                parent: 0,
                credit: false,
                depth: 0,
                head: 1,
                link: 0,
            },
            first_child: NodeRef::None,
            brother: NodeRef::None,
        };
        let mut branches = Vec::with_capacity(64);
        branches.push(ListBranch {
            core: BranchCore::released(),
            first_child: NodeRef::None,
            brother: NodeRef::None,
        }); // slot 0 unused
        branches.push(root);
        ListTree {
            branches,
            released: Vec::new(),
            leaves: vec![ListLeaf::default(); leaf_capacity as usize + 1],
            ring: LeafRing::new(leaf_capacity),
            _unit: std::marker::PhantomData,
        }
    }

    fn brother(&self, node: NodeRef) -> NodeRef {
        match node {
            NodeRef::Branch(b) => self.branches[b.0 as usize].brother,
            NodeRef::Leaf(l) => self.leaves[l.0 as usize].brother,
            NodeRef::None => NodeRef::None,
        }
    }

    fn set_brother(&mut self, node: NodeRef, brother: NodeRef) {
        match node {
            NodeRef::Branch(b) => self.branches[b.0 as usize].brother = brother,
            NodeRef::Leaf(l) => self.leaves[l.0 as usize].brother = brother,
            NodeRef::None => panic!("brother of an absent node"),
        }
    }

    /// Walk the sibling list for the child starting with `letter`,
    /// returning it together with its predecessor in the list.
    fn branch_once(
        &self,
        w: &Window<C>,
        parent: BranchId,
        letter: C,
    ) -> (NodeRef, NodeRef) {
        let parent_depth = self.depth(parent);
        let mut previous = NodeRef::None;
        let mut current = self.branches[parent.0 as usize].first_child;
        while current != NodeRef::None {
            if self.edge_first_letter(w, parent_depth, current) == letter {
                return (current, previous);
            }
            previous = current;
            current = self.brother(current);
        }
        (NodeRef::None, previous)
    }

    fn unlink(&mut self, parent: BranchId, child: NodeRef, previous: NodeRef) {
        let after = self.brother(child);
        if previous == NodeRef::None {
            self.branches[parent.0 as usize].first_child = after;
        } else {
            self.set_brother(previous, after);
        }
        self.set_brother(child, NodeRef::None);
    }
}

impl<C: CodeUnit> TreeStore<C> for ListTree<C> {
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
        let p = self.leaves[l.0 as usize].parent;
        if p == 0 {
            None
        } else {
            Some(BranchId(p))
        }
    }

    fn set_leaf_parent(&mut self, l: LeafId, p: BranchId) {
        self.leaves[l.0 as usize].parent = p.0;
    }

    fn create_branch(&mut self, parent: BranchId, depth: u32, head: u32) -> BranchId {
        let core = BranchCore {
            parent: parent.0,
            credit: false,
            depth,
            head,
            link: 0,
        };
        let record = ListBranch {
            core,
            first_child: NodeRef::None,
            brother: NodeRef::None,
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
        self.branches[b.0 as usize] = ListBranch {
            core: BranchCore::released(),
            first_child: NodeRef::None,
            brother: NodeRef::None,
        };
        self.released.push(b.0);
    }

    fn create_leaf(&mut self, parent: BranchId) -> Result<LeafId, TreeError> {
        let slot = self.ring.push().ok_or(TreeError::LeafRingFull)?;
        self.leaves[slot as usize] = ListLeaf {
            parent: parent.0,
            brother: NodeRef::None,
        };
        Ok(LeafId(slot))
    }

    fn clear_leaf(&mut self, l: LeafId) {
        self.leaves[l.0 as usize] = ListLeaf::default();
    }

    fn child_by_letter(&self, w: &Window<C>, parent: BranchId, letter: C) -> NodeRef {
        self.branch_once(w, parent, letter).0
    }

    fn insert_child(
        &mut self,
        _w: &Window<C>,
        parent: BranchId,
        _letter: C,
        child: NodeRef,
    ) -> Result<(), TreeError> {
        let head = self.branches[parent.0 as usize].first_child;
        self.set_brother(child, head);
        self.branches[parent.0 as usize].first_child = child;
        Ok(())
    }

    fn remove_child(
        &mut self,
        w: &Window<C>,
        parent: BranchId,
        letter: C,
        child: NodeRef,
    ) -> Result<(), TreeError> {
        let (found, previous) = self.branch_once(w, parent, letter);
        if found != child {
            return Err(TreeError::WrongChild {
                parent,
                expected: child,
            });
        }
        self.unlink(parent, child, previous);
        Ok(())
    }

    fn replace_child(
        &mut self,
        w: &Window<C>,
        parent: BranchId,
        letter: C,
        old: NodeRef,
        new: NodeRef,
    ) -> Result<(), TreeError> {
        let (found, previous) = self.branch_once(w, parent, letter);
        if found != old {
            return Err(TreeError::WrongChild {
                parent,
                expected: old,
            });
        }
        let after = self.brother(old);
        self.set_brother(new, after);
        if previous == NodeRef::None {
            self.branches[parent.0 as usize].first_child = new;
        } else {
            self.set_brother(previous, new);
        }
        self.set_brother(old, NodeRef::None);
        Ok(())
    }

    fn child_count(&self, _w: &Window<C>, parent: BranchId) -> u32 {
        let mut count = 0;
        let mut current = self.branches[parent.0 as usize].first_child;
        while current != NodeRef::None {
            count += 1;
            current = self.brother(current);
        }
        count
    }

    fn take_sole_child(&mut self, _w: &Window<C>, parent: BranchId) -> Result<NodeRef, TreeError> {
        let child = self.branches[parent.0 as usize].first_child;
        if child == NodeRef::None || self.brother(child) != NodeRef::None {
            return Err(TreeError::NotABranch {
                node: NodeRef::Branch(parent),
            });
        }
        self.branches[parent.0 as usize].first_child = NodeRef::None;
        self.set_brother(child, NodeRef::None);
        Ok(child)
    }

    fn for_each_edge<F: FnMut(BranchId, NodeRef)>(&self, _w: &Window<C>, mut f: F) {
        for slot in 1..self.branches.len() {
            let rec = &self.branches[slot];
            if !rec.core.is_live() {
                continue;
            }
            let mut current = rec.first_child;
            while current != NodeRef::None {
                f(BranchId(slot as u32), current);
                current = self.brother(current);
            }
        }
    }

    fn branch_count(&self) -> u32 {
        (self.branches.len() - 1 - self.released.len()) as u32
    }
}
