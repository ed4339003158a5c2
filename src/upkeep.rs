//! Edge-label maintenance.
//!
//! Edge labels are pairs of head position and depth, so a sliding window
//! silently invalidates them: the occurrence a head position names
//! eventually leaves the window. Two disciplines keep every label readable,
//! behind one interface the engine calls blindly.
//!
//! *Batch* refreshes nothing per event. Every `ap_scale` processed blocks
//! the session walks all live leaves from deepest to shallowest and pushes
//! each leaf's suffix offset up its parent chain, stopping early at nodes
//! that are already at least as fresh. Between refreshes a head may name a
//! cell up to `max_ap` positions below `ap_begin`, which is why the window
//! keeps a retired block around (`sw_scale >= 2 * ap_scale`).
//!
//! *Credit-counter* (Fiala-Greene) pays as it goes: every leaf creation or
//! shortening sends a fresh offset up from the parent. Each non-root
//! branching node holds one credit bit; an arriving credit refreshes the
//! node and flips the bit, continuing upward only if the bit was already
//! set. Heads then always stay inside the live window.

use crate::tree::{BranchId, TreeStore};
use crate::unit::CodeUnit;
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upkeep {
    Batch,
    Credit,
}

impl Upkeep {
    pub fn is_batch(&self) -> bool {
        matches!(self, Upkeep::Batch)
    }

    /// A leaf with suffix offset `offset` was created under `parent`.
    pub fn on_new_leaf<C: CodeUnit, S: TreeStore<C>>(
        &self,
        tree: &mut S,
        w: &Window<C>,
        parent: BranchId,
        offset: u32,
    ) {
        if let Upkeep::Credit = self {
            send_credit(tree, w, parent, offset);
        }
    }

    /// The deepest leaf was retired; `offset` is the suffix offset of the
    /// deepest leaf still present.
    pub fn on_leaf_retired<C: CodeUnit, S: TreeStore<C>>(
        &self,
        tree: &mut S,
        w: &Window<C>,
        parent: BranchId,
        offset: u32,
    ) {
        if let Upkeep::Credit = self {
            send_credit(tree, w, parent, offset);
        }
    }

    /// Refresh every head position from the live leaves; a no-op under
    /// credit maintenance.
    pub fn batch_refresh<C: CodeUnit, S: TreeStore<C>>(&self, tree: &mut S, w: &Window<C>) {
        if let Upkeep::Credit = self {
            return;
        }
        let ring = *tree.ring();
        for order in 0..ring.live {
            let slot = ring.slot_of(order);
            let offset = w.advance(w.ap_begin, order);
            let Some(mut node) = tree.leaf_parent(crate::tree::LeafId(slot)) else {
                // an emptied slot inside the walk range: stop this climb
                continue;
            };
            loop {
                if !w.fresher(offset, tree.head(node)) {
                    break;
                }
                tree.set_head(node, offset);
                match tree.parent(node) {
                    Some(p) => node = p,
                    None => break,
                }
            }
        }
    }
}

/// One Fiala-Greene credit, climbing from `node` toward the root.
fn send_credit<C: CodeUnit, S: TreeStore<C>>(
    tree: &mut S,
    w: &Window<C>,
    mut node: BranchId,
    offset: u32,
) {
    while node != BranchId::ROOT {
        if w.fresher(offset, tree.head(node)) {
            tree.set_head(node, offset);
        }
        if tree.credit(node) {
            tree.set_credit(node, false);
            match tree.parent(node) {
                Some(p) => node = p,
                None => break,
            }
        } else {
            tree.set_credit(node, true);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::list::ListTree;
    use crate::tree::NodeRef;
    use crate::window::Window;

    /// root -> a(depth 1) -> b(depth 2), heads deliberately stale.
    fn fixture() -> (Window<u8>, ListTree<u8>, BranchId, BranchId) {
        let mut w = Window::new(8, 1, 2).unwrap();
        for i in 1..=12 {
            w.write_cell(((i - 1) % 16) + 1, b'a');
        }
        for _ in 0..12 {
            w.grow_ap();
        }
        for _ in 0..4 {
            w.shrink_ap();
        }
        // window is [5, 13) mod 16
        let mut t = ListTree::<u8>::new(8);
        let a = t.create_branch(BranchId::ROOT, 1, 5);
        t.insert_child(&w, BranchId::ROOT, b'a', NodeRef::Branch(a))
            .unwrap();
        let b = t.create_branch(a, 2, 5);
        t.insert_child(&w, a, b'a', NodeRef::Branch(b)).unwrap();
        t.set_head(a, 2);
        t.set_head(b, 3);
        (w, t, a, b)
    }

    #[test]
    fn credit_parks_then_propagates() {
        let (w, mut t, a, b) = fixture();
        let up = Upkeep::Credit;
        up.on_new_leaf(&mut t, &w, b, 6);
        // first credit refreshes b and parks
        assert_eq!(t.head(b), 6);
        assert!(t.credit(b));
        assert_eq!(t.head(a), 2);
        // second credit clears the bit and continues to a
        up.on_new_leaf(&mut t, &w, b, 7);
        assert_eq!(t.head(b), 7);
        assert!(!t.credit(b));
        assert_eq!(t.head(a), 7);
        assert!(t.credit(a));
    }

    #[test]
    fn credit_ignores_staler_offsets() {
        let (w, mut t, _a, b) = fixture();
        t.set_head(b, 9);
        Upkeep::Credit.on_new_leaf(&mut t, &w, b, 6);
        assert_eq!(t.head(b), 9);
        assert!(t.credit(b));
    }

    #[test]
    fn batch_mode_defers_everything_to_refresh() {
        let (w, mut t, a, b) = fixture();
        let up = Upkeep::Batch;
        up.on_new_leaf(&mut t, &w, b, 6);
        assert_eq!(t.head(b), 3);
        assert_eq!(t.head(a), 2);
        // attach leaves so the refresh walk has something to climb from
        let l1 = t.create_leaf(b).unwrap();
        t.insert_child(&w, b, b'a', NodeRef::Leaf(l1)).unwrap();
        up.batch_refresh(&mut t, &w);
        // deepest leaf has order 0, offset ap_begin = 5
        assert_eq!(t.head(b), 5);
        assert_eq!(t.head(a), 5);
    }
}
