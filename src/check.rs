//! Structural validation and canonical tree shapes.
//!
//! Used by tests after every quiescent step and by the driver at high
//! verbosity. Violations carry enough context to locate the broken node;
//! they are bugs, not runtime conditions.

use std::collections::HashMap;

use crate::tree::{BranchId, LeafId, NodeRef, TreeStore};
use crate::unit::CodeUnit;
use crate::window::Window;

#[derive(Debug)]
pub enum Violation {
    HeadOutOfRange { node: u32, head: u32 },
    LeafWithoutParent { slot: u32 },
    ChildLinkBroken { parent: u32, child: NodeRef },
    UnaryBranch { node: u32 },
    LabelMismatch { node: u32 },
    LinkDepthSkew { source: u32, target: u32 },
    LinkStringSkew { source: u32, target: u32 },
    SuffixSetMismatch { present: usize, expected: usize },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::HeadOutOfRange { node, head } => {
                write!(f, "head position {} of node {} outside the valid region", head, node)
            }
            Violation::LeafWithoutParent { slot } => {
                write!(f, "leaf {} has no live parent", slot)
            }
            Violation::ChildLinkBroken { parent, child } => {
                write!(f, "node {} does not reach child {}", parent, child)
            }
            Violation::UnaryBranch { node } => {
                write!(f, "non-root branching node {} has fewer than two children", node)
            }
            Violation::LabelMismatch { node } => {
                write!(f, "head-derived label of node {} disagrees with its path", node)
            }
            Violation::LinkDepthSkew { source, target } => {
                write!(f, "suffix link {} -> {} skips a depth", source, target)
            }
            Violation::LinkStringSkew { source, target } => {
                write!(f, "suffix link {} -> {} is not a one-unit shortening", source, target)
            }
            Violation::SuffixSetMismatch { present, expected } => {
                write!(f, "{} leaves but {} expected suffixes", present, expected)
            }
        }
    }
}

impl std::error::Error for Violation {}

/// Children of every live branching node, each list sorted by first edge
/// letter. (The SH variant enumerates children by sweeping the whole edge
/// table once, never by probing per code-unit value.)
pub fn children_map<C: CodeUnit, S: TreeStore<C>>(
    tree: &S,
    w: &Window<C>,
) -> HashMap<u32, Vec<(C, NodeRef)>> {
    let mut map: HashMap<u32, Vec<(C, NodeRef)>> = HashMap::new();
    tree.for_each_edge(w, |parent, child| {
        let letter = tree.edge_first_letter(w, tree.depth(parent), child);
        map.entry(parent.0).or_default().push((letter, child));
    });
    for children in map.values_mut() {
        children.sort_by_key(|(letter, _)| *letter);
    }
    map
}

/// Root-to-leaf label of every live leaf, as code-point vectors.
pub fn leaf_strings<C: CodeUnit, S: TreeStore<C>>(tree: &S, w: &Window<C>) -> Vec<Vec<u32>> {
    let map = children_map(tree, w);
    let mut out = Vec::new();
    let mut stack: Vec<(BranchId, Vec<u32>)> = vec![(BranchId::ROOT, Vec::new())];
    while let Some((node, prefix)) = stack.pop() {
        let depth = tree.depth(node);
        let Some(children) = map.get(&node.0) else {
            continue;
        };
        for &(_, child) in children {
            let (start, len) = match child {
                NodeRef::Branch(b) => (tree.head(b), tree.depth(b) - depth),
                NodeRef::Leaf(l) => {
                    let s = tree.leaf_start(w, l);
                    (s, w.dist(s, w.ap_end) - depth)
                }
                NodeRef::None => continue,
            };
            let mut label = prefix.clone();
            for i in 0..len {
                label.push(w.cell(w.advance(start, depth + i)).to_u32());
            }
            match child {
                NodeRef::Branch(b) => stack.push((b, label)),
                NodeRef::Leaf(_) => out.push(label),
                NodeRef::None => {}
            }
        }
    }
    out
}

/// Which head-position validity region to enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadBounds {
    /// Strictly inside `[ap_begin, ap_end)`; the credit-counter contract.
    Strict,
    /// Up to `max_ap` retired cells below `ap_begin`; the batch contract.
    Batch,
    /// No head checking (labels are still verified); used while draining
    /// a tree whose window no longer advances.
    Skip,
}

/// Check every universal invariant against the window. `explicit_end` is
/// one past the start of the shallowest suffix with a leaf (the engine's
/// `starting_position`).
pub fn validate<C: CodeUnit, S: TreeStore<C>>(
    tree: &S,
    w: &Window<C>,
    explicit_end: u32,
    bounds: HeadBounds,
) -> Result<(), Violation> {
    let map = children_map(tree, w);
    let ring = tree.ring();

    // leaves: parents are live branches that actually hold them
    for order in 0..ring.live {
        let slot = ring.slot_of(order);
        let leaf = LeafId(slot);
        let parent = tree
            .leaf_parent(leaf)
            .ok_or(Violation::LeafWithoutParent { slot })?;
        let letter = tree.edge_first_letter(w, tree.depth(parent), NodeRef::Leaf(leaf));
        if tree.child_by_letter(w, parent, letter) != NodeRef::Leaf(leaf) {
            return Err(Violation::ChildLinkBroken {
                parent: parent.0,
                child: NodeRef::Leaf(leaf),
            });
        }
    }

    // walk the tree from the root: label consistency, arity, head
    // positions, suffix links
    let mut strings: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut stack: Vec<(BranchId, Vec<u32>)> = vec![(BranchId::ROOT, Vec::new())];
    let mut reached: Vec<BranchId> = Vec::new();
    while let Some((node, string)) = stack.pop() {
        reached.push(node);
        let depth = tree.depth(node);
        if node != BranchId::ROOT {
            let arity = map.get(&node.0).map_or(0, |c| c.len());
            if arity < 2 {
                return Err(Violation::UnaryBranch { node: node.0 });
            }
            let head_ok = match bounds {
                HeadBounds::Strict => w.head_valid(tree.head(node), false),
                HeadBounds::Batch => w.head_valid(tree.head(node), true),
                HeadBounds::Skip => true,
            };
            if !head_ok {
                return Err(Violation::HeadOutOfRange {
                    node: node.0,
                    head: tree.head(node),
                });
            }
            // reading the window at the head must spell the path
            let head = tree.head(node);
            for i in 0..depth {
                if w.cell(w.advance(head, i)).to_u32() != string[i as usize] {
                    return Err(Violation::LabelMismatch { node: node.0 });
                }
            }
        }
        strings.insert(node.0, string.clone());
        if let Some(children) = map.get(&node.0) {
            for &(_, child) in children {
                if let NodeRef::Branch(b) = child {
                    let mut extended = string.clone();
                    let start = tree.head(b);
                    for i in depth..tree.depth(b) {
                        extended.push(w.cell(w.advance(start, i)).to_u32());
                    }
                    stack.push((b, extended));
                }
            }
        }
    }

    for node in reached {
        if let Some(target) = tree.link(node) {
            if tree.depth(node) != tree.depth(target) + 1 {
                return Err(Violation::LinkDepthSkew {
                    source: node.0,
                    target: target.0,
                });
            }
            let source_string = &strings[&node.0];
            match strings.get(&target.0) {
                Some(target_string) if source_string[1..] == target_string[..] => {}
                _ => {
                    return Err(Violation::LinkStringSkew {
                        source: node.0,
                        target: target.0,
                    });
                }
            }
        }
    }

    // the leaves spell exactly the explicit suffixes of the window
    let mut present = leaf_strings(tree, w);
    present.sort();
    let mut expected: Vec<Vec<u32>> = Vec::new();
    let explicit = w.dist(w.ap_begin, explicit_end);
    for i in 0..explicit {
        let start = w.advance(w.ap_begin, i);
        let len = w.dist(start, w.ap_end);
        let mut s = Vec::with_capacity(len as usize);
        for j in 0..len {
            s.push(w.cell(w.advance(start, j)).to_u32());
        }
        expected.push(s);
    }
    expected.sort();
    if present != expected {
        return Err(Violation::SuffixSetMismatch {
            present: present.len(),
            expected: expected.len(),
        });
    }
    Ok(())
}

/// A representation-independent rendering of the tree, for comparing the
/// two construction variations and for replay tests. Children are ordered
/// by label, labels by content; node identities are erased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Shape {
    pub label: Vec<u32>,
    pub children: Vec<Shape>,
    pub is_leaf: bool,
}

pub fn shape<C: CodeUnit, S: TreeStore<C>>(tree: &S, w: &Window<C>) -> Shape {
    let map = children_map(tree, w);
    build_shape(tree, w, &map, BranchId::ROOT, Vec::new())
}

fn build_shape<C: CodeUnit, S: TreeStore<C>>(
    tree: &S,
    w: &Window<C>,
    map: &HashMap<u32, Vec<(C, NodeRef)>>,
    node: BranchId,
    label: Vec<u32>,
) -> Shape {
    let depth = tree.depth(node);
    let mut children = Vec::new();
    if let Some(list) = map.get(&node.0) {
        for &(_, child) in list {
            match child {
                NodeRef::Branch(b) => {
                    let start = tree.head(b);
                    let mut sub = Vec::new();
                    for i in depth..tree.depth(b) {
                        sub.push(w.cell(w.advance(start, i)).to_u32());
                    }
                    children.push(build_shape(tree, w, map, b, sub));
                }
                NodeRef::Leaf(l) => {
                    let start = tree.leaf_start(w, l);
                    let len = w.dist(start, w.ap_end);
                    let mut sub = Vec::new();
                    for i in depth..len {
                        sub.push(w.cell(w.advance(start, i)).to_u32());
                    }
                    children.push(Shape {
                        label: sub,
                        children: Vec::new(),
                        is_leaf: true,
                    });
                }
                NodeRef::None => {}
            }
        }
    }
    children.sort();
    Shape {
        label,
        children,
        is_leaf: false,
    }
}
