//! Tree traversal and edge printing.
//!
//! One line per edge, parents before children:
//!
//! ```text
//! P(1)[0]--"ab"(2)-->C(2)[2]{3}
//! ```
//!
//! The `{…}` part names the child's suffix-link target and is suppressed
//! in simple mode (and for leaves, which have none). Labels of 33 or more
//! code units are truncated to 15 leading and 15 trailing units. The
//! sentinel renders as `$`, printable ASCII as itself, anything else as a
//! `\u{…}` escape.

use std::io::{self, Write};

use crate::check::children_map;
use crate::tree::{BranchId, NodeRef, TreeStore};
use crate::unit::CodeUnit;
use crate::window::Window;

const TRUNCATE_AT: u32 = 33;
const KEEP: u32 = 15;

fn push_unit<C: CodeUnit>(out: &mut String, unit: C) {
    if unit == C::SENTINEL {
        out.push('$');
    } else {
        let cp = unit.to_u32();
        match char::from_u32(cp) {
            Some(c) if (0x20..0x7F).contains(&cp) => out.push(c),
            _ => out.push_str(&format!("\\u{{{:04X}}}", cp)),
        }
    }
}

fn render_label<C: CodeUnit>(w: &Window<C>, start: u32, skip: u32, len: u32) -> String {
    let mut out = String::new();
    if len >= TRUNCATE_AT {
        for i in 0..KEEP {
            push_unit(&mut out, w.cell(w.advance(start, skip + i)));
        }
        out.push_str("...");
        for i in len - KEEP..len {
            push_unit(&mut out, w.cell(w.advance(start, skip + i)));
        }
    } else {
        for i in 0..len {
            push_unit(&mut out, w.cell(w.advance(start, skip + i)));
        }
    }
    out
}

/// Write every edge of the tree, depth first from the root.
pub fn write_edges<C: CodeUnit, S: TreeStore<C>, W: Write>(
    tree: &S,
    w: &Window<C>,
    out: &mut W,
    simple: bool,
) -> io::Result<()> {
    let map = children_map(tree, w);
    let mut stack: Vec<BranchId> = vec![BranchId::ROOT];
    while let Some(node) = stack.pop() {
        let depth = tree.depth(node);
        let Some(children) = map.get(&node.0) else {
            continue;
        };
        for &(_, child) in children {
            match child {
                NodeRef::Branch(b) => {
                    let len = tree.depth(b) - depth;
                    let label = render_label(w, tree.head(b), depth, len);
                    write!(
                        out,
                        "P({})[{}]--\"{}\"({})-->C({})[{}]",
                        node.0,
                        depth,
                        label,
                        len,
                        b.0,
                        tree.depth(b)
                    )?;
                    if !simple {
                        let link = tree.link(b).map_or(0, |t| t.0);
                        write!(out, "{{{}}}", link)?;
                    }
                    writeln!(out)?;
                    stack.push(b);
                }
                NodeRef::Leaf(l) => {
                    let start = tree.leaf_start(w, l);
                    let leaf_depth = w.dist(start, w.ap_end);
                    let len = leaf_depth - depth;
                    let label = render_label(w, start, depth, len);
                    writeln!(
                        out,
                        "P({})[{}]--\"{}\"({})-->C(-{})[{}]",
                        node.0, depth, label, len, l.0, leaf_depth
                    )?;
                }
                NodeRef::None => {}
            }
        }
    }
    Ok(())
}
