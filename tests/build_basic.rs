mod util;

use slidetree::check::{self, leaf_strings, HeadBounds};
use slidetree::engine::Algorithm;
use slidetree::hashing::Resolution;
use slidetree::tree::{BranchId, NodeRef, TreeStore};
use slidetree::upkeep::Upkeep;
use util::*;

fn bounds_for(upkeep: Upkeep) -> HeadBounds {
    if upkeep.is_batch() {
        HeadBounds::Batch
    } else {
        HeadBounds::Strict
    }
}

/// The root-to-leaf labels of a freshly built tree are exactly the
/// suffixes of the terminated text, for every variant combination.
#[test]
fn round_trip_law() {
    let texts: &[&[u8]] = &[
        b"abab",
        b"mississippi",
        b"banana",
        b"abcabxabcd",
        b"aaaaaaaa",
        b"abcdefgh",
        b"xyxyxyxyx",
    ];
    for &text in texts {
        let full = terminated(text);
        let expected = expected_suffixes(&full);
        for algorithm in [Algorithm::TopDown, Algorithm::BottomUp] {
            for upkeep in [Upkeep::Batch, Upkeep::Credit] {
                let (engine, tree, w) = build_list(&full, algorithm, upkeep);
                let mut got = leaf_strings(&tree, &w);
                got.sort();
                assert_eq!(got, expected, "SL {:?} {:?} over {:?}", algorithm, upkeep, text);
                check::validate(&tree, &w, engine.starting_position, bounds_for(upkeep))
                    .unwrap();

                for resolution in [Resolution::Cuckoo, Resolution::Double] {
                    let (engine, tree, w) =
                        build_hashed(&full, algorithm, upkeep, resolution);
                    let mut got = leaf_strings(&tree, &w);
                    got.sort();
                    assert_eq!(
                        got, expected,
                        "SH {:?} {:?} {:?} over {:?}",
                        algorithm, upkeep, resolution, text
                    );
                    check::validate(&tree, &w, engine.starting_position, bounds_for(upkeep))
                        .unwrap();
                }
            }
        }
    }
}

/// Scenario: mississippi fits the window whole. Eleven text suffixes plus
/// the terminal one, six branching nodes spelling the right-branching
/// substrings, suffix links chaining them a unit shorter each.
#[test]
fn mississippi_structure() {
    let full = terminated(b"mississippi");
    let (engine, tree, w) = build_list(&full, Algorithm::TopDown, Upkeep::Credit);
    assert_eq!(tree.leaf_count(), 12);
    assert_eq!(tree.branch_count(), 7); // root + i, s, p, si, ssi, issi

    let strings: Vec<String> = branch_strings(&tree, &w);
    let mut sorted = strings.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["", "i", "issi", "p", "s", "si", "ssi"]);

    // suffix links drop exactly one leading unit
    let i = branch_by_path(&tree, &w, b"i");
    let si = branch_by_path(&tree, &w, b"si");
    let ssi = branch_by_path(&tree, &w, b"ssi");
    let issi = branch_by_path(&tree, &w, b"issi");
    assert_eq!(tree.link(issi), Some(ssi));
    assert_eq!(tree.link(ssi), Some(si));
    assert_eq!(tree.link(si), Some(i));
    assert_eq!(tree.link(i), Some(BranchId::ROOT));

    // credit maintenance keeps every head strictly inside the window
    check::validate(&tree, &w, engine.starting_position, HeadBounds::Strict).unwrap();
}

/// Scenario: cuckoo hashing with a deliberately tiny initial table must
/// rebuild itself at least once and keep lookups exact.
#[test]
fn banana_forces_a_rehash() {
    let full = terminated(b"banana");
    let mut w = whole_window(full.len());
    let mut tree =
        slidetree::HashedTree::<u8>::new(full.len() as u32 + 3, Resolution::Cuckoo, 3, 2)
            .unwrap();
    let mut engine = slidetree::Engine::new(Algorithm::TopDown, Upkeep::Batch);
    feed_whole(&mut engine, &mut tree, &mut w, &full);

    assert!(tree.rehash_count() >= 1);
    match tree.child_by_letter(&w, BranchId::ROOT, b'b') {
        NodeRef::Leaf(l) => {
            // the whole text is the suffix at the window start
            assert_eq!(tree.leaf_start(&w, l), 1);
        }
        other => panic!("lookup after rehash returned {}", other),
    }
    check::validate(&tree, &w, engine.starting_position, HeadBounds::Batch).unwrap();
}

/// Scenario: minimized branching produces the same topology as the
/// default variation, across stores.
#[test]
fn variations_are_isomorphic() {
    let full = terminated(b"abcabxabcd");
    let (_, sl_td, w1) = build_list(&full, Algorithm::TopDown, Upkeep::Batch);
    let (_, sl_bu, w2) = build_list(&full, Algorithm::BottomUp, Upkeep::Batch);
    let (_, sh_td, w3) =
        build_hashed(&full, Algorithm::TopDown, Upkeep::Batch, Resolution::Cuckoo);
    let shape = check::shape(&sl_td, &w1);
    assert_eq!(shape, check::shape(&sl_bu, &w2));
    assert_eq!(shape, check::shape(&sh_td, &w3));
}

/// Leaf ids are assigned in suffix depth order.
#[test]
fn abab_leaf_depths() {
    let full = terminated(b"abab");
    let (_, tree, w) = build_list(&full, Algorithm::TopDown, Upkeep::Batch);
    assert_eq!(tree.leaf_count(), 5);
    for order in 0..tree.ring().live {
        let slot = tree.ring().slot_of(order);
        let start = tree.leaf_start(&w, slidetree::LeafId(slot));
        assert_eq!(w.dist(start, w.ap_end), 5 - order);
    }
}

fn branch_strings<S: TreeStore<u8>>(tree: &S, w: &slidetree::Window<u8>) -> Vec<String> {
    let map = check::children_map(tree, w);
    let mut out = Vec::new();
    let mut stack = vec![(BranchId::ROOT, String::new())];
    while let Some((node, path)) = stack.pop() {
        out.push(path.clone());
        if let Some(children) = map.get(&node.0) {
            for &(_, child) in children {
                if let NodeRef::Branch(b) = child {
                    let mut extended = path.clone();
                    let start = tree.head(b);
                    for i in tree.depth(node)..tree.depth(b) {
                        extended.push(w.cell(w.advance(start, i)) as char);
                    }
                    stack.push((b, extended));
                }
            }
        }
    }
    out
}

fn branch_by_path<S: TreeStore<u8>>(
    tree: &S,
    w: &slidetree::Window<u8>,
    path: &[u8],
) -> BranchId {
    let mut node = BranchId::ROOT;
    let mut depth = 0;
    while depth < path.len() {
        match tree.child_by_letter(w, node, path[depth]) {
            NodeRef::Branch(b) => {
                depth = tree.depth(b) as usize;
                node = b;
            }
            other => panic!("no branching path {:?}: hit {}", path, other),
        }
    }
    assert_eq!(tree.depth(node) as usize, path.len());
    node
}
