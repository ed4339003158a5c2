mod util;

use slidetree::check::{self, HeadBounds};
use slidetree::engine::{Algorithm, Engine};
use slidetree::hashing::Resolution;
use slidetree::tree::TreeStore;
use slidetree::upkeep::Upkeep;
use slidetree::window::Window;
use util::*;

/// Scenario: "aaaaaa" through a two-unit active part. After the stream
/// ends the tree holds exactly the suffixes of the last two characters.
#[test]
fn repetitive_text_through_a_tiny_window() {
    let full = terminated(b"aaaaaa");
    let mut w = Window::new(2, 1, 2).unwrap();
    let mut tree = list_tree(4);
    let mut engine = Engine::new(Algorithm::TopDown, Upkeep::Batch);
    let deletions = feed_sliding(&mut engine, &mut tree, &mut w, &full, 2, 1, |e, t, w| {
        check::validate(t, w, e.starting_position, HeadBounds::Batch).unwrap();
    });
    assert_eq!(deletions, full.len() as u64 - 2);
    assert_eq!(w.ap_size, 2);
    assert_eq!(tree.leaf_count(), 2);
    let mut got = check::leaf_strings(&tree, &w);
    got.sort();
    assert_eq!(got, vec![vec![b'a' as u32, SENTINEL as u32], vec![SENTINEL as u32]]);
}

/// A window that exactly fits the input never deletes.
#[test]
fn exact_fit_never_deletes() {
    let full = terminated(b"mississippi");
    let mut w = Window::new(full.len() as u32, 1, 2).unwrap();
    let mut tree = list_tree(full.len());
    let mut engine = Engine::new(Algorithm::TopDown, Upkeep::Batch);
    let deletions = feed_sliding(
        &mut engine,
        &mut tree,
        &mut w,
        &full,
        full.len() as u32,
        1,
        |_, _, _| {},
    );
    assert_eq!(deletions, 0);
    assert_eq!(tree.leaf_count(), 12);
}

/// A stream of two full windows: every position has been the window start
/// exactly once, invariants holding at every step.
#[test]
fn two_window_sweep() {
    let text: Vec<u8> = b"abracadabra_abracadabra_".to_vec(); // 24 units
    for upkeep in [Upkeep::Batch, Upkeep::Credit] {
        let (block, ap, sw) = (4u32, 1u32, if upkeep.is_batch() { 2 } else { 3 });
        let mut w = Window::new(block, ap, sw).unwrap();
        let mut tree = list_tree((block * ap) as usize + 2);
        let mut engine = Engine::new(Algorithm::TopDown, upkeep);
        let mut steps = 0u64;
        let deletions = feed_sliding(
            &mut engine,
            &mut tree,
            &mut w,
            &text,
            block,
            ap,
            |e, t, w| {
                steps += 1;
                let bounds = if e.upkeep().is_batch() {
                    HeadBounds::Batch
                } else {
                    HeadBounds::Strict
                };
                check::validate(t, w, e.starting_position, bounds).unwrap();
            },
        );
        assert_eq!(steps, 24);
        assert_eq!(deletions, 24 - (block * ap) as u64, "{:?}", upkeep);
        // the surviving window is the last max_ap units
        let mut got = check::leaf_strings(&tree, &w);
        got.sort();
        let tail = &text[text.len() - w.ap_size as usize..];
        let explicit = w.dist(w.ap_begin, engine.starting_position) as usize;
        let mut expected: Vec<Vec<u32>> = (0..explicit)
            .map(|i| tail[i..].iter().map(|&b| b as u32).collect())
            .collect();
        expected.sort();
        assert_eq!(got, expected);
    }
}

/// Build, delete back to the empty window, rebuild from the same stream:
/// the shapes agree (node numbering aside).
#[test]
fn replay_after_draining() {
    let full = terminated(b"abcabxabcd");
    for upkeep in [Upkeep::Batch, Upkeep::Credit] {
        let (mut engine, mut tree, mut w) = build_list(&full, Algorithm::TopDown, upkeep);
        let first = check::shape(&tree, &w);
        while tree.leaf_count() > 0 {
            engine.delete_longest_suffix(&mut tree, &mut w).unwrap();
        }
        assert_eq!(tree.branch_count(), 1); // the root survives alone
        assert_eq!(w.ap_size, 0);

        // rebuild into the same arena through the same window
        feed_whole(&mut engine, &mut tree, &mut w, &full);
        assert_eq!(check::shape(&tree, &w), first, "{:?}", upkeep);
    }
}

/// Deleting from a hashed store exercises edge removal, tombstones and
/// unary contraction against the table.
#[test]
fn drain_hashed_store() {
    for resolution in [Resolution::Cuckoo, Resolution::Double] {
        let full = terminated(b"mississippi");
        let (mut engine, mut tree, mut w) =
            build_hashed(&full, Algorithm::TopDown, Upkeep::Credit, resolution);
        let mut remaining = tree.leaf_count();
        while remaining > 0 {
            engine.delete_longest_suffix(&mut tree, &mut w).unwrap();
            remaining -= 1;
            assert_eq!(tree.leaf_count(), remaining);
            check::validate(&tree, &w, engine.starting_position, HeadBounds::Skip).unwrap();
        }
        assert_eq!(tree.branch_count(), 1);
    }
}

/// The sliding window with deletions agrees with a fresh build over just
/// the surviving tail, shape for shape.
#[test]
fn sliding_equals_fresh_tail_build() {
    let text = terminated(b"babbage_cabbage_baggage");
    let block = 4u32;
    let mut w = Window::new(block, 1, 2).unwrap();
    let mut tree = list_tree(block as usize + 2);
    let mut engine = Engine::new(Algorithm::TopDown, Upkeep::Batch);
    feed_sliding(&mut engine, &mut tree, &mut w, &text, block, 1, |_, _, _| {});

    // every suffix of the final window is explicit after the sentinel
    assert_eq!(engine.starting_position, w.ap_end);
    let tail = &text[text.len() - w.ap_size as usize..];
    let mut fresh_w = whole_window(tail.len());
    let mut fresh_t = list_tree(tail.len());
    let mut fresh_e = Engine::new(Algorithm::TopDown, Upkeep::Batch);
    feed_whole(&mut fresh_e, &mut fresh_t, &mut fresh_w, tail);
    assert_eq!(check::shape(&tree, &w), check::shape(&fresh_t, &fresh_w));
}
