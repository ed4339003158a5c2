use slidetree::engine::{Algorithm, Engine};
use slidetree::hashing::Resolution;
use slidetree::tree::hashed::HashedTree;
use slidetree::tree::list::ListTree;
use slidetree::tree::TreeStore;
use slidetree::upkeep::Upkeep;
use slidetree::window::Window;

pub const SENTINEL: u8 = 0xFF;

/// Append the sentinel the way the reader does at end of stream.
pub fn terminated(text: &[u8]) -> Vec<u8> {
    let mut t = text.to_vec();
    t.push(SENTINEL);
    t
}

/// A window roomy enough to hold `text` plus the sentinel without sliding.
pub fn whole_window(len: usize) -> Window<u8> {
    Window::new(len as u32 + 2, 1, 2).unwrap()
}

pub fn list_tree(len: usize) -> ListTree<u8> {
    ListTree::new(len as u32 + 3)
}

pub fn hashed_tree(len: usize, resolution: Resolution) -> HashedTree<u8> {
    HashedTree::new(len as u32 + 3, resolution, 3, 4 * (len + 4)).unwrap()
}

/// Feed a whole text into a window that never slides.
pub fn feed_whole<S: TreeStore<u8>>(
    engine: &mut Engine,
    tree: &mut S,
    w: &mut Window<u8>,
    text: &[u8],
) {
    for (i, &b) in text.iter().enumerate() {
        w.write_cell(w.advance(w.ap_end, i as u32), b);
    }
    for _ in text {
        w.grow_ap();
        engine.prolong_suffixes(tree, w).unwrap();
    }
}

/// Build a non-sliding tree with the given variation and maintenance.
pub fn build_list(
    text: &[u8],
    algorithm: Algorithm,
    upkeep: Upkeep,
) -> (Engine, ListTree<u8>, Window<u8>) {
    let mut w = whole_window(text.len());
    let mut tree = list_tree(text.len());
    let mut engine = Engine::new(algorithm, upkeep);
    feed_whole(&mut engine, &mut tree, &mut w, text);
    (engine, tree, w)
}

pub fn build_hashed(
    text: &[u8],
    algorithm: Algorithm,
    upkeep: Upkeep,
    resolution: Resolution,
) -> (Engine, HashedTree<u8>, Window<u8>) {
    let mut w = whole_window(text.len());
    let mut tree = hashed_tree(text.len(), resolution);
    let mut engine = Engine::new(algorithm, upkeep);
    feed_whole(&mut engine, &mut tree, &mut w, text);
    (engine, tree, w)
}

/// Drive a sliding construction the way the session does: write each unit
/// at `ap_end`, prolong, delete once saturated, and run the batch refresh
/// on the block cadence. Returns the number of deletions.
pub fn feed_sliding<S: TreeStore<u8>>(
    engine: &mut Engine,
    tree: &mut S,
    w: &mut Window<u8>,
    text: &[u8],
    block_size: u32,
    ap_scale: u32,
    mut each_step: impl FnMut(&Engine, &S, &Window<u8>),
) -> u64 {
    let max_ap = w.max_ap();
    let mut deletions = 0;
    let mut units: u64 = 0;
    for &b in text {
        w.write_cell(w.ap_end, b);
        w.grow_ap();
        engine.prolong_suffixes(tree, w).unwrap();
        if w.ap_size > max_ap {
            engine.delete_longest_suffix(tree, w).unwrap();
            deletions += 1;
        }
        units += 1;
        if units % block_size as u64 == 0 {
            let blocks = units / block_size as u64;
            if engine.upkeep().is_batch() && blocks % ap_scale as u64 == 0 {
                engine.upkeep().batch_refresh(tree, w);
            }
        }
        each_step(engine, tree, w);
    }
    deletions
}

/// Expected suffix set of a text, as code-point vectors, sorted.
pub fn expected_suffixes(text: &[u8]) -> Vec<Vec<u32>> {
    let mut out: Vec<Vec<u32>> = (0..text.len())
        .map(|i| text[i..].iter().map(|&b| b as u32).collect())
        .collect();
    out.sort();
    out
}
