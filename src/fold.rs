//! Folding compressor
//!
//! Each pass cuts the stream into 4-byte windows and replaces every window with a
//! one-byte id, handed out in first-seen order. Trailing bytes that do not fill a
//! window are dropped, ids wrap after 256 distinct windows, and no dictionary is
//! kept. Folding is lossy and there is no inverse.

use std::collections::HashMap;

const WINDOW: usize = 4;

/// Number of passes for an input of `size` bytes: `floor(log2(size)) / 2`
pub fn fold_depth(size: usize) -> u32 {
    if size == 0 {
        0
    } else {
        size.ilog2() / 2
    }
}

pub fn fold(data: &[u8]) -> Vec<u8> {
    let mut folded = data.to_vec();
    let mut depth = fold_depth(data.len());

    while depth > 0 && folded.len() >= WINDOW {
        folded = fold_pass(&folded);
        depth -= 1;
    }

    folded
}

fn fold_pass(data: &[u8]) -> Vec<u8> {
    let mut patterns: HashMap<&[u8], u8> = HashMap::new();
    let mut next_id: u8 = 0;

    data.chunks_exact(WINDOW)
        .map(|window| {
            *patterns.entry(window).or_insert_with(|| {
                let id = next_id;
                next_id = next_id.wrapping_add(1);
                id
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth() {
        assert_eq!(fold_depth(0), 0);
        assert_eq!(fold_depth(3), 0);
        assert_eq!(fold_depth(4), 1);
        assert_eq!(fold_depth(15), 1);
        assert_eq!(fold_depth(16), 2);
        assert_eq!(fold_depth(1024), 5);
    }

    #[test]
    fn short_input_is_untouched() {
        assert_eq!(fold(&[0x30, 0x32]), vec![0x30, 0x32]);
        assert_eq!(fold(&[]), Vec::<u8>::new());
    }

    #[test]
    fn single_pass_ids_in_first_seen_order() {
        // 12 bytes -> depth 1
        let data = [1, 2, 3, 4, 9, 9, 9, 9, 1, 2, 3, 4];
        assert_eq!(fold(&data), vec![0, 1, 0]);
    }

    #[test]
    fn tail_bytes_are_dropped() {
        let data = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(fold(&data), vec![0]);
    }

    #[test]
    fn recursive_passes() {
        // 16 bytes -> depth 2; first pass gives [0, 1, 0, 1], second gives [0]
        let data = [7, 7, 7, 7, 8, 8, 8, 8, 7, 7, 7, 7, 8, 8, 8, 8];
        assert_eq!(fold(&data), vec![0]);
    }

    #[test]
    fn ids_wrap_after_256_patterns() {
        let data: Vec<u8> = (0..257u32).flat_map(|i| i.to_be_bytes()).collect();
        let folded = fold_pass(&data);

        assert_eq!(folded.len(), 257);
        assert_eq!(folded[255], 255);
        // The 257th distinct window collides with the first
        assert_eq!(folded[256], 0);
    }

    #[test]
    fn folding_is_not_invertible() {
        // Two different streams with repeated windows fold to the same bytes, so no
        // unfold can tell them apart
        let first = [1, 1, 1, 1, 2, 2, 2, 2, 1, 1, 1, 1];
        let second = [5, 6, 7, 8, 0, 0, 0, 0, 5, 6, 7, 8];
        assert_ne!(first, second);
        assert_eq!(fold(&first), fold(&second));
        assert!(fold(&first).len() < first.len());
    }
}
