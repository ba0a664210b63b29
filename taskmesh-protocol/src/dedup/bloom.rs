//! Small fixed-size bit-array bloom filter with two independent hash
//! functions (Kirsch-Mitzenmacher double hashing). This is the one
//! hand-rolled domain algorithm in the crate — deduplication's bloom
//! pre-check is itself part of what's being built, not ambient plumbing
//! a crate would paper over.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A bloom filter sized for `expected_items` entries at `false_positive_rate`.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size the filter per the standard formulas:
    /// `m = -n*ln(p) / (ln2)^2`, `k = (m/n)*ln2`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let expected_items = expected_items.max(1);
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let num_bits = (-(expected_items as f64) * false_positive_rate.ln() / ln2_sq).ceil() as usize;
        let num_bits = num_bits.max(64);
        let num_hashes = ((num_bits as f64 / expected_items as f64) * std::f64::consts::LN_2)
            .round()
            .max(1.0) as u32;

        Self {
            bits: vec![0u64; num_bits.div_ceil(64)],
            num_bits,
            num_hashes,
        }
    }

    fn hashes(&self, item: &str) -> (u64, u64) {
        let mut h1 = DefaultHasher::new();
        item.hash(&mut h1);
        let a = h1.finish();

        let mut h2 = DefaultHasher::new();
        (item, 0x9e3779b97f4a7c15u64).hash(&mut h2);
        let b = h2.finish();
        (a, b)
    }

    fn bit_indices(&self, item: &str) -> impl Iterator<Item = usize> + '_ {
        let (a, b) = self.hashes(item);
        (0..self.num_hashes).map(move |i| {
            let combined = a.wrapping_add((i as u64).wrapping_mul(b));
            (combined as usize) % self.num_bits
        })
    }

    pub fn insert(&mut self, item: &str) {
        for idx in self.bit_indices(item).collect::<Vec<_>>() {
            self.bits[idx / 64] |= 1 << (idx % 64);
        }
    }

    /// `false` means "definitely not present". `true` means "maybe present".
    pub fn might_contain(&self, item: &str) -> bool {
        self.bit_indices(item).all(|idx| self.bits[idx / 64] & (1 << (idx % 64)) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_items_are_always_found() {
        let mut filter = BloomFilter::new(1000, 0.01);
        for i in 0..500 {
            filter.insert(&format!("msg-{i}"));
        }
        for i in 0..500 {
            assert!(filter.might_contain(&format!("msg-{i}")));
        }
    }

    #[test]
    fn false_positive_rate_is_reasonably_bounded() {
        let mut filter = BloomFilter::new(1000, 0.01);
        for i in 0..1000 {
            filter.insert(&format!("known-{i}"));
        }
        let false_positives = (0..2000)
            .filter(|i| filter.might_contain(&format!("unknown-{i}")))
            .count();
        // Generous bound: real FP rate should be near 1%, not catastrophic.
        assert!(false_positives < 200, "false positives: {false_positives}");
    }
}
