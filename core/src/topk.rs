//! Bounded top-k selection with a deterministic order.
//!
//! Results are ordered by descending score; equal scores are ordered by ascending
//! document id so the same input always yields the same output.

use crate::index::DocId;
use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Initial heap allocation; `k` may be far larger than the input.
const MAX_INITIAL_CAPACITY: usize = 1024;

/// Keep the `k` best `(id, score)` pairs. O(n log k) via a min-heap of size k.
pub fn top_k<I>(scored: I, k: usize) -> Vec<(DocId, f64)>
where
    I: IntoIterator<Item = (DocId, f64)>,
{
    if k == 0 {
        return Vec::new();
    }
    // heap minimum = lowest score, and among equal scores the highest id
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, Reverse<DocId>)>> =
        BinaryHeap::with_capacity(k.saturating_add(1).min(MAX_INITIAL_CAPACITY));
    for (id, score) in scored {
        heap.push(Reverse((OrderedFloat(score), Reverse(id))));
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut results: Vec<(DocId, f64)> = heap.into_iter().map(|Reverse((s, Reverse(id)))| (id, s.0)).collect();
    results.sort_unstable_by(ranked_order);
    results
}

/// Descending score, then ascending id.
pub fn ranked_order(a: &(DocId, f64), b: &(DocId, f64)) -> Ordering {
    OrderedFloat(b.1).cmp(&OrderedFloat(a.1)).then_with(|| a.0.cmp(&b.0))
}
