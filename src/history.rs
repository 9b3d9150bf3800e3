//! Price history merging and derived statistics

use crate::model::PricePoint;

/// Derived price statistics over a history sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceStats {
    pub lowest: f64,
    pub highest: f64,
    pub average: f64,
}

/// Compute lowest/highest/average over a price sequence
///
/// The sequence must be non-empty; a tracked product always has at least
/// one observation.
pub fn stats(points: &[PricePoint]) -> PriceStats {
    debug_assert!(!points.is_empty());

    let mut lowest = f64::INFINITY;
    let mut highest = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for point in points {
        lowest = lowest.min(point.price);
        highest = highest.max(point.price);
        sum += point.price;
    }

    PriceStats {
        lowest,
        highest,
        average: sum / points.len() as f64,
    }
}

/// Append a new observation to a price history and recompute statistics
///
/// Pure: prior points are never mutated or dropped, and the returned
/// sequence is exactly one point longer than the input.
pub fn merge(existing: &[PricePoint], new_price: f64) -> (Vec<PricePoint>, PriceStats) {
    let mut updated = Vec::with_capacity(existing.len() + 1);
    updated.extend_from_slice(existing);
    updated.push(PricePoint { price: new_price });

    let merged_stats = stats(&updated);
    (updated, merged_stats)
}
