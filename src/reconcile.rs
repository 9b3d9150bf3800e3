//! Reconciliation of a fresh snapshot against the stored record
//!
//! Merge precedence: new display metadata wins wholesale, the subscriber
//! set is carried forward untouched, and the price history only grows.

use crate::history;
use crate::model::{Snapshot, TrackedProduct};

/// Build the record to persist for one observation
///
/// Pure function of `(snapshot, existing)`; the result is a candidate for
/// persistence, not yet committed.
pub fn reconcile(snapshot: &Snapshot, existing: Option<&TrackedProduct>) -> TrackedProduct {
    let (id, subscribers, (price_history, stats)) = match existing {
        Some(prev) => (
            prev.id,
            prev.subscribers.clone(),
            history::merge(&prev.price_history, snapshot.current_price),
        ),
        None => (
            None,
            Vec::new(),
            history::merge(&[], snapshot.current_price),
        ),
    };

    TrackedProduct {
        id,
        url: snapshot.url.clone(),
        title: snapshot.title.clone(),
        image: snapshot.image.clone(),
        currency: snapshot.currency.clone(),
        category: snapshot.category.clone(),
        description: snapshot.description.clone(),
        discount_rate: snapshot.discount_rate,
        is_out_of_stock: snapshot.is_out_of_stock,
        current_price: snapshot.current_price,
        lowest_price: stats.lowest,
        highest_price: stats.highest,
        average_price: stats.average,
        price_history,
        subscribers,
    }
}
