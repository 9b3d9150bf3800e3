//! Core data types for tracked products and their observations

use serde::{Deserialize, Serialize};

/// One externally observed state of a product listing
///
/// Produced by the extraction service for one URL at one instant; exists
/// only to be folded into a [`TrackedProduct`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub url: String,
    pub title: String,
    pub image: String,
    pub currency: String,
    pub current_price: f64,
    #[serde(default)]
    pub discount_rate: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub is_out_of_stock: bool,
}

/// One historical price observation
///
/// Ordering is insertion order; the store keeps a per-product sequence
/// number alongside each point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
}

/// A contact address registered against a tracked product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
}

/// The persisted aggregate keyed by canonical URL
///
/// `lowest_price`, `highest_price` and `average_price` are always derived
/// from `price_history`, never set independently.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProduct {
    /// Store-assigned row id; `None` until first persisted
    pub id: Option<i64>,
    pub url: String,
    pub title: String,
    pub image: String,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    pub discount_rate: Option<f64>,
    pub is_out_of_stock: bool,
    pub current_price: f64,
    pub lowest_price: f64,
    pub highest_price: f64,
    pub average_price: f64,
    pub price_history: Vec<PricePoint>,
    pub subscribers: Vec<Subscriber>,
}

/// Result of a subscriber registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Address was new and is now registered
    Added,
    /// Address was already registered; nothing changed
    AlreadyPresent,
    /// No product with the given identity exists
    NotFound,
}

#[cfg(test)]
pub use tests::make_test_snapshot;
