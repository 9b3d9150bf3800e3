//! Pricewatch - Product Price Tracking
//!
//! Ingests normalized snapshots of externally listed products, keeps an
//! append-only price history per product with derived statistics, and
//! notifies subscribers when a listing changes.

pub mod error;
pub mod history;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod scraper;
pub mod store;
pub mod tracker;
pub mod web;

pub use error::{Error, Result};
pub use model::{PricePoint, RegistrationOutcome, Snapshot, Subscriber, TrackedProduct};
pub use notify::{Notification, NotificationDispatcher, NotificationKind, WebhookDispatcher};
pub use scraper::{HttpSnapshotSource, SnapshotSource};
pub use store::ProductStore;
pub use tracker::{LogInvalidator, SweepReport, Tracker, ViewInvalidator};
