//! Subscriber notification dispatch
//!
//! The core decides whether a notification goes out and to whom; rendering
//! the message body is the dispatch endpoint's job.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::TrackedProduct;

/// Discount rate at which a listing counts as meeting the deal threshold
const DISCOUNT_THRESHOLD: f64 = 40.0;

/// What happened to a product, from a subscriber's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Welcome,
    BackInStock,
    LowestPrice,
    ThresholdMet,
}

/// Payload handed to the dispatch endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub product_url: String,
    pub product_title: String,
    pub current_price: f64,
    pub currency: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, product: &TrackedProduct) -> Self {
        Self {
            kind,
            product_url: product.url.clone(),
            product_title: product.title.clone(),
            current_price: product.current_price,
            currency: product.currency.clone(),
        }
    }
}

/// Outbound notification channel
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification to all recipients, attempted at most once
    async fn dispatch(&self, notification: &Notification, recipients: &[String]) -> Result<()>;
}

/// Pick the notification kind for a re-observation, if any
///
/// Checked in order: back in stock, new all-time low, discount threshold.
pub fn select_kind(previous: &TrackedProduct, updated: &TrackedProduct) -> Option<NotificationKind> {
    if previous.is_out_of_stock && !updated.is_out_of_stock {
        return Some(NotificationKind::BackInStock);
    }
    if updated.current_price < previous.lowest_price {
        return Some(NotificationKind::LowestPrice);
    }
    if updated.discount_rate.unwrap_or(0.0) >= DISCOUNT_THRESHOLD {
        return Some(NotificationKind::ThresholdMet);
    }
    None
}

/// Dispatcher that POSTs notification payloads to a webhook endpoint
pub struct WebhookDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    kind: NotificationKind,
    product_url: &'a str,
    product_title: &'a str,
    current_price: f64,
    currency: &'a str,
    recipients: &'a [String],
    sent_at: String,
}

impl WebhookDispatcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, notification: &Notification, recipients: &[String]) -> Result<()> {
        let payload = WebhookPayload {
            kind: notification.kind,
            product_url: &notification.product_url,
            product_title: &notification.product_title,
            current_price: notification.current_price,
            currency: &notification.currency,
            recipients,
            sent_at: Utc::now().to_rfc3339(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("User-Agent", "pricewatch/0.1")
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        log::info!(
            "Dispatched {:?} notification for {} to {} recipient(s)",
            notification.kind,
            notification.product_url,
            recipients.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::make_test_snapshot;
    use crate::reconcile::reconcile;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn product_at(price: f64) -> TrackedProduct {
        reconcile(&make_test_snapshot("https://shop.example/item/1", price), None)
    }

    #[test]
    fn select_kind_back_in_stock_wins() {
        let mut previous = product_at(100.0);
        previous.is_out_of_stock = true;
        let mut updated = product_at(50.0);
        updated.lowest_price = 50.0;

        assert_eq!(
            select_kind(&previous, &updated),
            Some(NotificationKind::BackInStock)
        );
    }

    #[test]
    fn select_kind_new_all_time_low() {
        let previous = product_at(100.0);
        let updated = product_at(80.0);

        assert_eq!(
            select_kind(&previous, &updated),
            Some(NotificationKind::LowestPrice)
        );
    }

    #[test]
    fn select_kind_discount_threshold() {
        let previous = product_at(100.0);
        let mut updated = product_at(100.0);
        updated.discount_rate = Some(45.0);

        assert_eq!(
            select_kind(&previous, &updated),
            Some(NotificationKind::ThresholdMet)
        );
    }

    #[test]
    fn select_kind_none_for_uninteresting_change() {
        let previous = product_at(100.0);
        let updated = product_at(110.0);

        assert_eq!(select_kind(&previous, &updated), None);
    }

    #[test]
    fn notification_kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&NotificationKind::BackInStock).unwrap();
        assert_eq!(json, "\"BACK_IN_STOCK\"");
    }

    #[tokio::test]
    async fn webhook_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(serde_json::json!({
                "kind": "WELCOME",
                "productUrl": "https://shop.example/item/1",
                "recipients": ["a@x.com"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(format!("{}/notify", server.uri()));
        let notification = Notification::new(NotificationKind::Welcome, &product_at(100.0));

        dispatcher
            .dispatch(&notification, &["a@x.com".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_surfaces_failure_as_notification_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(format!("{}/notify", server.uri()));
        let notification = Notification::new(NotificationKind::Welcome, &product_at(100.0));

        let result = dispatcher
            .dispatch(&notification, &["a@x.com".to_string()])
            .await;

        assert!(matches!(result, Err(Error::Notification(_))));
    }
}
