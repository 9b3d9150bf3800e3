//! REST API for the price tracker
//!
//! Thin layer over [`Tracker`] and its store; holds no logic of its own.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::Error;
use crate::model::{RegistrationOutcome, TrackedProduct};
use crate::tracker::Tracker;

/// Shared application state
#[derive(Clone)]
struct AppState {
    tracker: Arc<Tracker>,
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Similar-products query parameters
#[derive(Deserialize)]
struct SimilarParams {
    #[serde(default = "default_similar_limit")]
    limit: usize,
}

fn default_similar_limit() -> usize {
    3
}

#[derive(Deserialize)]
struct TrackRequest {
    url: String,
}

#[derive(Deserialize)]
struct SubscribeRequest {
    email: String,
}

/// GET /api/products
async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TrackedProduct>>>, StatusCode> {
    match state.tracker.store().find_all() {
        Ok(products) => Ok(ApiResponse::ok(products)),
        Err(e) => {
            log::error!("Failed to list products: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/products/{id}
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<TrackedProduct>>, StatusCode> {
    match state.tracker.store().find_by_id(id) {
        Ok(Some(product)) => Ok(ApiResponse::ok(product)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            log::error!("Failed to load product {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/products/{id}/similar?limit={limit}
async fn similar_products(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<ApiResponse<Vec<TrackedProduct>>>, StatusCode> {
    match state.tracker.store().find_excluding(id, params.limit) {
        Ok(products) => Ok(ApiResponse::ok(products)),
        Err(e) => {
            log::error!("Failed to load similar products for {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/products - start tracking a listing URL
async fn track_product(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> Result<Json<ApiResponse<()>>, StatusCode> {
    match state.tracker.ingest(&request.url).await {
        Ok(()) => Ok(ApiResponse::ok(())),
        Err(e) => {
            log::error!("Failed to track {}: {}", request.url, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/products/{id}/subscribe
async fn subscribe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<ApiResponse<RegistrationOutcome>>, StatusCode> {
    match state.tracker.register(id, &request.email).await {
        Ok(RegistrationOutcome::NotFound) => Err(StatusCode::NOT_FOUND),
        Ok(outcome) => Ok(ApiResponse::ok(outcome)),
        // Subscription committed but the welcome didn't go out; distinct
        // from a persistence failure
        Err(Error::Notification(e)) => {
            log::error!("Welcome dispatch failed for product {}: {}", id, e);
            Err(StatusCode::BAD_GATEWAY)
        }
        Err(e) => {
            log::error!("Failed to register for product {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Build the API router
pub fn create_router(tracker: Arc<Tracker>) -> Router {
    let state = AppState { tracker };

    Router::new()
        .route("/api/products", get(list_products).post(track_product))
        .route("/api/products/{id}", get(get_product))
        .route("/api/products/{id}/similar", get(similar_products))
        .route("/api/products/{id}/subscribe", post(subscribe))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server (async)
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
pub async fn serve(tracker: Arc<Tracker>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(tracker);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
