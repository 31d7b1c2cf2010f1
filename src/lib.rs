//! Digital Goods Fulfillment
//!
//! Webhook backend for a conversational purchase flow: lists in-app products,
//! hands the user to the platform's purchase UI, consumes owned consumables and
//! reports the purchase outcome.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod models;
pub mod services;
pub mod tracing;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use handlers::FulfillmentService;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub fulfillment: Arc<FulfillmentService>,
}

impl AppState {
    pub fn new(fulfillment: FulfillmentService) -> Self {
        Self {
            fulfillment: Arc::new(fulfillment),
        }
    }
}

/// Builds the HTTP surface: the fulfillment webhook plus a health probe.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "digital-goods-fulfillment up" }))
        .route("/health", get(handlers::health::liveness_check))
        .route(
            "/fulfillment",
            post(handlers::fulfillment::fulfillment_webhook),
        )
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
