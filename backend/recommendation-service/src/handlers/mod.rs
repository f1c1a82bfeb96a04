//! HTTP handlers
//!
//! Every recommendation endpoint runs its orchestrator call inside the
//! request middleware chain, which stamps `metadata.rec_id` and attaches
//! `debug_info` when asked.

pub mod features;
pub mod recommendation;

use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::config::RequestLimits;
use crate::middleware::MiddlewareStack;
use crate::services::RecommendationOrchestrator;

pub use features::{fetch_features, get_item_sequence, score_sequences, DebugQuery, UserQuery};
pub use recommendation::{
    get_last_item_i2i, get_popular, get_reranked, get_similar_items, ItemQuery, PopularQuery,
    RerankQuery, UserCountQuery,
};

/// Shared handler state
pub struct RecommendationState {
    pub orchestrator: Arc<RecommendationOrchestrator>,
    pub pipeline: MiddlewareStack,
    pub limits: RequestLimits,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Register all routes. State is expected as `web::Data<RecommendationState>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .service(get_popular)
        .service(get_similar_items)
        .service(get_last_item_i2i)
        .service(get_reranked)
        .service(get_item_sequence)
        .service(fetch_features)
        .service(score_sequences);
}
