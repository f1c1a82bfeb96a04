//! Recommendation API Handlers
//!
//! `/recs/*` endpoints: popular, item-to-item, last-item i2i and the
//! reranked per-user pipeline.

use actix_web::{get, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::debug;

use super::RecommendationState;
use crate::error::Result;
use crate::middleware::{request_id, RequestContext};
use crate::models::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    pub count: Option<usize>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub item_id: String,
    pub count: Option<usize>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserCountQuery {
    pub user_id: String,
    pub count: Option<usize>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Deserialize)]
pub struct RerankQuery {
    pub user_id: String,
    /// Candidates requested from each retrieval source.
    pub top_k_retrieval: Option<usize>,
    /// Final number of recommendations returned.
    pub count: Option<usize>,
    #[serde(default)]
    pub debug: bool,
}

/// GET /recs/popular
#[get("/recs/popular")]
pub async fn get_popular(
    req: HttpRequest,
    query: web::Query<PopularQuery>,
    state: web::Data<RecommendationState>,
) -> Result<HttpResponse> {
    let count = state.limits.count(query.count);
    let ctx = RequestContext::new(request_id(&req), "popular", query.debug);
    let orchestrator = state.orchestrator.clone();

    let response = state
        .pipeline
        .run(ctx, |ctx| async move {
            orchestrator
                .popular(count, &ctx.trace)
                .await
                .map(ApiResponse::new)
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// GET /recs/i2i
#[get("/recs/i2i")]
pub async fn get_similar_items(
    req: HttpRequest,
    query: web::Query<ItemQuery>,
    state: web::Data<RecommendationState>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let count = state.limits.count(query.count);
    let ctx = RequestContext::new(request_id(&req), "i2i", query.debug);
    let orchestrator = state.orchestrator.clone();

    let response = state
        .pipeline
        .run(ctx, |ctx| async move {
            orchestrator
                .similar_items(&query.item_id, count, &ctx.trace)
                .await
                .map(ApiResponse::new)
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// GET /recs/u2i/last_item_i2i
#[get("/recs/u2i/last_item_i2i")]
pub async fn get_last_item_i2i(
    req: HttpRequest,
    query: web::Query<UserCountQuery>,
    state: web::Data<RecommendationState>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let count = state.limits.count(query.count);
    let ctx = RequestContext::new(request_id(&req), "last_item_i2i", query.debug);
    let orchestrator = state.orchestrator.clone();

    let response = state
        .pipeline
        .run(ctx, |ctx| async move {
            orchestrator
                .last_item_similar(&query.user_id, count, &ctx.trace)
                .await
                .map(ApiResponse::new)
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// GET /recs/u2i/rerank
#[get("/recs/u2i/rerank")]
pub async fn get_reranked(
    req: HttpRequest,
    query: web::Query<RerankQuery>,
    state: web::Data<RecommendationState>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let top_k_retrieval = state.limits.top_k_retrieval(query.top_k_retrieval);
    let count = state.limits.count(query.count);
    debug!(
        user_id = %query.user_id,
        top_k_retrieval,
        count,
        "Reranked recommendations requested"
    );

    let ctx = RequestContext::new(request_id(&req), "u2i_rerank", query.debug);
    let orchestrator = state.orchestrator.clone();

    let response = state
        .pipeline
        .run(ctx, |ctx| async move {
            orchestrator
                .reranked_for_user(&query.user_id, top_k_retrieval, count, &ctx.trace)
                .await
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}
