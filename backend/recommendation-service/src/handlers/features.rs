//! Feature and scoring passthrough handlers

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use super::RecommendationState;
use crate::error::Result;
use crate::middleware::{request_id, RequestContext};
use crate::models::{ApiResponse, FeatureRequest, ScoreRequest};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DebugQuery {
    #[serde(default)]
    pub debug: bool,
}

/// GET /feast/fetch/item_sequence
#[get("/feast/fetch/item_sequence")]
pub async fn get_item_sequence(
    req: HttpRequest,
    query: web::Query<UserQuery>,
    state: web::Data<RecommendationState>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let ctx = RequestContext::new(request_id(&req), "item_sequence", query.debug);
    let orchestrator = state.orchestrator.clone();

    let response = state
        .pipeline
        .run(ctx, |_| async move {
            orchestrator
                .item_sequence(&query.user_id)
                .await
                .map(ApiResponse::new)
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// POST /feast/fetch
///
/// Raw feature server response, no envelope.
#[post("/feast/fetch")]
pub async fn fetch_features(
    body: web::Json<FeatureRequest>,
    state: web::Data<RecommendationState>,
) -> Result<HttpResponse> {
    let response = state.orchestrator.fetch_features(&body).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /score/seq_rating_prediction
#[post("/score/seq_rating_prediction")]
pub async fn score_sequences(
    req: HttpRequest,
    query: web::Query<DebugQuery>,
    body: web::Json<ScoreRequest>,
    state: web::Data<RecommendationState>,
) -> Result<HttpResponse> {
    let ctx = RequestContext::new(request_id(&req), "seq_rating_prediction", query.debug);
    let request = body.into_inner();
    let orchestrator = state.orchestrator.clone();

    let response = state
        .pipeline
        .run(ctx, |ctx| async move { orchestrator.score(&request, &ctx.trace).await })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}
