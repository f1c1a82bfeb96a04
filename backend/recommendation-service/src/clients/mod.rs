//! Clients for the network collaborators this service reads from.
//!
//! Both traits are the seams the orchestrator depends on; the HTTP
//! implementations are wired in `main`, tests substitute mocks.

mod feature_server;
mod model_server;

pub use feature_server::HttpFeatureClient;
pub use model_server::HttpScoringClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FeatureRequest, FeatureResponse, ScoreRequest, ScoreResponse};

/// Batched online feature read. Callers name the fresh and common columns
/// explicitly; the server does no freshness resolution of its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OnlineFeatureClient: Send + Sync {
    async fn get_online_features(&self, request: &FeatureRequest) -> Result<FeatureResponse>;
}

/// External rating-prediction model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoringClient: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse>;
}
