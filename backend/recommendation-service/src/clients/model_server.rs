use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use super::ScoringClient;
use crate::error::{AppError, Result};
use crate::models::{ScorePayload, ScoreRequest, ScoreResponse};
use crate::utils::with_timeout;

const SERVICE: &str = "model-server";

/// HTTP client for the sequence rating-prediction model (`POST /predict`).
/// No retries here; a failed call fails the request.
pub struct HttpScoringClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpScoringClient {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: format!("{}/predict", base_url.trim_end_matches('/')),
            timeout,
        }
    }
}

#[async_trait]
impl ScoringClient for HttpScoringClient {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse> {
        let payload = ScorePayload {
            input_data: request,
        };

        with_timeout(SERVICE, self.timeout, async {
            let response = self
                .client
                .post(&self.url)
                .header(ACCEPT, "application/json")
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    error!(error = %e, "Error connecting to model server");
                    AppError::upstream(SERVICE, None, e.to_string())
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!(status = status.as_u16(), body = %body, "Model server returned an error");
                return Err(AppError::upstream(SERVICE, Some(status.as_u16()), body));
            }

            let scored: ScoreResponse = response.json().await.map_err(|e| {
                AppError::upstream(
                    SERVICE,
                    Some(status.as_u16()),
                    format!("Invalid model server response: {}", e),
                )
            })?;

            debug!(returned = scored.scores.len(), "Model server response received");
            Ok(scored)
        })
        .await
    }
}
