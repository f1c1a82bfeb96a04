use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};

use super::OnlineFeatureClient;
use crate::error::{AppError, Result};
use crate::models::{FeatureRequest, FeatureResponse};
use crate::utils::with_timeout;

const SERVICE: &str = "feature-server";

#[derive(Debug, Serialize)]
struct OnlineFeaturesPayload<'a> {
    entities: &'a BTreeMap<String, Vec<String>>,
    features: &'a [String],
    full_feature_names: bool,
}

/// HTTP client for the online feature server's `get-online-features`.
pub struct HttpFeatureClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpFeatureClient {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: format!("{}/get-online-features", base_url.trim_end_matches('/')),
            timeout,
        }
    }
}

#[async_trait]
impl OnlineFeatureClient for HttpFeatureClient {
    async fn get_online_features(&self, request: &FeatureRequest) -> Result<FeatureResponse> {
        // Full names let the reader tell `view_fresh__name` from `view__name`.
        let payload = OnlineFeaturesPayload {
            entities: &request.entities,
            features: &request.features,
            full_feature_names: true,
        };

        info!(url = %self.url, features = request.features.len(), "Sending request to feature server");

        with_timeout(SERVICE, self.timeout, async {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| AppError::upstream(SERVICE, None, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!(status = status.as_u16(), body = %body, "Error fetching features");
                return Err(AppError::upstream(SERVICE, Some(status.as_u16()), body));
            }

            let features: FeatureResponse = response.json().await.map_err(|e| {
                AppError::upstream(
                    SERVICE,
                    Some(status.as_u16()),
                    format!("Invalid feature server response: {}", e),
                )
            })?;

            debug!(feature_names = ?features.metadata.feature_names, "Feature server response");
            Ok(features)
        })
        .await
    }
}
