// ============================================
// Feature Reader
// ============================================
// Resolves dual-tier online features: a streamed "fresh" column
// (`<view>_fresh`) and a batch "common" column (`<view>`).
// Fresh always masks common when present, regardless of timestamps.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::OnlineFeatureClient;
use crate::config::Config;
use crate::error::Result;
use crate::models::{FeatureRequest, FeatureResponse, ItemSequence};

/// Separator used by list-valued features.
pub const LIST_SEPARATOR: char = ',';

const FRESH_SUFFIX: &str = "_fresh";
const REQUEST_DELIMITER: &str = ":";
const RESPONSE_DELIMITER: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Fresh,
    Common,
}

/// Logical feature, addressed as `<view>:<name>` in requests and
/// `<view>__<name>` in responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRef {
    pub feature_view: String,
    pub feature_name: String,
}

impl FeatureRef {
    pub fn new(feature_view: impl Into<String>, feature_name: impl Into<String>) -> Self {
        Self {
            feature_view: feature_view.into(),
            feature_name: feature_name.into(),
        }
    }

    pub fn request_name(&self, tier: Tier) -> String {
        self.full_name(tier, REQUEST_DELIMITER)
    }

    pub fn response_name(&self, tier: Tier) -> String {
        self.full_name(tier, RESPONSE_DELIMITER)
    }

    /// Both tiers, fresh first, in request form.
    pub fn request_names(&self) -> [String; 2] {
        [self.request_name(Tier::Fresh), self.request_name(Tier::Common)]
    }

    fn full_name(&self, tier: Tier, delimiter: &str) -> String {
        let suffix = match tier {
            Tier::Fresh => FRESH_SUFFIX,
            Tier::Common => "",
        };
        format!("{}{}{}{}", self.feature_view, suffix, delimiter, self.feature_name)
    }
}

impl FeatureResponse {
    /// Resolve a list-valued feature for the first entity.
    ///
    /// Returns the fresh value split on `,` when present and non-null, else
    /// the common value, else an empty list. Tiers are never merged and a
    /// missing column is never an error.
    pub fn resolve(&self, feature: &FeatureRef) -> Vec<String> {
        self.first_value(&feature.response_name(Tier::Fresh))
            .or_else(|| self.common_value(feature))
            .map(|value| split_list(&value))
            .unwrap_or_default()
    }

    /// Raw common-tier value, for features without a fresh source.
    pub fn common_value(&self, feature: &FeatureRef) -> Option<String> {
        self.first_value(&feature.response_name(Tier::Common))
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.metadata
            .feature_names
            .iter()
            .position(|name| name == column)
    }

    fn first_value(&self, column: &str) -> Option<String> {
        let idx = self.column_index(column)?;
        let value = self.results.get(idx)?.values.first()?;
        value_as_string(value)
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a user's recent-item sequence (and its timestamps) from the
/// online feature server.
pub struct ItemSequenceReader {
    client: Arc<dyn OnlineFeatureClient>,
    sequence: FeatureRef,
    timestamps: FeatureRef,
}

impl ItemSequenceReader {
    const ENTITY_KEY: &'static str = "user_id";

    pub fn new(client: Arc<dyn OnlineFeatureClient>, sequence: FeatureRef, timestamps: FeatureRef) -> Self {
        Self {
            client,
            sequence,
            timestamps,
        }
    }

    pub fn from_config(client: Arc<dyn OnlineFeatureClient>, config: &Config) -> Self {
        Self::new(
            client,
            FeatureRef::new(
                &config.item_sequence_feature_view,
                &config.item_sequence_feature_name,
            ),
            FeatureRef::new(
                &config.item_sequence_feature_view,
                &config.item_sequence_ts_feature_name,
            ),
        )
    }

    /// Missing data resolves to an empty sequence; deciding whether that is
    /// an error is up to the caller.
    pub async fn fetch(&self, user_id: &str) -> Result<ItemSequence> {
        let features = self
            .sequence
            .request_names()
            .into_iter()
            .chain(self.timestamps.request_names())
            .collect();
        let request = FeatureRequest::for_entity(Self::ENTITY_KEY, user_id, features);

        let response = self.client.get_online_features(&request).await?;
        info!(
            user_id,
            feature_names = ?response.metadata.feature_names,
            "Fetched item sequence features"
        );

        let item_sequence = response.resolve(&self.sequence);
        let item_sequence_ts = response.resolve(&self.timestamps);
        debug!(user_id, length = item_sequence.len(), "Resolved item sequence");

        Ok(ItemSequence {
            user_id: user_id.to_string(),
            item_sequence,
            item_sequence_ts,
        })
    }
}
