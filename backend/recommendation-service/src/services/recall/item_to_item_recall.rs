use std::sync::Arc;
use tracing::debug;

use super::load_recommendations;
use crate::error::Result;
use crate::models::{CandidateSet, RecallSource};
use crate::store::KeyValueStore;

/// Item-to-Item Recall Strategy
///
/// Reads the precomputed neighbour list of an anchor item, stored under
/// `<prefix><item_id>` as `{"rec_item_ids": [...], "rec_scores": [...]}`.
pub struct ItemToItemRecall {
    store: Arc<dyn KeyValueStore>,
    key_prefix: String,
}

impl ItemToItemRecall {
    pub fn new(store: Arc<dyn KeyValueStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn key_for(&self, item_id: &str) -> String {
        format!("{}{}", self.key_prefix, item_id)
    }

    pub async fn fetch(&self, item_id: &str, count: Option<usize>) -> Result<CandidateSet> {
        let key = self.key_for(item_id);
        let recommendations = load_recommendations(self.store.as_ref(), &key, count).await?;
        debug!(item_id, returned = recommendations.len(), "I2I recall completed");
        Ok(CandidateSet::new(RecallSource::ItemToItem, recommendations))
    }
}
