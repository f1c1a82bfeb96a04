use std::sync::Arc;
use tracing::debug;

use super::load_recommendations;
use crate::error::Result;
use crate::models::{CandidateSet, RecallSource};
use crate::store::KeyValueStore;

/// Popular Recall - 熱門召回
/// 讀取全域熱門排行榜，截斷到請求數量
pub struct PopularRecall {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl PopularRecall {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub async fn fetch(&self, count: Option<usize>) -> Result<CandidateSet> {
        let recommendations = load_recommendations(self.store.as_ref(), &self.key, count).await?;
        debug!(key = %self.key, returned = recommendations.len(), "Popular recall completed");
        Ok(CandidateSet::new(RecallSource::Popular, recommendations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::store::InMemoryStore;

    fn store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert(
            "output:popular",
            r#"{"rec_item_ids": ["p1", "p2", "p3", "p4", "p5", "p6"],
                "rec_scores": [60.0, 50.0, 40.0, 30.0, 20.0, 10.0]}"#,
        );
        store
    }

    #[tokio::test]
    async fn test_truncates_to_count() {
        let recall = PopularRecall::new(store(), "output:popular");
        let set = recall.fetch(Some(2)).await.unwrap();

        assert_eq!(set.source, RecallSource::Popular);
        assert_eq!(set.item_ids(), ["p1", "p2"]);
        assert_eq!(set.recommendations.rec_scores, vec![60.0, 50.0]);
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let recall = PopularRecall::new(store(), "output:popular");
        let first = recall.fetch(Some(5)).await.unwrap();
        let second = recall.fetch(Some(5)).await.unwrap();

        assert_eq!(first.recommendations, second.recommendations);
    }

    #[tokio::test]
    async fn test_missing_popular_list() {
        let recall = PopularRecall::new(Arc::new(InMemoryStore::new()), "output:popular");
        let err = recall.fetch(Some(5)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
