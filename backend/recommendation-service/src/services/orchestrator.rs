use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::aggregation::CandidateAggregator;
use super::features::ItemSequenceReader;
use super::ranking::Reranker;
use super::recall::{ItemToItemRecall, PopularRecall};
use crate::clients::{OnlineFeatureClient, ScoringClient};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::DebugTrace;
use crate::models::{
    ApiResponse, CandidateSet, FeatureRequest, FeatureResponse, ItemSequence, LastItemResponse,
    PopularResponse, RerankedResponse, ScoreRequest, ScoreResponse, ScoredItemsResponse,
    SimilarItemsResponse, UserFeatures,
};
use crate::store::KeyValueStore;

/// 推薦請求編排
///
/// Stateless between requests: every call reads the external stores and
/// builds its result from scratch.
pub struct RecommendationOrchestrator {
    popular: Arc<PopularRecall>,
    i2i: Arc<ItemToItemRecall>,
    item_sequences: ItemSequenceReader,
    features: Arc<dyn OnlineFeatureClient>,
    scoring: Arc<dyn ScoringClient>,
    reranker: Reranker,
}

impl RecommendationOrchestrator {
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        features: Arc<dyn OnlineFeatureClient>,
        scoring: Arc<dyn ScoringClient>,
    ) -> Self {
        Self {
            popular: Arc::new(PopularRecall::new(
                Arc::clone(&store),
                &config.popular_key,
            )),
            i2i: Arc::new(ItemToItemRecall::new(store, &config.i2i_key_prefix)),
            item_sequences: ItemSequenceReader::from_config(Arc::clone(&features), config),
            features,
            reranker: Reranker::new(Arc::clone(&scoring)),
            scoring,
        }
    }

    /// `GET /recs/popular`
    pub async fn popular(&self, count: usize, trace: &DebugTrace) -> Result<PopularResponse> {
        let set = self.popular.fetch(Some(count)).await?;
        trace.record(format!("Fetched {} popular items", set.recommendations.len()));

        Ok(PopularResponse {
            recommendations: set.recommendations,
        })
    }

    /// `GET /recs/i2i`
    pub async fn similar_items(
        &self,
        item_id: &str,
        count: usize,
        trace: &DebugTrace,
    ) -> Result<SimilarItemsResponse> {
        let set = self.i2i.fetch(item_id, Some(count)).await?;
        trace.record(format!(
            "Fetched {} similar items for item_id: {}",
            set.recommendations.len(),
            item_id
        ));

        Ok(SimilarItemsResponse {
            item_id: item_id.to_string(),
            recommendations: set.recommendations,
        })
    }

    /// `GET /recs/u2i/last_item_i2i`: i2i anchored on the user's latest item.
    pub async fn last_item_similar(
        &self,
        user_id: &str,
        count: usize,
        trace: &DebugTrace,
    ) -> Result<LastItemResponse> {
        trace.record(format!("Getting recent items for user_id: {}", user_id));
        let seed = self.seed_sequence(user_id).await?;
        let last_item_id = Self::anchor(&seed)?.to_string();
        trace.record(format!("Most recently interacted item: {}", last_item_id));

        let set = self.i2i.fetch(&last_item_id, Some(count)).await?;

        Ok(LastItemResponse {
            user_id: user_id.to_string(),
            last_item_id,
            recommendations: set.recommendations,
        })
    }

    /// `GET /recs/u2i/rerank`
    ///
    /// FetchSeed → FetchCandidates (popular ∥ i2i) → Aggregate → Rerank →
    /// Assemble. Any failure before assembly fails the whole request.
    pub async fn reranked_for_user(
        &self,
        user_id: &str,
        top_k_retrieval: usize,
        count: usize,
        trace: &DebugTrace,
    ) -> Result<ApiResponse<RerankedResponse>> {
        let seed = self.seed_sequence(user_id).await?;
        let anchor = Self::anchor(&seed)?;
        trace.record(format!("Most recently interacted item: {}", anchor));

        let candidate_sets = self.fetch_candidates(anchor, top_k_retrieval).await?;

        let aggregated = CandidateAggregator::aggregate(&candidate_sets, &seed.item_sequence);
        trace.record(format!(
            "Removing {} items already rated by this user: {:?}",
            aggregated.consumed.len(),
            aggregated.consumed
        ));

        let outcome = self
            .reranker
            .rerank(
                user_id,
                &aggregated.candidates,
                &seed.item_sequence,
                count,
                trace,
            )
            .await?;

        info!(
            user_id,
            candidates = aggregated.candidates.len(),
            returned = outcome.recommendations.len(),
            "Reranked recommendations assembled"
        );

        let response = RerankedResponse {
            user_id: user_id.to_string(),
            features: UserFeatures {
                item_sequence: seed.item_sequence,
            },
            recommendations: outcome.recommendations,
        };

        Ok(ApiResponse::new(response).with_rerank_metadata(outcome.metadata))
    }

    /// `GET /feast/fetch/item_sequence`: resolved sequence, possibly empty.
    pub async fn item_sequence(&self, user_id: &str) -> Result<ItemSequence> {
        self.item_sequences.fetch(user_id).await
    }

    /// `POST /feast/fetch`
    pub async fn fetch_features(&self, request: &FeatureRequest) -> Result<FeatureResponse> {
        self.features.get_online_features(request).await
    }

    /// `POST /score/seq_rating_prediction`
    pub async fn score(
        &self,
        request: &ScoreRequest,
        trace: &DebugTrace,
    ) -> Result<ApiResponse<ScoredItemsResponse>> {
        if !request.is_aligned() {
            return Err(AppError::BadRequest(format!(
                "user_ids ({}), item_sequences ({}) and item_ids ({}) must have equal length",
                request.user_ids.len(),
                request.item_sequences.len(),
                request.item_ids.len()
            )));
        }

        trace.record(format!(
            "Calling seq_rating_prediction with {} candidates",
            request.len()
        ));
        let ScoreResponse {
            item_ids,
            scores,
            metadata,
        } = self.scoring.score(request).await?;

        Ok(ApiResponse::new(ScoredItemsResponse { item_ids, scores }).with_upstream_metadata(metadata))
    }

    /// Recent-item sequence for the user; an empty one is NotFound because
    /// nothing downstream can run without an anchor.
    async fn seed_sequence(&self, user_id: &str) -> Result<ItemSequence> {
        let seed = self.item_sequences.fetch(user_id).await?;
        if seed.item_sequence.is_empty() {
            warn!(user_id, "No recent items for user");
            return Err(AppError::NotFound(format!(
                "No recent items found for user_id: {}",
                user_id
            )));
        }
        Ok(seed)
    }

    fn anchor(seed: &ItemSequence) -> Result<&str> {
        seed.last_item().ok_or_else(|| {
            AppError::NotFound(format!("No recent items found for user_id: {}", seed.user_id))
        })
    }

    /// Popular and i2i recall as two spawned tasks joined together. The first
    /// failure aborts the sibling and is returned.
    async fn fetch_candidates(&self, anchor: &str, limit: usize) -> Result<Vec<CandidateSet>> {
        let mut tasks: JoinSet<Result<CandidateSet>> = JoinSet::new();

        let popular = Arc::clone(&self.popular);
        tasks.spawn(async move { popular.fetch(Some(limit)).await });

        let i2i = Arc::clone(&self.i2i);
        let anchor = anchor.to_string();
        tasks.spawn(async move { i2i.fetch(&anchor, Some(limit)).await });

        let mut sets = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => Err(AppError::Internal(format!(
                    "Candidate fetch task failed: {}",
                    join_err
                ))),
            };

            match result {
                Ok(set) => {
                    debug!(
                        source = set.source.as_str(),
                        returned = set.recommendations.len(),
                        "Candidate source completed"
                    );
                    sets.push(set);
                }
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }

        // Completion order is arbitrary; keep output deterministic.
        sets.sort_by_key(|set| set.source);
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MockOnlineFeatureClient, MockScoringClient};
    use crate::config::test_config;
    use crate::models::{FeatureMetadata, FeatureResult};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn sequence_response(sequence: Option<&str>) -> FeatureResponse {
        let value = sequence.map(Value::from).unwrap_or(Value::Null);
        FeatureResponse {
            metadata: FeatureMetadata {
                feature_names: vec![
                    "user_id".to_string(),
                    "user_rating_stats__user_rating_list_10_recent_asin".to_string(),
                ],
            },
            results: vec![
                FeatureResult {
                    values: vec![json!("u1")],
                    ..Default::default()
                },
                FeatureResult {
                    values: vec![value],
                    ..Default::default()
                },
            ],
        }
    }

    fn features_returning(sequence: Option<&'static str>) -> Arc<MockOnlineFeatureClient> {
        let mut client = MockOnlineFeatureClient::new();
        client
            .expect_get_online_features()
            .returning(move |_| Ok(sequence_response(sequence)));
        Arc::new(client)
    }

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert(
            "output:popular",
            r#"{"rec_item_ids": ["p1", "p2", "x2"], "rec_scores": [30.0, 20.0, 10.0]}"#,
        );
        store.insert(
            "output:i2i:x4",
            r#"{"rec_item_ids": ["q1", "p1"], "rec_scores": [0.9, 0.8]}"#,
        );
        store
    }

    /// Scores each candidate by its position in `order` (earlier = higher).
    fn scoring_by_order(order: &'static [&'static str]) -> MockScoringClient {
        let mut client = MockScoringClient::new();
        client.expect_score().returning(move |req| {
            let scores = req
                .item_ids
                .iter()
                .map(|id| {
                    let rank = order.iter().position(|o| o == id).unwrap_or(order.len());
                    1.0 - rank as f64 / 10.0
                })
                .collect();
            Ok(ScoreResponse {
                item_ids: req.item_ids.clone(),
                scores,
                metadata: json!({"model_name": "sequence"}),
            })
        });
        client
    }

    #[tokio::test]
    async fn test_end_to_end_rerank() {
        let mut scoring = MockScoringClient::new();
        scoring
            .expect_score()
            .withf(|req| {
                let mut ids = req.item_ids.clone();
                ids.sort();
                ids == vec!["p1", "p2", "q1"]
                    && req.item_sequences[0] == vec!["x1", "x2", "x3", "x4"]
            })
            .times(1)
            .returning(|req| {
                let scores = req
                    .item_ids
                    .iter()
                    .map(|id| match id.as_str() {
                        "q1" => 0.9,
                        "p2" => 0.7,
                        _ => 0.2,
                    })
                    .collect();
                Ok(ScoreResponse {
                    item_ids: req.item_ids.clone(),
                    scores,
                    metadata: json!({"model_version": "1"}),
                })
            });

        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            seeded_store(),
            features_returning(Some("x1,x2,x3,x4")),
            Arc::new(scoring),
        );

        let trace = DebugTrace::enabled();
        let response = orchestrator
            .reranked_for_user("u1", 100, 10, &trace)
            .await
            .unwrap();

        assert_eq!(
            response.data.recommendations.rec_item_ids,
            vec!["q1", "p2", "p1"]
        );
        assert_eq!(
            response.data.features.item_sequence,
            vec!["x1", "x2", "x3", "x4"]
        );
        assert_eq!(
            response.envelope.metadata.rerank,
            Some(json!({"model_version": "1"}))
        );
        assert!(trace
            .lines()
            .iter()
            .any(|l| l == "Most recently interacted item: x4"));
        assert!(trace
            .lines()
            .iter()
            .any(|l| l.starts_with("Removing 1 items already rated")));
    }

    #[tokio::test]
    async fn test_count_truncates_reranked_output() {
        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            seeded_store(),
            features_returning(Some("x1,x2,x3,x4")),
            Arc::new(scoring_by_order(&["q1", "p2", "p1"])),
        );

        let response = orchestrator
            .reranked_for_user("u1", 100, 2, &DebugTrace::disabled())
            .await
            .unwrap();

        assert_eq!(response.data.recommendations.rec_item_ids, vec!["q1", "p2"]);
    }

    #[tokio::test]
    async fn test_empty_seed_is_not_found() {
        let mut scoring = MockScoringClient::new();
        scoring.expect_score().never();

        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            seeded_store(),
            features_returning(None),
            Arc::new(scoring),
        );

        let err = orchestrator
            .reranked_for_user("u1", 100, 10, &DebugTrace::disabled())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_i2i_list_fails_request() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(
            "output:popular",
            r#"{"rec_item_ids": ["p1"], "rec_scores": [1.0]}"#,
        );
        let mut scoring = MockScoringClient::new();
        scoring.expect_score().never();

        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            store,
            features_returning(Some("x1,x4")),
            Arc::new(scoring),
        );

        let err = orchestrator
            .reranked_for_user("u1", 100, 10, &DebugTrace::disabled())
            .await
            .unwrap_err();

        match err {
            AppError::NotFound(msg) => assert!(msg.contains("output:i2i:x4")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_candidates_consumed_returns_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(
            "output:popular",
            r#"{"rec_item_ids": ["x1"], "rec_scores": [1.0]}"#,
        );
        store.insert(
            "output:i2i:x2",
            r#"{"rec_item_ids": ["x1", "x2"], "rec_scores": [1.0, 0.5]}"#,
        );
        let mut scoring = MockScoringClient::new();
        scoring.expect_score().never();

        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            store,
            features_returning(Some("x1,x2")),
            Arc::new(scoring),
        );

        let response = orchestrator
            .reranked_for_user("u1", 100, 10, &DebugTrace::disabled())
            .await
            .unwrap();

        assert!(response.data.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_score_mismatch_fails_request() {
        let mut scoring = MockScoringClient::new();
        scoring.expect_score().returning(|req| {
            Ok(ScoreResponse {
                item_ids: req.item_ids[..1].to_vec(),
                scores: vec![0.5],
                metadata: Value::Null,
            })
        });

        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            seeded_store(),
            features_returning(Some("x1,x2,x3,x4")),
            Arc::new(scoring),
        );

        let err = orchestrator
            .reranked_for_user("u1", 100, 10, &DebugTrace::disabled())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InternalMismatch(_)));
    }

    /// Store whose popular read never finishes unless aborted; flags drop.
    struct HangingStore {
        inner: InMemoryStore,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for HangingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            if key == "output:popular" {
                let _flag = DropFlag(Arc::clone(&self.dropped));
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.get(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_branch_aborts_sibling() {
        let dropped = Arc::new(AtomicBool::new(false));
        let store = Arc::new(HangingStore {
            inner: InMemoryStore::new(),
            dropped: Arc::clone(&dropped),
        });
        let mut scoring = MockScoringClient::new();
        scoring.expect_score().never();

        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            store,
            features_returning(Some("x1,x4")),
            Arc::new(scoring),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.reranked_for_user("u1", 100, 10, &DebugTrace::disabled()),
        )
        .await
        .expect("orchestrator must not wait for the hanging branch");

        assert!(matches!(result, Err(AppError::NotFound(_))));

        // Abort is delivered at the next poll of the hanging task.
        for _ in 0..50 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_popular_is_idempotent() {
        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            seeded_store(),
            features_returning(None),
            Arc::new(MockScoringClient::new()),
        );

        let first = orchestrator.popular(5, &DebugTrace::disabled()).await.unwrap();
        let second = orchestrator.popular(5, &DebugTrace::disabled()).await.unwrap();

        assert_eq!(first.recommendations, second.recommendations);
        assert_eq!(first.recommendations.rec_item_ids, vec!["p1", "p2", "x2"]);
    }

    #[tokio::test]
    async fn test_last_item_similar() {
        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            seeded_store(),
            features_returning(Some("x1,x2,x3,x4")),
            Arc::new(MockScoringClient::new()),
        );

        let response = orchestrator
            .last_item_similar("u1", 1, &DebugTrace::disabled())
            .await
            .unwrap();

        assert_eq!(response.last_item_id, "x4");
        assert_eq!(response.recommendations.rec_item_ids, vec!["q1"]);
    }

    #[tokio::test]
    async fn test_score_rejects_unaligned_request() {
        let orchestrator = RecommendationOrchestrator::new(
            &test_config(),
            seeded_store(),
            features_returning(None),
            Arc::new(MockScoringClient::new()),
        );

        let request = ScoreRequest {
            user_ids: vec!["u1".into()],
            item_sequences: vec![],
            item_ids: vec!["a".into()],
        };
        let err = orchestrator
            .score(&request, &DebugTrace::disabled())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
