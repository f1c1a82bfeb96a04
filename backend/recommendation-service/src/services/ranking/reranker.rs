use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::ScoringClient;
use crate::error::{AppError, Result};
use crate::middleware::DebugTrace;
use crate::models::{Recommendations, ScoreRequest, ScorePayload, ScoreResponse, ScoredItem};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RerankOutcome {
    pub recommendations: Recommendations,
    /// Opaque metadata returned by the model server.
    pub metadata: Value,
}

pub struct Reranker {
    client: Arc<dyn ScoringClient>,
}

impl Reranker {
    pub fn new(client: Arc<dyn ScoringClient>) -> Self {
        Self { client }
    }

    /// Score `candidates` for `user_id` and return the top `count`.
    ///
    /// Zero candidates short-circuit without calling the model server. A
    /// response whose arrays do not match the candidate count fails the
    /// whole call; no partial ranking is returned.
    pub async fn rerank(
        &self,
        user_id: &str,
        candidates: &[String],
        item_sequence: &[String],
        count: usize,
        trace: &DebugTrace,
    ) -> Result<RerankOutcome> {
        if candidates.is_empty() {
            debug!(user_id, "No candidates to rerank");
            return Ok(RerankOutcome::default());
        }

        let request = ScoreRequest::broadcast(user_id, item_sequence, candidates);
        if trace.is_active() {
            trace.record(format!(
                "[COLLECT] Payload prepared: <features>{}</features>",
                serde_json::to_string(&ScorePayload {
                    input_data: &request
                })?
            ));
        }

        let response = self.client.score(&request).await?;
        if trace.is_active() {
            trace.record(format!(
                "[COLLECT] Response from external service: <result>{}</result>",
                serde_json::to_string(&response)?
            ));
        }

        let ScoreResponse {
            item_ids,
            scores,
            metadata,
        } = response;

        let scored = match_scores(candidates, item_ids, scores)?;
        let recommendations = rank_by_score(scored, count);

        info!(
            user_id,
            candidates = candidates.len(),
            returned = recommendations.len(),
            "Rerank completed"
        );

        Ok(RerankOutcome {
            recommendations,
            metadata,
        })
    }
}

/// Pair returned item ids with their scores, checking the response covers
/// exactly the requested candidates: equal lengths, no unknown ids and no
/// repeats leave a one-to-one mapping. The pairing follows the returned ids,
/// never the request positions.
fn match_scores(
    candidates: &[String],
    item_ids: Vec<String>,
    scores: Vec<f64>,
) -> Result<Vec<ScoredItem>> {
    if scores.len() != candidates.len() || item_ids.len() != candidates.len() {
        return Err(AppError::InternalMismatch(format!(
            "Mismatch sizes between returned scores ({}), returned items ({}) and candidates ({})",
            scores.len(),
            item_ids.len(),
            candidates.len()
        )));
    }

    let requested: HashSet<&str> = candidates.iter().map(String::as_str).collect();
    let mut returned: HashSet<&str> = HashSet::with_capacity(item_ids.len());
    for id in &item_ids {
        if !requested.contains(id.as_str()) {
            return Err(AppError::InternalMismatch(format!(
                "Scoring service returned an item that was not requested: {}",
                id
            )));
        }
        if !returned.insert(id.as_str()) {
            return Err(AppError::InternalMismatch(format!(
                "Scoring service returned a duplicate item: {}",
                id
            )));
        }
    }

    Ok(item_ids
        .into_iter()
        .zip(scores)
        .map(|(item_id, score)| ScoredItem { item_id, score })
        .collect())
}

/// Stable descending sort; ties keep the order the model server returned.
/// NaN scores sink to the bottom.
fn rank_by_score(mut scored: Vec<ScoredItem>, count: usize) -> Recommendations {
    scored.sort_by(|a, b| descending(a.score, b.score));
    scored.into_iter().take(count).collect()
}

fn descending(a: f64, b: f64) -> Ordering {
    let key = |score: f64| {
        if score.is_nan() {
            f64::NEG_INFINITY
        } else if score == 0.0 {
            // -0.0 and 0.0 tie
            0.0
        } else {
            score
        }
    };
    key(b).total_cmp(&key(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockScoringClient;
    use serde_json::json;

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn reranker_returning(item_ids: &[&str], scores: Vec<f64>) -> Reranker {
        let item_ids = strings(item_ids);
        let mut client = MockScoringClient::new();
        client.expect_score().times(1).returning(move |_| {
            Ok(ScoreResponse {
                item_ids: item_ids.clone(),
                scores: scores.clone(),
                metadata: json!({"model_version": "7"}),
            })
        });
        Reranker::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_sorts_descending_and_truncates() {
        let reranker = reranker_returning(&["a", "b", "c"], vec![0.1, 0.9, 0.5]);

        let outcome = reranker
            .rerank(
                "u1",
                &strings(&["a", "b", "c"]),
                &strings(&["x1"]),
                2,
                &DebugTrace::disabled(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.recommendations.rec_item_ids, vec!["b", "c"]);
        assert_eq!(outcome.recommendations.rec_scores, vec![0.9, 0.5]);
        assert_eq!(outcome.metadata["model_version"], "7");
    }

    #[tokio::test]
    async fn test_short_score_array_is_mismatch() {
        let reranker = reranker_returning(&["a", "b"], vec![0.1, 0.9]);

        let err = reranker
            .rerank(
                "u1",
                &strings(&["a", "b", "c"]),
                &strings(&["x1"]),
                10,
                &DebugTrace::disabled(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InternalMismatch(_)));
    }

    #[tokio::test]
    async fn test_unrequested_item_is_mismatch() {
        let reranker = reranker_returning(&["a", "b", "z"], vec![0.1, 0.2, 0.3]);

        let err = reranker
            .rerank(
                "u1",
                &strings(&["a", "b", "c"]),
                &[],
                10,
                &DebugTrace::disabled(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InternalMismatch(_)));
    }

    #[tokio::test]
    async fn test_duplicate_returned_item_is_mismatch() {
        // Right length, only requested ids, but `c` is never scored.
        let reranker = reranker_returning(&["a", "a", "b"], vec![0.9, 0.8, 0.1]);

        let err = reranker
            .rerank(
                "u1",
                &strings(&["a", "b", "c"]),
                &[],
                10,
                &DebugTrace::disabled(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InternalMismatch(_)));
    }

    #[tokio::test]
    async fn test_mapping_follows_returned_ids() {
        // The service answers in its own order; scores stay with their ids.
        let reranker = reranker_returning(&["c", "a", "b"], vec![0.3, 0.1, 0.2]);

        let outcome = reranker
            .rerank(
                "u1",
                &strings(&["a", "b", "c"]),
                &[],
                3,
                &DebugTrace::disabled(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.recommendations.rec_item_ids, vec!["c", "b", "a"]);
        assert_eq!(outcome.recommendations.rec_scores, vec![0.3, 0.2, 0.1]);
    }

    #[tokio::test]
    async fn test_ties_keep_service_order() {
        let reranker = reranker_returning(&["b", "a", "c"], vec![0.5, 0.5, 0.9]);

        let outcome = reranker
            .rerank(
                "u1",
                &strings(&["a", "b", "c"]),
                &[],
                3,
                &DebugTrace::disabled(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.recommendations.rec_item_ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_candidates_skip_scoring() {
        let mut client = MockScoringClient::new();
        client.expect_score().never();
        let reranker = Reranker::new(Arc::new(client));

        let outcome = reranker
            .rerank("u1", &[], &strings(&["x1"]), 10, &DebugTrace::disabled())
            .await
            .unwrap();

        assert!(outcome.recommendations.is_empty());
        assert_eq!(outcome.metadata, Value::Null);
    }

    #[tokio::test]
    async fn test_request_is_broadcast_per_candidate() {
        let mut client = MockScoringClient::new();
        client
            .expect_score()
            .withf(|req| {
                req.is_aligned()
                    && req.len() == 2
                    && req.user_ids == vec!["u1", "u1"]
                    && req.item_sequences.iter().all(|s| s == &vec!["x1", "x2"])
            })
            .times(1)
            .returning(|req| {
                Ok(ScoreResponse {
                    item_ids: req.item_ids.clone(),
                    scores: vec![1.0, 2.0],
                    metadata: Value::Null,
                })
            });
        let reranker = Reranker::new(Arc::new(client));

        let trace = DebugTrace::enabled();
        let outcome = reranker
            .rerank(
                "u1",
                &strings(&["a", "b"]),
                &strings(&["x1", "x2"]),
                10,
                &trace,
            )
            .await
            .unwrap();

        assert_eq!(outcome.recommendations.rec_item_ids, vec!["b", "a"]);
        let lines = trace.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[COLLECT] Payload prepared"));
        assert!(lines[1].starts_with("[COLLECT] Response from external service"));
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let mut client = MockScoringClient::new();
        client
            .expect_score()
            .returning(|_| Err(AppError::upstream("model-server", Some(500), "boom")));
        let reranker = Reranker::new(Arc::new(client));

        let err = reranker
            .rerank("u1", &strings(&["a"]), &[], 10, &DebugTrace::disabled())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: Some(500), .. }));
    }

    #[test]
    fn test_signed_zeros_tie() {
        assert_eq!(descending(-0.0, 0.0), Ordering::Equal);

        let scored = vec![
            ScoredItem {
                item_id: "neg".into(),
                score: -0.0,
            },
            ScoredItem {
                item_id: "pos".into(),
                score: 0.0,
            },
        ];
        let ranked = rank_by_score(scored, 2);
        assert_eq!(ranked.rec_item_ids, vec!["neg", "pos"]);
    }

    #[test]
    fn test_nan_scores_sink() {
        let scored = vec![
            ScoredItem {
                item_id: "nan".into(),
                score: f64::NAN,
            },
            ScoredItem {
                item_id: "low".into(),
                score: -1.0,
            },
        ];
        let ranked = rank_by_score(scored, 2);
        assert_eq!(ranked.rec_item_ids, vec!["low", "nan"]);
    }
}
