use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============================================
// Candidates & recommendations
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecallSource {
    Popular,    // 熱門召回
    ItemToItem, // 基於最近互動物品的相似召回
}

impl RecallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallSource::Popular => "popular",
            RecallSource::ItemToItem => "i2i",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item_id: String,
    pub score: f64,
}

/// Parallel id/score arrays, the shape stored by the batch pipelines and
/// returned to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    #[serde(default)]
    pub rec_item_ids: Vec<String>,
    #[serde(default)]
    pub rec_scores: Vec<f64>,
}

impl Recommendations {
    pub fn truncate(&mut self, count: usize) {
        self.rec_item_ids.truncate(count);
        self.rec_scores.truncate(count);
    }

    pub fn len(&self) -> usize {
        self.rec_item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rec_item_ids.is_empty()
    }
}

impl FromIterator<ScoredItem> for Recommendations {
    fn from_iter<I: IntoIterator<Item = ScoredItem>>(iter: I) -> Self {
        let (rec_item_ids, rec_scores) = iter
            .into_iter()
            .map(|item| (item.item_id, item.score))
            .unzip();
        Self {
            rec_item_ids,
            rec_scores,
        }
    }
}

/// Output of one retrieval source. Scores are only comparable within the set.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub source: RecallSource,
    pub recommendations: Recommendations,
}

impl CandidateSet {
    pub fn new(source: RecallSource, recommendations: Recommendations) -> Self {
        Self {
            source,
            recommendations,
        }
    }

    pub fn item_ids(&self) -> &[String] {
        &self.recommendations.rec_item_ids
    }
}

// ============================================
// Online feature server
// ============================================

/// Raw request accepted by the online feature server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRequest {
    pub entities: BTreeMap<String, Vec<String>>,
    pub features: Vec<String>,
}

impl FeatureRequest {
    pub fn for_entity(
        entity_key: impl Into<String>,
        entity_id: impl Into<String>,
        features: Vec<String>,
    ) -> Self {
        let mut entities = BTreeMap::new();
        entities.insert(entity_key.into(), vec![entity_id.into()]);
        Self { entities, features }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureMetadata {
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureResult {
    pub values: Vec<Value>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub event_timestamps: Vec<String>,
}

/// Response of `get-online-features`: `results[i]` holds the values of the
/// column named `metadata.feature_names[i]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureResponse {
    pub metadata: FeatureMetadata,
    pub results: Vec<FeatureResult>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemSequence {
    pub user_id: String,
    pub item_sequence: Vec<String>,
    pub item_sequence_ts: Vec<String>,
}

impl ItemSequence {
    /// Most recent interaction; sequences are stored oldest first.
    pub fn last_item(&self) -> Option<&str> {
        self.item_sequence.last().map(String::as_str)
    }
}

// ============================================
// Scoring service
// ============================================

/// Batched scoring request. The three arrays are positionally aligned, one
/// entry per candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRequest {
    pub user_ids: Vec<String>,
    pub item_sequences: Vec<Vec<String>>,
    pub item_ids: Vec<String>,
}

impl ScoreRequest {
    /// Repeats the user id and the whole sequence once per candidate.
    pub fn broadcast(user_id: &str, item_sequence: &[String], candidates: &[String]) -> Self {
        Self {
            user_ids: vec![user_id.to_string(); candidates.len()],
            item_sequences: vec![item_sequence.to_vec(); candidates.len()],
            item_ids: candidates.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn is_aligned(&self) -> bool {
        self.user_ids.len() == self.item_ids.len()
            && self.item_sequences.len() == self.item_ids.len()
    }
}

/// Wire envelope expected by the model server's `/predict`.
#[derive(Debug, Serialize)]
pub struct ScorePayload<'a> {
    pub input_data: &'a ScoreRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreResponse {
    #[serde(default)]
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub scores: Vec<f64>,
    #[serde(default)]
    pub metadata: Value,
}

// ============================================
// API responses
// ============================================

#[derive(Debug, Clone, Serialize)]
pub struct PopularResponse {
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarItemsResponse {
    pub item_id: String,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastItemResponse {
    pub user_id: String,
    pub last_item_id: String,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserFeatures {
    pub item_sequence: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankedResponse {
    pub user_id: String,
    pub features: UserFeatures,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredItemsResponse {
    pub item_ids: Vec<String>,
    pub scores: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rec_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<Value>,
    /// Opaque metadata forwarded from an upstream response.
    #[serde(flatten)]
    pub upstream: Map<String, Value>,
}

/// Parts of a response owned by the request middleware chain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Envelope {
    pub metadata: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    #[serde(flatten)]
    pub data: T,
    #[serde(flatten)]
    pub envelope: Envelope,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            envelope: Envelope::default(),
        }
    }

    pub fn with_rerank_metadata(mut self, metadata: Value) -> Self {
        self.envelope.metadata.rerank = Some(metadata);
        self
    }

    /// Object metadata is merged key by key; anything else is kept under
    /// `upstream`.
    pub fn with_upstream_metadata(mut self, metadata: Value) -> Self {
        match metadata {
            Value::Object(map) => self.envelope.metadata.upstream.extend(map),
            Value::Null => {}
            other => {
                self.envelope
                    .metadata
                    .upstream
                    .insert("upstream".to_string(), other);
            }
        }
        self
    }
}
