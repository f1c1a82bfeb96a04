//! Recommendation services
//!
//! Recall (popular + i2i) → aggregation → rerank, with the online feature
//! reader supplying the user's recent-item sequence.

pub mod aggregation;
pub mod features;
pub mod orchestrator;
pub mod ranking;
pub mod recall;

pub use aggregation::{AggregatedCandidates, CandidateAggregator};
pub use features::{FeatureRef, ItemSequenceReader};
pub use orchestrator::RecommendationOrchestrator;
pub use ranking::{RerankOutcome, Reranker};
pub use recall::{ItemToItemRecall, PopularRecall};
