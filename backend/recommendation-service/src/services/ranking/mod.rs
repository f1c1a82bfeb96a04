/// Ranking Module
///
/// Reranks aggregated candidates with the external sequence rating model.
///
/// # Workflow
/// 1. Broadcast the user id and recent-item sequence once per candidate
/// 2. Score every candidate in one batched call
/// 3. Validate the response shape against the request
/// 4. Stable sort by score, descending, and keep the top `count`
pub mod reranker;

pub use reranker::{RerankOutcome, Reranker};
