mod item_to_item_recall;
mod popular_recall;

pub use item_to_item_recall::ItemToItemRecall;
pub use popular_recall::PopularRecall;

use tracing::error;

use crate::error::{AppError, Result};
use crate::models::Recommendations;
use crate::store::KeyValueStore;

/// 讀取批次管線預先計算好的推薦結果
///
/// A missing (or empty) key is NotFound rather than an empty list: the
/// batch pipeline always writes these keys, so absence is a data defect.
async fn load_recommendations(
    store: &dyn KeyValueStore,
    key: &str,
    count: Option<usize>,
) -> Result<Recommendations> {
    let raw = match store.get(key).await? {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            error!(key, "No recommendations found");
            return Err(AppError::NotFound(format!(
                "No recommendations found for key: {}",
                key
            )));
        }
    };

    let mut recommendations: Recommendations = serde_json::from_str(&raw)?;
    if let Some(count) = count {
        recommendations.truncate(count);
    }

    Ok(recommendations)
}
