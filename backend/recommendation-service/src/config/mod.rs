use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

/// Process-wide configuration. Built once in `main` and handed to every
/// component constructor; nothing else reads the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // HTTP server config
    pub http_host: String,
    pub http_port: u16,

    // Online stores
    pub redis_url: String,
    pub feature_server_url: String,
    pub model_server_url: String,

    // Per-call timeouts (milliseconds)
    pub redis_timeout_ms: u64,
    pub feature_timeout_ms: u64,
    pub scoring_timeout_ms: u64,

    // Precomputed recommendation keys
    pub popular_key: String,
    pub i2i_key_prefix: String,

    // Item sequence feature
    pub item_sequence_feature_view: String,
    pub item_sequence_feature_name: String,
    pub item_sequence_ts_feature_name: String,

    // Request limits
    pub default_count: usize,
    pub default_top_k_retrieval: usize,
    pub max_count: usize,

    // Observability
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 8000)?
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("feature_server_url", "http://localhost:6566")?
            .set_default("model_server_url", "http://localhost:3000")?
            .set_default("redis_timeout_ms", 500)?
            .set_default("feature_timeout_ms", 1000)?
            .set_default("scoring_timeout_ms", 3000)?
            .set_default("popular_key", "output:popular")?
            .set_default("i2i_key_prefix", "output:i2i:")?
            .set_default("item_sequence_feature_view", "user_rating_stats")?
            .set_default("item_sequence_feature_name", "user_rating_list_10_recent_asin")?
            .set_default(
                "item_sequence_ts_feature_name",
                "user_rating_list_10_recent_asin_timestamp",
            )?
            .set_default("default_count", 10)?
            .set_default("default_top_k_retrieval", 100)?
            .set_default("max_count", 1000)?
            .set_default("log_format", "text")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.redis_url.is_empty() {
            return Err(anyhow!("Redis URL is required"));
        }

        if self.feature_server_url.is_empty() {
            return Err(anyhow!("Feature server URL is required"));
        }

        if self.model_server_url.is_empty() {
            return Err(anyhow!("Model server URL is required"));
        }

        if self.redis_timeout_ms == 0 || self.feature_timeout_ms == 0 || self.scoring_timeout_ms == 0
        {
            return Err(anyhow!("Upstream timeouts must be greater than 0"));
        }

        if self.popular_key.is_empty() || self.i2i_key_prefix.is_empty() {
            return Err(anyhow!("Recommendation keys must not be empty"));
        }

        if self.max_count == 0 {
            return Err(anyhow!("Max count must be greater than 0"));
        }

        if self.default_count == 0 || self.default_count > self.max_count {
            return Err(anyhow!("Default count must be between 1 and max_count"));
        }

        if self.default_top_k_retrieval == 0 || self.default_top_k_retrieval > self.max_count {
            return Err(anyhow!(
                "Default top_k_retrieval must be between 1 and max_count"
            ));
        }

        Ok(())
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    pub fn feature_timeout(&self) -> Duration {
        Duration::from_millis(self.feature_timeout_ms)
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_millis(self.scoring_timeout_ms)
    }

    pub fn limits(&self) -> RequestLimits {
        RequestLimits {
            default_count: self.default_count,
            default_top_k_retrieval: self.default_top_k_retrieval,
            max_count: self.max_count,
        }
    }
}

/// Defaults and upper bound for the `count` / `top_k_retrieval` query params.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub default_count: usize,
    pub default_top_k_retrieval: usize,
    pub max_count: usize,
}

impl RequestLimits {
    pub fn count(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_count)
            .clamp(1, self.max_count)
    }

    pub fn top_k_retrieval(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k_retrieval)
            .clamp(1, self.max_count)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        http_host: "0.0.0.0".to_string(),
        http_port: 8000,
        redis_url: "redis://localhost:6379".to_string(),
        feature_server_url: "http://localhost:6566".to_string(),
        model_server_url: "http://localhost:3000".to_string(),
        redis_timeout_ms: 500,
        feature_timeout_ms: 1000,
        scoring_timeout_ms: 3000,
        popular_key: "output:popular".to_string(),
        i2i_key_prefix: "output:i2i:".to_string(),
        item_sequence_feature_view: "user_rating_stats".to_string(),
        item_sequence_feature_name: "user_rating_list_10_recent_asin".to_string(),
        item_sequence_ts_feature_name: "user_rating_list_10_recent_asin_timestamp".to_string(),
        default_count: 10,
        default_top_k_retrieval: 100,
        max_count: 1000,
        log_format: "text".to_string(),
    }
}
