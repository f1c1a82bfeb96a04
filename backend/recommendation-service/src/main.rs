use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recommendation_service::clients::{HttpFeatureClient, HttpScoringClient};
use recommendation_service::config::Config;
use recommendation_service::handlers::{self, RecommendationState};
use recommendation_service::middleware::{AccessLog, MiddlewareStack, RequestIdMiddleware};
use recommendation_service::store::RedisStore;
use recommendation_service::RecommendationOrchestrator;

fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,recommendation_service=debug".into());

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_format);
    config.validate()?;

    tracing::info!(
        "Starting recommendation-service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let store = RedisStore::connect(&config.redis_url, config.redis_timeout())
        .await
        .context("Failed to connect to Redis")?;
    tracing::info!("Connected to Redis at {}", config.redis_url);

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let features = HttpFeatureClient::new(
        http.clone(),
        &config.feature_server_url,
        config.feature_timeout(),
    );
    let scoring = HttpScoringClient::new(http, &config.model_server_url, config.scoring_timeout());

    let orchestrator = Arc::new(RecommendationOrchestrator::new(
        &config,
        Arc::new(store),
        Arc::new(features),
        Arc::new(scoring),
    ));

    let state = web::Data::new(RecommendationState {
        orchestrator,
        pipeline: MiddlewareStack::standard(),
        limits: config.limits(),
    });

    let bind_addr = format!("{}:{}", config.http_host, config.http_port);
    tracing::info!("Starting HTTP server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(AccessLog)
            .wrap(RequestIdMiddleware)
            .configure(handlers::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
