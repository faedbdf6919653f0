//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{AniListAdapter, DbAdapter, MangaDexAdapter, RateLimitedGateway},
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use mangashelf_core::{
    aggregation::AggregationService, cache::TtlCache, ports::ContentSource,
    rate_limit::TokenBucket, resolver::MappingCache,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Upstream Adapters ---
    let mangadex_gateway = Arc::new(RateLimitedGateway::new(
        "MangaDex",
        &config.mangadex_api_url,
        TokenBucket::per_second(config.mangadex_rate_per_second),
        TtlCache::with_ttl(config.content_cache_ttl),
        config.upstream_timeout,
    )?);
    let anilist_gateway = Arc::new(RateLimitedGateway::new(
        "AniList",
        &config.anilist_api_url,
        TokenBucket::per_minute(config.anilist_rate_per_minute),
        TtlCache::with_ttl(config.metadata_cache_ttl),
        config.upstream_timeout,
    )?);

    let catalog: Arc<dyn ContentSource> = Arc::new(MangaDexAdapter::new(
        mangadex_gateway,
        &config.mangadex_cover_url,
    ));
    let metadata = Arc::new(AniListAdapter::new(anilist_gateway));
    let mappings = Arc::new(MappingCache::new(None, config.mapping_cache_capacity));
    let aggregator = Arc::new(AggregationService::new(catalog.clone(), metadata, mappings));
    info!(
        mangadex = %config.mangadex_api_url,
        anilist = %config.anilist_api_url,
        "upstream adapters ready"
    );

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        users: db_adapter,
        catalog,
        aggregator,
    });

    // --- 5. Create the Web Router ---
    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {e}", config.cors_origin))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
