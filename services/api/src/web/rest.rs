//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the catalog endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::auth::{self, AuthResponse, LoginRequest, MeResponse, SignupRequest};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use mangashelf_core::domain::{ChapterRecord, EnhancedRecommendation, EnhancedRecord, Review};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 50;
const DEFAULT_LANGUAGE: &str = "en";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        enhanced_details_handler,
        enhanced_trending_handler,
        enhanced_popular_handler,
        enhanced_recommendations_handler,
        reviews_handler,
        search_handler,
        chapters_handler,
        chapter_pages_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
    ),
    components(
        schemas(HealthResponse, PagesResponse, SignupRequest, LoginRequest, AuthResponse, MeResponse)
    ),
    tags(
        (name = "Mangashelf API", description = "Manga discovery backed by MangaDex content and AniList metadata.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Parameters and Response Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct LimitParams {
    /// Number of results, 1 to 50. Defaults to 20.
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct SearchParams {
    /// Free-text title query. Required.
    pub q: Option<String>,
    /// Number of results, 1 to 50. Defaults to 20.
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct FeedParams {
    /// Comma-separated translation languages. Defaults to `en`.
    pub lang: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Everything a reader needs to render one chapter.
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PagesResponse {
    pub chapter_id: String,
    pub base_url: String,
    pub hash: String,
    pub page_filenames: Vec<String>,
    pub page_urls: Vec<String>,
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn parse_languages(raw: Option<&str>) -> Vec<String> {
    let languages: Vec<String> = raw
        .unwrap_or(DEFAULT_LANGUAGE)
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if languages.is_empty() {
        vec![DEFAULT_LANGUAGE.to_string()]
    } else {
        languages
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// A MangaDex title merged with its AniList metadata, when a match exists.
#[utoipa::path(
    get,
    path = "/api/enhanced/details/{id}",
    params(("id" = String, Path, description = "MangaDex manga id")),
    responses(
        (status = 200, description = "Enhanced record"),
        (status = 404, description = "Unknown manga id"),
        (status = 502, description = "MangaDex failed")
    )
)]
pub async fn enhanced_details_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EnhancedRecord>, ApiError> {
    Ok(Json(state.aggregator.get_enhanced_details(&id).await?))
}

/// AniList trending titles that are readable on MangaDex.
#[utoipa::path(
    get,
    path = "/api/enhanced/trending",
    params(LimitParams),
    responses((status = 200, description = "Enhanced trending list, possibly shorter than `limit`"))
)]
pub async fn enhanced_trending_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<EnhancedRecord>>, ApiError> {
    let limit = clamp_limit(params.limit);
    Ok(Json(state.aggregator.get_enhanced_trending(limit).await?))
}

/// AniList all-time popular titles that are readable on MangaDex.
#[utoipa::path(
    get,
    path = "/api/enhanced/popular",
    params(LimitParams),
    responses((status = 200, description = "Enhanced popular list, possibly shorter than `limit`"))
)]
pub async fn enhanced_popular_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<EnhancedRecord>>, ApiError> {
    let limit = clamp_limit(params.limit);
    Ok(Json(state.aggregator.get_enhanced_popular(limit).await?))
}

/// AniList recommendations for a title, linked back to MangaDex.
#[utoipa::path(
    get,
    path = "/api/enhanced/recommendations/{id}",
    params(("id" = String, Path, description = "MangaDex manga id")),
    responses((status = 200, description = "Readable recommendations; empty when the title has no AniList match"))
)]
pub async fn enhanced_recommendations_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EnhancedRecommendation>>, ApiError> {
    Ok(Json(state.aggregator.get_enhanced_recommendations(&id).await?))
}

/// AniList reviews for a title.
#[utoipa::path(
    get,
    path = "/api/enhanced/reviews/{id}",
    params(("id" = String, Path, description = "MangaDex manga id")),
    responses((status = 200, description = "Reviews; empty when the title has no AniList match"))
)]
pub async fn reviews_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    Ok(Json(state.aggregator.get_reviews(&id).await?))
}

/// Title search against MangaDex, enriched from the same AniList search.
#[utoipa::path(
    get,
    path = "/api/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Search results"),
        (status = 400, description = "Missing or blank `q`")
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<EnhancedRecord>>, ApiError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Query parameter `q` is required".to_string()))?;
    let limit = clamp_limit(params.limit);
    Ok(Json(state.aggregator.hybrid_search(query, limit).await?))
}

/// Every chapter of a manga in the requested languages.
#[utoipa::path(
    get,
    path = "/api/manga/{id}/chapters",
    params(("id" = String, Path, description = "MangaDex manga id"), FeedParams),
    responses((status = 200, description = "Full chapter list"))
)]
pub async fn chapters_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<ChapterRecord>>, ApiError> {
    let languages = parse_languages(params.lang.as_deref());
    let chapters = state.aggregator.get_full_feed(&id, &languages).await?;
    info!(manga_id = %id, chapters = chapters.len(), "served chapter feed");
    Ok(Json(chapters))
}

/// Page image locations for one chapter.
#[utoipa::path(
    get,
    path = "/api/chapter/{id}/pages",
    params(("id" = String, Path, description = "MangaDex chapter id")),
    responses(
        (status = 200, description = "Page images", body = PagesResponse),
        (status = 404, description = "Unknown chapter id")
    )
)]
pub async fn chapter_pages_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PagesResponse>, ApiError> {
    let pages = state.catalog.get_chapter_pages(&id).await?;
    let page_urls = pages.page_urls();
    Ok(Json(PagesResponse {
        chapter_id: id,
        base_url: pages.base_url,
        hash: pages.hash,
        page_filenames: pages.page_filenames,
        page_urls,
    }))
}
