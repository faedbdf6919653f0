//! crates/mangashelf_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete upstream APIs, the account database, and
//! the device storage used for reading progress.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    ChapterPages, ChapterRecord, ContentRecord, MangaStatistics, MetadataRecord, Recommendation,
    Review, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The upstream answered with a non-2xx status, timed out, or could not be reached.
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("Timed out waiting for a rate-limit token")]
    RateLimitTimeout,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// A uniqueness constraint was violated (e.g. an email already registered).
    #[error("{0}")]
    Conflict(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Upstream Ports (Traits)
//=========================================================================================

/// The primary source: authoritative for catalog identity and chapter delivery.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn search(&self, title: &str, limit: u32, offset: u32) -> PortResult<Vec<ContentRecord>>;

    async fn get_details(&self, id: &str) -> PortResult<ContentRecord>;

    /// One page of a manga's chapter feed. `limit` is capped upstream at 500.
    async fn get_feed(
        &self,
        id: &str,
        langs: &[String],
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<ChapterRecord>>;

    async fn get_chapter_pages(&self, chapter_id: &str) -> PortResult<ChapterPages>;

    async fn get_statistics(&self, id: &str) -> PortResult<MangaStatistics>;

    async fn get_statistics_batch(
        &self,
        ids: &[String],
    ) -> PortResult<HashMap<String, MangaStatistics>>;
}

/// The secondary source: scores, popularity, recommendations, reviews.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Results are ordered by upstream relevance.
    async fn search_by_title(&self, title: &str, limit: u32) -> PortResult<Vec<MetadataRecord>>;

    async fn get_by_id(&self, id: i64) -> PortResult<MetadataRecord>;

    async fn trending(&self, limit: u32) -> PortResult<Vec<MetadataRecord>>;

    async fn popular(&self, limit: u32) -> PortResult<Vec<MetadataRecord>>;

    async fn recommendations(&self, id: i64) -> PortResult<Vec<Recommendation>>;

    async fn reviews(&self, id: i64) -> PortResult<Vec<Review>>;
}

//=========================================================================================
// Account Port
//=========================================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owning user for a live, unexpired session.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

//=========================================================================================
// Device Storage Port
//=========================================================================================

#[derive(Debug, thiserror::Error)]
#[error("storage unavailable: {0}")]
pub struct StorageError(pub String);

/// A string key/value slot store, modelled on browser local storage.
pub trait ProgressStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}
