//! crates/mangashelf_core/src/domain.rs
//!
//! Defines the core data structures shared by the aggregation layer, the
//! reading-progress tracker, and the account store. Records from the two
//! upstream sources are re-derived on every fetch and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Primary Source (catalog / reading)
//=========================================================================================

/// Publication status as reported by the primary source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Ongoing,
    Completed,
    Other,
}

impl PublicationStatus {
    pub fn from_upstream(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "ongoing" => Self::Ongoing,
            "completed" => Self::Completed,
            _ => Self::Other,
        }
    }
}

/// A catalog entry from the primary source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub genres: Vec<String>,
    pub status: PublicationStatus,
    pub author: String,
    /// Already resolved to a fetchable URL by the adapter.
    pub cover_image_ref: Option<String>,
    pub year: Option<i32>,
}

/// One chapter from a manga feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRecord {
    pub id: String,
    pub chapter: Option<String>,
    pub volume: Option<String>,
    pub title: Option<String>,
    pub translated_language: String,
    pub pages: u32,
    pub published_at: Option<String>,
}

/// Image delivery information for a single chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPages {
    pub base_url: String,
    pub hash: String,
    pub page_filenames: Vec<String>,
}

impl ChapterPages {
    /// Full-quality image URLs in reading order.
    pub fn page_urls(&self) -> Vec<String> {
        self.page_filenames
            .iter()
            .map(|file| format!("{}/data/{}/{}", self.base_url, self.hash, file))
            .collect()
    }
}

/// Community statistics kept by the primary source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MangaStatistics {
    /// Bayesian rating on a 0-10 scale.
    pub rating: Option<f64>,
    pub follows: Option<u64>,
}

//=========================================================================================
// Secondary Source (metadata / social)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub secondary_id: i64,
    pub cover_image: Option<String>,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub author: String,
    pub score: Option<u32>,
    pub body: String,
}

/// A metadata entry from the secondary source. Search and ranking results
/// leave `recommendations` and `reviews` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub id: i64,
    pub title: String,
    pub alt_titles: Vec<String>,
    pub cover_image: Option<String>,
    /// 0-100.
    pub average_score: Option<u32>,
    pub popularity: Option<u64>,
    pub trending_score: Option<i64>,
    pub genres: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub reviews: Vec<Review>,
}

impl MetadataRecord {
    /// Every title this record is known by, display title first.
    pub fn all_titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.alt_titles.iter().map(String::as_str))
    }
}

//=========================================================================================
// Merged Output
//=========================================================================================

/// A resolved primary -> secondary correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleMatch {
    pub secondary_id: i64,
    /// Title similarity in `[0, 1]`. Informational only.
    pub confidence: f64,
}

/// One primary record merged with optional secondary enrichment.
///
/// `enhanced_rating` and `enhanced_popularity` are always populated; see
/// `aggregation::enhanced_rating` for the fallback order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedRecord {
    #[serde(flatten)]
    pub content: ContentRecord,
    #[serde(rename = "anilist")]
    pub metadata: Option<MetadataRecord>,
    pub enhanced_rating: f64,
    pub enhanced_popularity: u64,
    pub match_confidence: Option<f64>,
}

/// A secondary-source recommendation that has a readable primary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedRecommendation {
    #[serde(flatten)]
    pub content: ContentRecord,
    pub recommendation: Recommendation,
}

//=========================================================================================
// Reading Progress
//=========================================================================================

/// Last read position for one manga on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgressEntry {
    pub manga_id: String,
    /// Snapshot at save time; may go stale.
    pub manga_title: String,
    pub chapter_id: String,
    pub chapter_number: Option<String>,
    pub page: u32,
    pub total_pages: u32,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

//=========================================================================================
// Accounts
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}
