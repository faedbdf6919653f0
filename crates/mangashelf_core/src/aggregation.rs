//! crates/mangashelf_core/src/aggregation.rs
//!
//! Produces UI-ready records by merging the primary catalog with secondary
//! metadata. Primary-source failures propagate to the caller. Secondary-source
//! failures never do: every secondary call goes through [`degrade`], which logs
//! and turns the error into "no enrichment".

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{
    ChapterRecord, ContentRecord, EnhancedRecommendation, EnhancedRecord, MangaStatistics,
    MetadataRecord, Review, TitleMatch,
};
use crate::ports::{ContentSource, MetadataSource, PortResult};
use crate::resolver::{match_confidence, MappingCache, TitleResolver};

/// Page size for chapter feeds; also the upstream's hard cap.
pub const FEED_PAGE_SIZE: u32 = 500;
/// The primary source rejects `offset + limit` beyond this.
const FEED_OFFSET_CEILING: u32 = 10_000;

//=========================================================================================
// Degradation and Fallback Rules
//=========================================================================================

/// Turns a failed optional lookup into `None`, logging the cause.
pub fn degrade<T>(context: &str, result: PortResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "{context} failed; continuing without it");
            None
        }
    }
}

/// Secondary score (0-100, rescaled to 0-10) first, then the primary
/// source's own rating, then zero.
pub fn enhanced_rating(
    metadata: Option<&MetadataRecord>,
    statistics: Option<&MangaStatistics>,
) -> f64 {
    metadata
        .and_then(|m| m.average_score)
        .map(|score| f64::from(score) / 10.0)
        .or_else(|| statistics.and_then(|s| s.rating))
        .unwrap_or(0.0)
}

/// Secondary popularity first, then the primary follow count, then zero.
pub fn enhanced_popularity(
    metadata: Option<&MetadataRecord>,
    statistics: Option<&MangaStatistics>,
) -> u64 {
    metadata
        .and_then(|m| m.popularity)
        .or_else(|| statistics.and_then(|s| s.follows))
        .unwrap_or(0)
}

fn merge(
    content: ContentRecord,
    metadata: Option<MetadataRecord>,
    statistics: Option<&MangaStatistics>,
    confidence: Option<f64>,
) -> EnhancedRecord {
    EnhancedRecord {
        enhanced_rating: enhanced_rating(metadata.as_ref(), statistics),
        enhanced_popularity: enhanced_popularity(metadata.as_ref(), statistics),
        match_confidence: metadata.as_ref().and(confidence),
        content,
        metadata,
    }
}

fn needs_primary_statistics(metadata: &MetadataRecord) -> bool {
    metadata.average_score.is_none() || metadata.popularity.is_none()
}

/// Shortest secondary title allowed to match by appearing inside a longer
/// primary title. Keeps synonyms like "AoT" from attaching to "Aoto's Journey".
const MIN_EMBEDDED_TITLE_CHARS: usize = 4;

/// Finds the first unused secondary record whose title contains, or is
/// contained in, `title` (case-insensitive) and takes it out of the pool.
fn take_local_match(
    title: &str,
    pool: &mut [Option<MetadataRecord>],
) -> Option<MetadataRecord> {
    let wanted = title.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    let index = pool.iter().position(|slot| {
        slot.as_ref().is_some_and(|record| {
            record.all_titles().any(|candidate| {
                let candidate = candidate.trim().to_lowercase();
                !candidate.is_empty()
                    && (candidate.contains(&wanted)
                        || (candidate.chars().count() >= MIN_EMBEDDED_TITLE_CHARS
                            && wanted.contains(&candidate)))
            })
        })
    })?;
    pool[index].take()
}

//=========================================================================================
// The Service
//=========================================================================================

pub struct AggregationService {
    catalog: Arc<dyn ContentSource>,
    metadata: Arc<dyn MetadataSource>,
    resolver: TitleResolver,
}

impl AggregationService {
    pub fn new(
        catalog: Arc<dyn ContentSource>,
        metadata: Arc<dyn MetadataSource>,
        mappings: Arc<MappingCache>,
    ) -> Self {
        let resolver = TitleResolver::new(metadata.clone(), mappings);
        Self {
            catalog,
            metadata,
            resolver,
        }
    }

    pub fn resolver(&self) -> &TitleResolver {
        &self.resolver
    }

    /// Primary record plus, when a mapping exists, its secondary metadata.
    pub async fn get_enhanced_details(&self, primary_id: &str) -> PortResult<EnhancedRecord> {
        let (content, statistics) = futures::join!(
            self.catalog.get_details(primary_id),
            self.catalog.get_statistics(primary_id)
        );
        let content = content?;
        let statistics = degrade("primary statistics", statistics);

        let mapping = degrade(
            "title mapping",
            self.resolver.resolve(&content.id, &content.title).await,
        )
        .flatten();

        let metadata = match mapping {
            Some(found) => degrade(
                "secondary metadata",
                self.metadata.get_by_id(found.secondary_id).await,
            ),
            None => None,
        };

        Ok(merge(
            content,
            metadata,
            statistics.as_ref(),
            mapping.map(|m| m.confidence),
        ))
    }

    /// Secondary trending list, restricted to titles readable on the primary source.
    pub async fn get_enhanced_trending(&self, limit: u32) -> PortResult<Vec<EnhancedRecord>> {
        let trending = degrade("secondary trending", self.metadata.trending(limit).await)
            .unwrap_or_default();
        Ok(self.link_ranking(trending).await)
    }

    /// Secondary popularity ranking, restricted to titles readable on the primary source.
    pub async fn get_enhanced_popular(&self, limit: u32) -> PortResult<Vec<EnhancedRecord>> {
        let popular = degrade("secondary popular", self.metadata.popular(limit).await)
            .unwrap_or_default();
        Ok(self.link_ranking(popular).await)
    }

    /// Secondary recommendations for a primary title, each linked to a
    /// readable primary entry. Empty when no mapping exists.
    pub async fn get_enhanced_recommendations(
        &self,
        primary_id: &str,
    ) -> PortResult<Vec<EnhancedRecommendation>> {
        let Some(found) = self.mapping_for(primary_id).await? else {
            return Ok(vec![]);
        };

        let recommendations = degrade(
            "secondary recommendations",
            self.metadata.recommendations(found.secondary_id).await,
        )
        .unwrap_or_default();

        let lookups = recommendations
            .iter()
            .map(|rec| self.find_readable(&rec.title));
        let linked = join_all(lookups).await;

        Ok(recommendations
            .into_iter()
            .zip(linked)
            .filter_map(|(recommendation, content)| {
                content.map(|content| EnhancedRecommendation {
                    content,
                    recommendation,
                })
            })
            .collect())
    }

    /// Secondary reviews for a primary title. Empty when no mapping exists.
    pub async fn get_reviews(&self, primary_id: &str) -> PortResult<Vec<Review>> {
        let Some(found) = self.mapping_for(primary_id).await? else {
            return Ok(vec![]);
        };
        Ok(
            degrade("secondary reviews", self.metadata.reviews(found.secondary_id).await)
                .unwrap_or_default(),
        )
    }

    /// Searches both sources at once and attaches secondary records to
    /// primary results by local title matching only. Each secondary record
    /// is attached at most once.
    pub async fn hybrid_search(&self, query: &str, limit: u32) -> PortResult<Vec<EnhancedRecord>> {
        let (primary, secondary) = futures::join!(
            self.catalog.search(query, limit, 0),
            self.metadata.search_by_title(query, limit)
        );
        let primary = primary?;
        let mut pool: Vec<Option<MetadataRecord>> = degrade("secondary search", secondary)
            .unwrap_or_default()
            .into_iter()
            .map(Some)
            .collect();

        let ids: Vec<String> = primary.iter().map(|c| c.id.clone()).collect();
        let statistics = self.statistics_for(&ids).await;

        let merged: Vec<EnhancedRecord> = primary
            .into_iter()
            .map(|content| {
                let metadata = take_local_match(&content.title, &mut pool);
                let confidence = metadata
                    .as_ref()
                    .map(|record| match_confidence(&content.title, record));
                let stats = statistics.get(&content.id);
                merge(content, metadata, stats, confidence)
            })
            .collect();

        info!(
            query,
            results = merged.len(),
            enriched = merged.iter().filter(|r| r.metadata.is_some()).count(),
            "hybrid search complete"
        );
        Ok(merged)
    }

    /// Every chapter of a manga, fetched page by page.
    pub async fn get_full_feed(
        &self,
        primary_id: &str,
        langs: &[String],
    ) -> PortResult<Vec<ChapterRecord>> {
        let mut chapters = Vec::new();
        let mut offset = 0;
        while offset + FEED_PAGE_SIZE <= FEED_OFFSET_CEILING {
            let page = self
                .catalog
                .get_feed(primary_id, langs, FEED_PAGE_SIZE, offset)
                .await?;
            let fetched = page.len() as u32;
            chapters.extend(page);
            if fetched < FEED_PAGE_SIZE {
                break;
            }
            offset += FEED_PAGE_SIZE;
        }
        Ok(chapters)
    }

    //-------------------------------------------------------------------------------------
    // Helpers
    //-------------------------------------------------------------------------------------

    /// Resolves the mapping for a primary id, fetching the primary record
    /// for its title only on a cache miss.
    async fn mapping_for(&self, primary_id: &str) -> PortResult<Option<TitleMatch>> {
        if let Some(known) = self.resolver.cached(primary_id) {
            return Ok(known);
        }
        let content = self.catalog.get_details(primary_id).await?;
        Ok(degrade(
            "title mapping",
            self.resolver.resolve(&content.id, &content.title).await,
        )
        .flatten())
    }

    /// First primary search hit for `title`, or `None` on no hit or failure.
    async fn find_readable(&self, title: &str) -> Option<ContentRecord> {
        degrade("primary title lookup", self.catalog.search(title, 1, 0).await)?
            .into_iter()
            .next()
    }

    async fn statistics_for(&self, ids: &[String]) -> HashMap<String, MangaStatistics> {
        if ids.is_empty() {
            return HashMap::new();
        }
        degrade(
            "primary statistics",
            self.catalog.get_statistics_batch(ids).await,
        )
        .unwrap_or_default()
    }

    /// Links each ranked secondary record to a primary entry, dropping the
    /// unreadable ones and keeping the ranking order.
    async fn link_ranking(&self, ranking: Vec<MetadataRecord>) -> Vec<EnhancedRecord> {
        let lookups = ranking.iter().map(|record| self.find_readable(&record.title));
        let linked: Vec<(MetadataRecord, ContentRecord)> = ranking
            .iter()
            .cloned()
            .zip(join_all(lookups).await)
            .filter_map(|(record, content)| content.map(|content| (record, content)))
            .collect();

        let fallback_ids: Vec<String> = linked
            .iter()
            .filter(|(record, _)| needs_primary_statistics(record))
            .map(|(_, content)| content.id.clone())
            .collect();
        let statistics = self.statistics_for(&fallback_ids).await;

        linked
            .into_iter()
            .map(|(record, content)| {
                let confidence = match_confidence(&content.title, &record);
                self.resolver.remember(
                    &content.id,
                    TitleMatch {
                        secondary_id: record.id,
                        confidence,
                    },
                );
                let stats = statistics.get(&content.id);
                merge(content, Some(record), stats, Some(confidence))
            })
            .collect()
    }
}
