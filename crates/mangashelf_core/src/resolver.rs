//! crates/mangashelf_core/src/resolver.rs
//!
//! Maps primary-source ids onto secondary-source ids by title. The first
//! search result wins; there is no disambiguation, so false positives are
//! possible. Every successful answer, including "no match", is cached for the
//! lifetime of the injected cache.

use std::sync::Arc;
use tracing::debug;

use crate::cache::TtlCache;
use crate::domain::{MetadataRecord, TitleMatch};
use crate::ports::{MetadataSource, PortResult};

pub type MappingCache = TtlCache<String, Option<TitleMatch>>;

pub struct TitleResolver {
    metadata: Arc<dyn MetadataSource>,
    mappings: Arc<MappingCache>,
}

impl TitleResolver {
    pub fn new(metadata: Arc<dyn MetadataSource>, mappings: Arc<MappingCache>) -> Self {
        Self { metadata, mappings }
    }

    /// Returns the cached mapping for `primary_id`, if one has been resolved.
    /// The outer `Option` is "known?", the inner one is "matched?".
    pub fn cached(&self, primary_id: &str) -> Option<Option<TitleMatch>> {
        self.mappings.get(&primary_id.to_string())
    }

    pub async fn resolve(&self, primary_id: &str, title: &str) -> PortResult<Option<TitleMatch>> {
        if let Some(known) = self.cached(primary_id) {
            debug!(primary_id, "title mapping cache hit");
            return Ok(known);
        }

        let resolved = if title.trim().is_empty() {
            None
        } else {
            // Errors propagate uncached so a later call can retry.
            let results = self.metadata.search_by_title(title, 1).await?;
            results.first().map(|record| TitleMatch {
                secondary_id: record.id,
                confidence: match_confidence(title, record),
            })
        };

        debug!(primary_id, title, ?resolved, "resolved title mapping");
        self.mappings.insert(primary_id.to_string(), resolved);
        Ok(resolved)
    }

    /// Records a mapping learned as a side effect of another lookup.
    /// An existing entry is left untouched.
    pub fn remember(&self, primary_id: &str, found: TitleMatch) {
        if self.cached(primary_id).is_none() {
            self.mappings.insert(primary_id.to_string(), Some(found));
        }
    }

    pub fn clear(&self) {
        self.mappings.clear();
    }
}

/// Lowercases and keeps only alphanumerics separated by single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best normalised Levenshtein similarity between `title` and any of the
/// record's titles.
pub fn match_confidence(title: &str, record: &MetadataRecord) -> f64 {
    let wanted = normalize_title(title);
    if wanted.is_empty() {
        return 0.0;
    }
    record
        .all_titles()
        .map(normalize_title)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| strsim::normalized_levenshtein(&wanted, &candidate))
        .fold(0.0, f64::max)
}
