//! In-memory fakes for the upstream ports, shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::{
    ChapterPages, ChapterRecord, ContentRecord, MangaStatistics, MetadataRecord,
    PublicationStatus, Recommendation, Review,
};
use crate::ports::{ContentSource, MetadataSource, PortError, PortResult};

fn unavailable() -> PortError {
    PortError::Upstream {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

pub fn content_record(id: &str, title: &str) -> ContentRecord {
    ContentRecord {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        genres: vec![],
        status: PublicationStatus::Ongoing,
        author: String::new(),
        cover_image_ref: None,
        year: None,
    }
}

pub fn metadata_record(id: i64, title: &str) -> MetadataRecord {
    MetadataRecord {
        id,
        title: title.to_string(),
        alt_titles: vec![],
        cover_image: None,
        average_score: None,
        popularity: None,
        trending_score: None,
        genres: vec![],
        recommendations: vec![],
        reviews: vec![],
    }
}

pub fn chapter(id: &str, number: u32) -> ChapterRecord {
    ChapterRecord {
        id: id.to_string(),
        chapter: Some(number.to_string()),
        volume: None,
        title: None,
        translated_language: "en".to_string(),
        pages: 20,
        published_at: None,
    }
}

//=========================================================================================
// Primary source fake
//=========================================================================================

#[derive(Default)]
pub struct FakeCatalog {
    pub records: Vec<ContentRecord>,
    pub statistics: HashMap<String, MangaStatistics>,
    pub chapters: Vec<ChapterRecord>,
    pub fail: bool,
    pub fail_statistics: bool,
    pub search_calls: AtomicUsize,
    pub feed_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_record(mut self, record: ContentRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn with_statistics(mut self, id: &str, rating: Option<f64>, follows: Option<u64>) -> Self {
        self.statistics
            .insert(id.to_string(), MangaStatistics { rating, follows });
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl ContentSource for FakeCatalog {
    async fn search(&self, title: &str, limit: u32, offset: u32) -> PortResult<Vec<ContentRecord>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable());
        }
        let wanted = title.to_lowercase();
        Ok(self
            .records
            .iter()
            .filter(|r| r.title.to_lowercase().contains(&wanted))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_details(&self, id: &str) -> PortResult<ContentRecord> {
        if self.fail {
            return Err(unavailable());
        }
        self.records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("manga {id}")))
    }

    async fn get_feed(
        &self,
        _id: &str,
        _langs: &[String],
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<ChapterRecord>> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable());
        }
        Ok(self
            .chapters
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_chapter_pages(&self, _chapter_id: &str) -> PortResult<ChapterPages> {
        if self.fail {
            return Err(unavailable());
        }
        Ok(ChapterPages {
            base_url: "https://uploads.example".to_string(),
            hash: "abc".to_string(),
            page_filenames: vec!["1.png".to_string()],
        })
    }

    async fn get_statistics(&self, id: &str) -> PortResult<MangaStatistics> {
        if self.fail || self.fail_statistics {
            return Err(unavailable());
        }
        Ok(self.statistics.get(id).copied().unwrap_or_default())
    }

    async fn get_statistics_batch(
        &self,
        ids: &[String],
    ) -> PortResult<HashMap<String, MangaStatistics>> {
        if self.fail || self.fail_statistics {
            return Err(unavailable());
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.statistics.get(id).map(|s| (id.clone(), *s)))
            .collect())
    }
}

//=========================================================================================
// Secondary source fake
//=========================================================================================

#[derive(Default)]
pub struct FakeMetadata {
    pub searches: HashMap<String, Vec<MetadataRecord>>,
    pub by_id: HashMap<i64, MetadataRecord>,
    pub trending: Vec<MetadataRecord>,
    pub popular: Vec<MetadataRecord>,
    pub recommendations: HashMap<i64, Vec<Recommendation>>,
    pub reviews: HashMap<i64, Vec<Review>>,
    pub fail: bool,
    pub search_calls: AtomicUsize,
}

impl FakeMetadata {
    pub fn with_search(mut self, query: &str, results: Vec<MetadataRecord>) -> Self {
        self.searches.insert(query.to_lowercase(), results);
        self
    }

    pub fn with_record(mut self, record: MetadataRecord) -> Self {
        self.by_id.insert(record.id, record);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn search_by_title(&self, title: &str, limit: u32) -> PortResult<Vec<MetadataRecord>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable());
        }
        Ok(self
            .searches
            .get(&title.to_lowercase())
            .map(|results| results.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_by_id(&self, id: i64) -> PortResult<MetadataRecord> {
        if self.fail {
            return Err(unavailable());
        }
        self.by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("media {id}")))
    }

    async fn trending(&self, limit: u32) -> PortResult<Vec<MetadataRecord>> {
        if self.fail {
            return Err(unavailable());
        }
        Ok(self.trending.iter().take(limit as usize).cloned().collect())
    }

    async fn popular(&self, limit: u32) -> PortResult<Vec<MetadataRecord>> {
        if self.fail {
            return Err(unavailable());
        }
        Ok(self.popular.iter().take(limit as usize).cloned().collect())
    }

    async fn recommendations(&self, id: i64) -> PortResult<Vec<Recommendation>> {
        if self.fail {
            return Err(unavailable());
        }
        Ok(self.recommendations.get(&id).cloned().unwrap_or_default())
    }

    async fn reviews(&self, id: i64) -> PortResult<Vec<Review>> {
        if self.fail {
            return Err(unavailable());
        }
        Ok(self.reviews.get(&id).cloned().unwrap_or_default())
    }
}
