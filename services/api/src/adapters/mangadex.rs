//! services/api/src/adapters/mangadex.rs
//!
//! The primary-source adapter. Implements the `ContentSource` port against the
//! MangaDex REST API, through the rate-limited gateway.

use async_trait::async_trait;
use mangashelf_core::domain::{
    ChapterPages, ChapterRecord, ContentRecord, MangaStatistics, PublicationStatus,
};
use mangashelf_core::ports::{ContentSource, PortError, PortResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::gateway::RateLimitedGateway;

/// Upstream cap on `limit` for `/manga`.
const MAX_SEARCH_LIMIT: u32 = 100;
/// Upstream cap on `limit` for `/manga/{id}/feed`.
const MAX_FEED_LIMIT: u32 = 500;

//=========================================================================================
// Upstream Payloads
//=========================================================================================

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct Entity<T> {
    data: T,
}

#[derive(Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    description: LocalizedField,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    tags: Vec<Tag>,
}

/// MangaDex sends `[]` instead of `{}` for an empty localized map.
#[derive(Deserialize, Default)]
#[serde(untagged)]
enum LocalizedField {
    Map(HashMap<String, String>),
    #[default]
    Empty,
    #[allow(dead_code)]
    List(Vec<Value>),
}

#[derive(Deserialize)]
struct Tag {
    attributes: TagAttributes,
}

#[derive(Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: HashMap<String, String>,
    #[serde(default)]
    group: String,
}

#[derive(Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    rel_type: String,
    attributes: Option<Value>,
}

#[derive(Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    chapter: Option<String>,
    volume: Option<String>,
    title: Option<String>,
    #[serde(default)]
    translated_language: String,
    #[serde(default)]
    pages: u32,
    publish_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeResponse {
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Deserialize)]
struct AtHomeChapter {
    hash: String,
    #[serde(default)]
    data: Vec<String>,
}

#[derive(Deserialize)]
struct StatisticsResponse {
    #[serde(default)]
    statistics: HashMap<String, StatisticsEntry>,
}

#[derive(Deserialize)]
struct StatisticsEntry {
    rating: Option<RatingEntry>,
    follows: Option<u64>,
}

#[derive(Deserialize)]
struct RatingEntry {
    bayesian: Option<f64>,
    average: Option<f64>,
}

impl StatisticsEntry {
    fn to_domain(self) -> MangaStatistics {
        MangaStatistics {
            rating: self.rating.and_then(|r| r.bayesian.or(r.average)),
            follows: self.follows,
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> PortResult<T> {
    serde_json::from_value(value).map_err(|e| PortError::Upstream {
        status: 502,
        message: format!("unexpected MangaDex {what} payload: {e}"),
    })
}

/// English first, then any available locale.
fn pick_locale(map: &HashMap<String, String>) -> Option<String> {
    map.get("en")
        .or_else(|| {
            let mut locales: Vec<&String> = map.keys().collect();
            locales.sort();
            locales.first().and_then(|k| map.get(*k))
        })
        .cloned()
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct MangaDexAdapter {
    gateway: Arc<RateLimitedGateway>,
    cover_base_url: String,
}

impl MangaDexAdapter {
    pub fn new(gateway: Arc<RateLimitedGateway>, cover_base_url: &str) -> Self {
        Self {
            gateway,
            cover_base_url: cover_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn to_domain(&self, manga: MangaData) -> ContentRecord {
        let attrs = manga.attributes;
        let title = pick_locale(&attrs.title).unwrap_or_default();
        let description = match &attrs.description {
            LocalizedField::Map(map) => pick_locale(map).unwrap_or_default(),
            _ => String::new(),
        };
        let genres = attrs
            .tags
            .iter()
            .filter(|tag| tag.attributes.group == "genre")
            .filter_map(|tag| pick_locale(&tag.attributes.name))
            .collect();

        let related = |kind: &str, field: &str| -> Option<String> {
            manga
                .relationships
                .iter()
                .find(|r| r.rel_type == kind)
                .and_then(|r| r.attributes.as_ref())
                .and_then(|a| a.get(field))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let author = related("author", "name").unwrap_or_default();
        let cover_image_ref = related("cover_art", "fileName")
            .map(|file| format!("{}/covers/{}/{}", self.cover_base_url, manga.id, file));

        ContentRecord {
            id: manga.id.clone(),
            title,
            description,
            genres,
            status: PublicationStatus::from_upstream(attrs.status.as_deref().unwrap_or("")),
            author,
            cover_image_ref,
            year: attrs.year,
        }
    }
}

fn includes() -> Vec<(&'static str, String)> {
    vec![
        ("includes[]", "cover_art".to_string()),
        ("includes[]", "author".to_string()),
    ]
}

//=========================================================================================
// `ContentSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentSource for MangaDexAdapter {
    async fn search(&self, title: &str, limit: u32, offset: u32) -> PortResult<Vec<ContentRecord>> {
        let mut params = vec![
            ("title", title.to_string()),
            ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
            ("offset", offset.to_string()),
            ("order[relevance]", "desc".to_string()),
        ];
        params.extend(includes());
        let value = self.gateway.get("/manga", &params).await?;
        let list: Collection<MangaData> = decode(value, "search")?;
        Ok(list.data.into_iter().map(|m| self.to_domain(m)).collect())
    }

    async fn get_details(&self, id: &str) -> PortResult<ContentRecord> {
        let value = self
            .gateway
            .get(&format!("/manga/{id}"), &includes())
            .await?;
        let entity: Entity<MangaData> = decode(value, "manga")?;
        Ok(self.to_domain(entity.data))
    }

    async fn get_feed(
        &self,
        id: &str,
        langs: &[String],
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<ChapterRecord>> {
        let mut params = vec![
            ("limit", limit.clamp(1, MAX_FEED_LIMIT).to_string()),
            ("offset", offset.to_string()),
            ("order[chapter]", "asc".to_string()),
        ];
        params.extend(langs.iter().map(|l| ("translatedLanguage[]", l.clone())));
        let value = self
            .gateway
            .get(&format!("/manga/{id}/feed"), &params)
            .await?;
        let list: Collection<ChapterData> = decode(value, "feed")?;
        Ok(list
            .data
            .into_iter()
            .map(|c| ChapterRecord {
                id: c.id,
                chapter: c.attributes.chapter,
                volume: c.attributes.volume,
                title: c.attributes.title.filter(|t| !t.is_empty()),
                translated_language: c.attributes.translated_language,
                pages: c.attributes.pages,
                published_at: c.attributes.publish_at,
            })
            .collect())
    }

    async fn get_chapter_pages(&self, chapter_id: &str) -> PortResult<ChapterPages> {
        let value = self
            .gateway
            .get(&format!("/at-home/server/{chapter_id}"), &[])
            .await?;
        let at_home: AtHomeResponse = decode(value, "at-home")?;
        Ok(ChapterPages {
            base_url: at_home.base_url,
            hash: at_home.chapter.hash,
            page_filenames: at_home.chapter.data,
        })
    }

    async fn get_statistics(&self, id: &str) -> PortResult<MangaStatistics> {
        let value = self
            .gateway
            .get(&format!("/statistics/manga/{id}"), &[])
            .await?;
        let mut response: StatisticsResponse = decode(value, "statistics")?;
        Ok(response
            .statistics
            .remove(id)
            .map(StatisticsEntry::to_domain)
            .unwrap_or_default())
    }

    async fn get_statistics_batch(
        &self,
        ids: &[String],
    ) -> PortResult<HashMap<String, MangaStatistics>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let params: Vec<(&str, String)> = ids.iter().map(|id| ("manga[]", id.clone())).collect();
        let value = self.gateway.get("/statistics/manga", &params).await?;
        let response: StatisticsResponse = decode(value, "statistics")?;
        Ok(response
            .statistics
            .into_iter()
            .map(|(id, entry)| (id, entry.to_domain()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangashelf_core::cache::TtlCache;
    use mangashelf_core::rate_limit::TokenBucket;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn adapter(base_url: &str) -> MangaDexAdapter {
        let gateway = RateLimitedGateway::new(
            "mangadex",
            base_url,
            TokenBucket::per_second(5),
            TtlCache::with_ttl(Duration::from_secs(60)),
            Duration::from_secs(5),
        )
        .unwrap();
        MangaDexAdapter::new(Arc::new(gateway), "https://uploads.example")
    }

    const MANGA_JSON: &str = r#"{
        "result": "ok",
        "data": {
            "id": "a1c7c817",
            "type": "manga",
            "attributes": {
                "title": {"ja-ro": "Shingeki no Kyojin"},
                "description": [],
                "status": "completed",
                "year": 2009,
                "tags": [
                    {"attributes": {"name": {"en": "Action"}, "group": "genre"}},
                    {"attributes": {"name": {"en": "Military"}, "group": "theme"}}
                ]
            },
            "relationships": [
                {"id": "au-1", "type": "author", "attributes": {"name": "Isayama Hajime"}},
                {"id": "cv-1", "type": "cover_art", "attributes": {"fileName": "cover.jpg"}}
            ]
        }
    }"#;

    #[tokio::test]
    async fn details_map_locales_tags_and_relationships() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/manga/a1c7c817")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(MANGA_JSON)
            .create_async()
            .await;

        let record = adapter(&server.url()).get_details("a1c7c817").await.unwrap();

        assert_eq!(record.title, "Shingeki no Kyojin");
        assert_eq!(record.description, "");
        assert_eq!(record.genres, vec!["Action".to_string()]);
        assert_eq!(record.status, PublicationStatus::Completed);
        assert_eq!(record.author, "Isayama Hajime");
        assert_eq!(
            record.cover_image_ref.as_deref(),
            Some("https://uploads.example/covers/a1c7c817/cover.jpg")
        );
        assert_eq!(record.year, Some(2009));
    }

    #[tokio::test]
    async fn statistics_batch_prefers_bayesian_rating() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/statistics/manga")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"result":"ok","statistics":{
                    "m1":{"rating":{"average":8.0,"bayesian":7.9},"follows":1200},
                    "m2":{"rating":{"average":null,"bayesian":null},"follows":3}
                }}"#,
            )
            .create_async()
            .await;

        let stats = adapter(&server.url())
            .get_statistics_batch(&["m1".to_string(), "m2".to_string()])
            .await
            .unwrap();

        assert_eq!(stats["m1"].rating, Some(7.9));
        assert_eq!(stats["m1"].follows, Some(1200));
        assert_eq!(stats["m2"].rating, None);
    }

    #[tokio::test]
    async fn chapter_pages_build_reader_urls() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/at-home/server/ch-1")
            .with_status(200)
            .with_body(
                r#"{"result":"ok","baseUrl":"https://node.example","chapter":{
                    "hash":"h4sh","data":["1.png","2.png"],"dataSaver":["1.jpg","2.jpg"]}}"#,
            )
            .create_async()
            .await;

        let pages = adapter(&server.url()).get_chapter_pages("ch-1").await.unwrap();
        assert_eq!(
            pages.page_urls(),
            vec![
                "https://node.example/data/h4sh/1.png".to_string(),
                "https://node.example/data/h4sh/2.png".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn feed_passes_languages_and_maps_chapters() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/manga/m1/feed")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("translatedLanguage[]".into(), "en".into()),
                Matcher::UrlEncoded("limit".into(), "500".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"result":"ok","data":[{"id":"c1","attributes":{
                    "chapter":"1","volume":null,"title":"","translatedLanguage":"en",
                    "pages":18,"publishAt":"2020-01-01T00:00:00+00:00"}}]}"#,
            )
            .create_async()
            .await;

        let chapters = adapter(&server.url())
            .get_feed("m1", &["en".to_string()], 500, 0)
            .await
            .unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].chapter.as_deref(), Some("1"));
        assert_eq!(chapters[0].title, None);
        assert_eq!(chapters[0].pages, 18);
    }
}
