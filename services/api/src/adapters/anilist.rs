//! services/api/src/adapters/anilist.rs
//!
//! The secondary-source adapter. Implements the `MetadataSource` port with
//! named GraphQL queries against a single AniList endpoint.

use async_trait::async_trait;
use mangashelf_core::domain::{MetadataRecord, Recommendation, Review};
use mangashelf_core::ports::{MetadataSource, PortError, PortResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::adapters::gateway::RateLimitedGateway;

/// AniList rejects `perPage` above 50.
const MAX_PER_PAGE: u32 = 50;
const RECOMMENDATIONS_PER_PAGE: u32 = 10;
const REVIEWS_PER_PAGE: u32 = 5;

const MEDIA_FIELDS: &str = "id title { romaji english native } synonyms coverImage { large medium } averageScore popularity trending genres";

const RECOMMENDATIONS_FIELD: &str = "recommendations(sort: RATING_DESC, perPage: $recPerPage) { nodes { rating mediaRecommendation { id title { romaji english native } coverImage { large medium } } } }";

const REVIEWS_FIELD: &str = "reviews(sort: RATING_DESC, perPage: $reviewPerPage) { nodes { score summary body user { name } } }";

fn page_query(arguments: &str) -> String {
    format!(
        "query ($page: Int, $perPage: Int{extra}) {{ Page(page: $page, perPage: $perPage) {{ media(type: MANGA{arguments}) {{ {MEDIA_FIELDS} }} }} }}",
        extra = if arguments.contains("$search") { ", $search: String" } else { "" },
    )
}

fn media_query(fields: &str) -> String {
    let mut declared = String::from("$id: Int");
    if fields.contains("$recPerPage") {
        declared.push_str(", $recPerPage: Int");
    }
    if fields.contains("$reviewPerPage") {
        declared.push_str(", $reviewPerPage: Int");
    }
    format!("query ({declared}) {{ Media(id: $id, type: MANGA) {{ {fields} }} }}")
}

//=========================================================================================
// Upstream Payloads
//=========================================================================================

#[derive(Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: MediaPage,
}

#[derive(Deserialize)]
struct MediaPage {
    #[serde(default)]
    media: Vec<MediaNode>,
}

#[derive(Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: MediaNode,
}

#[derive(Deserialize, Default)]
struct MediaTitle {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Deserialize)]
struct CoverImage {
    large: Option<String>,
    medium: Option<String>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaNode {
    id: i64,
    #[serde(default)]
    title: MediaTitle,
    synonyms: Option<Vec<String>>,
    cover_image: Option<CoverImage>,
    average_score: Option<u32>,
    popularity: Option<u64>,
    trending: Option<i64>,
    genres: Option<Vec<String>>,
    recommendations: Option<Connection<RecommendationNode>>,
    reviews: Option<Connection<ReviewNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationNode {
    rating: Option<i64>,
    media_recommendation: Option<RecommendedMedia>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedMedia {
    id: i64,
    #[serde(default)]
    title: MediaTitle,
    cover_image: Option<CoverImage>,
}

#[derive(Deserialize)]
struct ReviewNode {
    score: Option<u32>,
    summary: Option<String>,
    body: Option<String>,
    user: Option<ReviewUser>,
}

#[derive(Deserialize)]
struct ReviewUser {
    name: String,
}

impl MediaTitle {
    /// English, then romaji, then native.
    fn display(&self) -> String {
        self.english
            .as_ref()
            .or(self.romaji.as_ref())
            .or(self.native.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn all(&self) -> impl Iterator<Item = &String> {
        [&self.english, &self.romaji, &self.native]
            .into_iter()
            .flatten()
    }
}

impl CoverImage {
    fn best(self) -> Option<String> {
        self.large.or(self.medium)
    }
}

impl RecommendationNode {
    fn to_domain(self) -> Option<Recommendation> {
        let media = self.media_recommendation?;
        Some(Recommendation {
            title: media.title.display(),
            secondary_id: media.id,
            cover_image: media.cover_image.and_then(CoverImage::best),
            score: self.rating.unwrap_or(0),
        })
    }
}

impl ReviewNode {
    fn to_domain(self) -> Review {
        Review {
            author: self.user.map(|u| u.name).unwrap_or_default(),
            score: self.score,
            body: self.body.or(self.summary).unwrap_or_default(),
        }
    }
}

impl MediaNode {
    fn to_domain(self) -> MetadataRecord {
        let title = self.title.display();
        let mut alt_titles: Vec<String> = Vec::new();
        for candidate in self
            .title
            .all()
            .cloned()
            .chain(self.synonyms.unwrap_or_default())
        {
            if !candidate.is_empty() && candidate != title && !alt_titles.contains(&candidate) {
                alt_titles.push(candidate);
            }
        }

        MetadataRecord {
            id: self.id,
            title,
            alt_titles,
            cover_image: self.cover_image.and_then(CoverImage::best),
            average_score: self.average_score,
            popularity: self.popularity,
            trending_score: self.trending,
            genres: self.genres.unwrap_or_default(),
            recommendations: self
                .recommendations
                .map(|c| c.nodes.into_iter().filter_map(RecommendationNode::to_domain).collect())
                .unwrap_or_default(),
            reviews: self
                .reviews
                .map(|c| c.nodes.into_iter().map(ReviewNode::to_domain).collect())
                .unwrap_or_default(),
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct AniListAdapter {
    gateway: Arc<RateLimitedGateway>,
}

impl AniListAdapter {
    pub fn new(gateway: Arc<RateLimitedGateway>) -> Self {
        Self { gateway }
    }

    /// Posts a named query and decodes its `data` member.
    async fn query<T: DeserializeOwned>(&self, query: String, variables: Value) -> PortResult<T> {
        let body = json!({ "query": query, "variables": variables });
        let mut response = self.gateway.post("/", &body).await?;

        let data = response
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        // Error bodies are rejected by the gateway; a bare null is still no data.
        if data.is_null() {
            return Err(PortError::Upstream {
                status: 502,
                message: "AniList returned no data".to_string(),
            });
        }
        serde_json::from_value(data).map_err(|e| PortError::Upstream {
            status: 502,
            message: format!("unexpected AniList payload: {e}"),
        })
    }

    async fn ranked(&self, sort: &str, limit: u32) -> PortResult<Vec<MetadataRecord>> {
        let data: PageData = self
            .query(
                page_query(&format!(", sort: {sort}, isAdult: false")),
                json!({ "page": 1, "perPage": limit.clamp(1, MAX_PER_PAGE) }),
            )
            .await?;
        Ok(data.page.media.into_iter().map(MediaNode::to_domain).collect())
    }

    async fn media(&self, id: i64, fields: &str) -> PortResult<MediaNode> {
        let data: MediaData = self
            .query(
                media_query(fields),
                json!({
                    "id": id,
                    "recPerPage": RECOMMENDATIONS_PER_PAGE,
                    "reviewPerPage": REVIEWS_PER_PAGE,
                }),
            )
            .await?;
        Ok(data.media)
    }
}

//=========================================================================================
// `MetadataSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl MetadataSource for AniListAdapter {
    async fn search_by_title(&self, title: &str, limit: u32) -> PortResult<Vec<MetadataRecord>> {
        let data: PageData = self
            .query(
                page_query(", search: $search, sort: SEARCH_MATCH"),
                json!({ "page": 1, "perPage": limit.clamp(1, MAX_PER_PAGE), "search": title }),
            )
            .await?;
        Ok(data.page.media.into_iter().map(MediaNode::to_domain).collect())
    }

    async fn get_by_id(&self, id: i64) -> PortResult<MetadataRecord> {
        let fields = format!("{MEDIA_FIELDS} {RECOMMENDATIONS_FIELD} {REVIEWS_FIELD}");
        Ok(self.media(id, &fields).await?.to_domain())
    }

    async fn trending(&self, limit: u32) -> PortResult<Vec<MetadataRecord>> {
        self.ranked("TRENDING_DESC", limit).await
    }

    async fn popular(&self, limit: u32) -> PortResult<Vec<MetadataRecord>> {
        self.ranked("POPULARITY_DESC", limit).await
    }

    async fn recommendations(&self, id: i64) -> PortResult<Vec<Recommendation>> {
        let fields = format!("id {RECOMMENDATIONS_FIELD}");
        Ok(self.media(id, &fields).await?.to_domain().recommendations)
    }

    async fn reviews(&self, id: i64) -> PortResult<Vec<Review>> {
        let fields = format!("id {REVIEWS_FIELD}");
        Ok(self.media(id, &fields).await?.to_domain().reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangashelf_core::cache::TtlCache;
    use mangashelf_core::rate_limit::TokenBucket;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn adapter(base_url: &str) -> AniListAdapter {
        let gateway = RateLimitedGateway::new(
            "anilist",
            base_url,
            TokenBucket::per_minute(90),
            TtlCache::with_ttl(Duration::from_secs(60)),
            Duration::from_secs(5),
        )
        .unwrap();
        AniListAdapter::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn search_maps_titles_and_scores() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"variables": {"search": "Attack on Titan"}})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":{"Page":{"media":[{
                    "id":53390,
                    "title":{"romaji":"Shingeki no Kyojin","english":"Attack on Titan","native":"進撃の巨人"},
                    "synonyms":["AoT","Attack on Titan"],
                    "coverImage":{"large":"https://img.example/large.jpg","medium":null},
                    "averageScore":84,"popularity":150000,"trending":12,
                    "genres":["Action","Drama"]
                }]}}}"#,
            )
            .create_async()
            .await;

        let results = adapter(&server.url())
            .search_by_title("Attack on Titan", 5)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let record = &results[0];
        assert_eq!(record.id, 53390);
        assert_eq!(record.title, "Attack on Titan");
        assert_eq!(
            record.alt_titles,
            vec!["Shingeki no Kyojin".to_string(), "進撃の巨人".to_string(), "AoT".to_string()]
        );
        assert_eq!(record.average_score, Some(84));
        assert_eq!(record.cover_image.as_deref(), Some("https://img.example/large.jpg"));
    }

    #[tokio::test]
    async fn recommendations_skip_deleted_media() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                r#"{"data":{"Media":{"id":1,"recommendations":{"nodes":[
                    {"rating":57,"mediaRecommendation":{"id":2,"title":{"romaji":"Berserk","english":null,"native":null},"coverImage":null}},
                    {"rating":3,"mediaRecommendation":null}
                ]}}}}"#,
            )
            .create_async()
            .await;

        let recs = adapter(&server.url()).recommendations(1).await.unwrap();
        assert_eq!(
            recs,
            vec![Recommendation {
                title: "Berserk".to_string(),
                secondary_id: 2,
                cover_image: None,
                score: 57,
            }]
        );
    }

    #[tokio::test]
    async fn graphql_errors_become_upstream_errors() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(404)
            .with_body(r#"{"errors":[{"message":"Not Found.","status":404}],"data":{"Media":null}}"#)
            .create_async()
            .await;

        let err = adapter(&server.url()).get_by_id(999).await.unwrap_err();
        assert_eq!(
            err,
            PortError::Upstream {
                status: 404,
                message: "Not Found.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn null_data_with_ok_status_is_an_error_and_retried() {
        let mut server = Server::new_async().await;
        let throttled = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"errors":[{"message":"Too Many Requests.","status":429}],"data":null}"#)
            .create_async()
            .await;

        let anilist = adapter(&server.url());
        let err = anilist.trending(5).await.unwrap_err();
        assert_eq!(
            err,
            PortError::Upstream {
                status: 429,
                message: "Too Many Requests.".to_string()
            }
        );
        throttled.remove_async().await;

        let recovered = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":{"Page":{"media":[{"id":1,"title":{"romaji":"Dandadan"}}]}}}"#)
            .expect(1)
            .create_async()
            .await;
        let records = anilist.trending(5).await.unwrap();
        assert_eq!(records[0].title, "Dandadan");
        recovered.assert_async().await;
    }

    #[tokio::test]
    async fn bare_null_data_is_an_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":null}"#)
            .create_async()
            .await;

        let err = adapter(&server.url()).get_by_id(1).await.unwrap_err();
        assert!(matches!(err, PortError::Upstream { status: 502, .. }));
    }

    #[test]
    fn queries_declare_only_the_variables_they_use() {
        assert!(page_query(", search: $search").contains("$search: String"));
        assert!(!page_query(", sort: TRENDING_DESC").contains("$search"));

        let reviews_only = media_query(&format!("id {REVIEWS_FIELD}"));
        assert!(reviews_only.contains("$reviewPerPage: Int"));
        assert!(!reviews_only.contains("$recPerPage"));
    }
}
