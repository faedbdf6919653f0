//! services/api/src/adapters/gateway.rs
//!
//! The outbound HTTP client shared by both upstream adapters. Every call goes
//! through a token bucket and a short-lived response cache; a cache hit costs
//! neither a token nor a network round trip.

use mangashelf_core::cache::TtlCache;
use mangashelf_core::ports::{PortError, PortResult};
use mangashelf_core::rate_limit::TokenBucket;
use reqwest::{Client, Request, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("mangashelf/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 300;

//=========================================================================================
// The Gateway Struct
//=========================================================================================

pub struct RateLimitedGateway {
    name: &'static str,
    client: Client,
    base_url: String,
    limiter: TokenBucket,
    cache: TtlCache<String, Value>,
}

impl RateLimitedGateway {
    /// Creates a gateway for one upstream. `timeout` bounds each request.
    pub fn new(
        name: &'static str,
        base_url: &str,
        limiter: TokenBucket,
        cache: TtlCache<String, Value>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            name,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
            cache,
        })
    }

    pub async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> PortResult<Value> {
        let request = self.build(
            self.client
                .get(format!("{}{}", self.base_url, endpoint))
                .query(params),
        )?;
        // Keyed on the encoded query so a value holding `&` or `=` cannot
        // collide with a different parameter set.
        let key = format!("GET {endpoint}?{}", request.url().query().unwrap_or_default());
        self.execute(key, request).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> PortResult<Value> {
        let key = format!("POST {endpoint}?{body}");
        let request = self.build(
            self.client
                .post(format!("{}{}", self.base_url, endpoint))
                .json(body),
        )?;
        self.execute(key, request).await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn build(&self, builder: RequestBuilder) -> PortResult<Request> {
        builder
            .build()
            .map_err(|e| PortError::Unexpected(format!("invalid {} request: {e}", self.name)))
    }

    async fn execute(&self, key: String, request: Request) -> PortResult<Value> {
        if let Some(hit) = self.cache.get(&key) {
            debug!(upstream = self.name, %key, "response cache hit");
            return Ok(hit);
        }

        self.limiter.acquire().await;
        debug!(upstream = self.name, %key, "sending upstream request");

        let response = self.client.execute(request).await.map_err(|e| {
            warn!(upstream = self.name, error = %e, "upstream request failed");
            if e.is_timeout() {
                PortError::Upstream {
                    status: 504,
                    message: format!("{} did not respond in time", self.name),
                }
            } else {
                PortError::Upstream {
                    status: 502,
                    message: format!("{} is unreachable", self.name),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PortError::Upstream {
            status: 502,
            message: format!("{} sent an unreadable body: {e}", self.name),
        })?;

        if !status.is_success() {
            warn!(upstream = self.name, status = status.as_u16(), "upstream returned an error");
            return Err(PortError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&body)
                    .unwrap_or_else(|| format!("{} returned HTTP {}", self.name, status.as_u16())),
            });
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| PortError::Upstream {
            status: 502,
            message: format!("{} sent invalid JSON: {e}", self.name),
        })?;
        if let Some(error) = embedded_error(&value) {
            warn!(upstream = self.name, %error, "upstream reported an error in a 2xx body");
            return Err(error);
        }
        self.cache.insert(key, value.clone());
        Ok(value)
    }
}

/// GraphQL reports failures as `{"data": null, "errors": [...]}`, often with
/// a 200 status. Such bodies are errors and must never be cached.
fn embedded_error(value: &Value) -> Option<PortError> {
    let errors = value.get("errors")?.as_array().filter(|e| !e.is_empty())?;
    if !value.get("data").map_or(true, Value::is_null) {
        return None;
    }
    let status = errors[0]["status"]
        .as_u64()
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(502);
    Some(PortError::Upstream {
        status,
        message: upstream_message(&value.to_string())
            .unwrap_or_else(|| "upstream returned no data".to_string()),
    })
}

/// Best-effort human-readable message from an upstream error payload.
/// Understands `{"errors":[{"detail"|"message": ...}]}` and `{"message": ...}`.
pub fn upstream_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        let first_error = json["errors"].get(0);
        let found = first_error
            .and_then(|e| e["detail"].as_str().or_else(|| e["message"].as_str()))
            .or_else(|| json["message"].as_str());
        if let Some(message) = found {
            return Some(message.to_string());
        }
    }
    Some(trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn gateway(base_url: &str, limiter: TokenBucket) -> RateLimitedGateway {
        RateLimitedGateway::new(
            "test-upstream",
            base_url,
            limiter,
            TtlCache::with_ttl(Duration::from_secs(60)),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn identical_requests_hit_the_network_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/manga")
            .match_query(Matcher::UrlEncoded("title".into(), "Berserk".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"ok","data":[]}"#)
            .expect(1)
            .create_async()
            .await;

        let gw = gateway(&server.url(), TokenBucket::per_second(5));
        let params = [("title", "Berserk".to_string())];
        let first = gw.get("/manga", &params).await.unwrap();
        let second = gw.get("/manga", &params).await.unwrap();

        assert_eq!(first, second);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cache_hit_does_not_consume_a_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":{"Media":{"id":1}}}"#)
            .create_async()
            .await;

        // One token, next refill a minute away.
        let gw = gateway(&server.url(), TokenBucket::per_minute(1));
        let body = serde_json::json!({"query": "q", "variables": {"id": 1}});
        gw.post("/", &body).await.unwrap();

        let again = tokio::time::timeout(Duration::from_secs(2), gw.post("/", &body)).await;
        assert!(again.is_ok(), "cache hit waited for the rate limiter");
    }

    #[tokio::test]
    async fn non_success_becomes_upstream_error_with_detail() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/manga/nope")
            .with_status(404)
            .with_body(r#"{"result":"error","errors":[{"status":404,"detail":"Manga with id nope not found"}]}"#)
            .create_async()
            .await;

        let gw = gateway(&server.url(), TokenBucket::per_second(5));
        let err = gw.get("/manga/nope", &[]).await.unwrap_err();
        assert_eq!(
            err,
            PortError::Upstream {
                status: 404,
                message: "Manga with id nope not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/statistics/manga/x")
            .with_status(503)
            .with_body("upstream overloaded")
            .expect(2)
            .create_async()
            .await;

        let gw = gateway(&server.url(), TokenBucket::per_second(5));
        assert!(gw.get("/statistics/manga/x", &[]).await.is_err());
        assert!(gw.get("/statistics/manga/x", &[]).await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn graphql_errors_in_ok_bodies_are_not_cached() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"errors":[{"message":"Too Many Requests.","status":429}],"data":null}"#)
            .expect(1)
            .create_async()
            .await;

        let gw = gateway(&server.url(), TokenBucket::per_second(5));
        let body = serde_json::json!({"query": "trending", "variables": {"perPage": 5}});
        let err = gw.post("/", &body).await.unwrap_err();
        assert_eq!(
            err,
            PortError::Upstream {
                status: 429,
                message: "Too Many Requests.".to_string()
            }
        );
        failing.assert_async().await;
        failing.remove_async().await;

        let recovered = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":{"Page":{"media":[]}}}"#)
            .expect(1)
            .create_async()
            .await;
        let value = gw.post("/", &body).await.unwrap();
        assert_eq!(value["data"]["Page"]["media"], serde_json::json!([]));
        recovered.assert_async().await;
    }

    #[tokio::test]
    async fn query_values_with_separators_do_not_share_a_cache_entry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/manga")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"result":"ok","data":[]}"#)
            .expect(2)
            .create_async()
            .await;

        let gw = gateway(&server.url(), TokenBucket::per_second(5));
        gw.get("/manga", &[("title", "a&limit=5".to_string())])
            .await
            .unwrap();
        gw.get(
            "/manga",
            &[("title", "a".to_string()), ("limit", "5".to_string())],
        )
        .await
        .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn distinct_requests_beyond_the_bucket_wait_for_a_refill() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex("^/statistics/manga/".to_string()))
            .with_status(200)
            .with_body(r#"{"result":"ok","statistics":{}}"#)
            .expect(2)
            .create_async()
            .await;

        // Real clock: the requests go over a socket, so paused time could
        // fire the client timeout early.
        let gw = gateway(&server.url(), TokenBucket::per_second(1));
        let start = std::time::Instant::now();
        gw.get("/statistics/manga/a", &[]).await.unwrap();
        let first = start.elapsed();
        gw.get("/statistics/manga/b", &[]).await.unwrap();
        let second = start.elapsed();

        assert!(first < Duration::from_millis(500), "first took {first:?}");
        assert!(second >= Duration::from_millis(900), "second took {second:?}");
        assert!(second < Duration::from_millis(2500), "second took {second:?}");
    }

    #[test]
    fn upstream_message_prefers_structured_fields() {
        assert_eq!(
            upstream_message(r#"{"errors":[{"message":"Not Found.","status":404}],"data":null}"#),
            Some("Not Found.".to_string())
        );
        assert_eq!(
            upstream_message(r#"{"message":"slow down"}"#),
            Some("slow down".to_string())
        );
        assert_eq!(upstream_message("plain text"), Some("plain text".to_string()));
        assert_eq!(upstream_message("   "), None);
    }
}
