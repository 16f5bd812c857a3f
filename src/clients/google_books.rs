//! Google Books volume search client
//!
//! One HTTP client shared by three thin [`LookupClient`] adapters:
//! [`IsbnLookup`] (title/author search returning an ISBN), [`CoverLookup`]
//! (largest available cover image URL) and [`TitleLookup`] (corrected title
//! by ISBN). HTTP 429 maps to [`LookupError::RateLimited`]; timeouts and
//! connection failures map to [`LookupError::Transient`].

use super::title_clean::clean_title;
use super::{LookupClient, LookupError};
use crate::types::{LookupResult, SearchHints};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";
const USER_AGENT: &str = concat!("libris-enrich/", env!("CARGO_PKG_VERSION"));
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Books API client
pub struct GoogleBooksClient {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleBooksClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| LookupError::Transient(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetch the best-matching volume for a query, if any
    async fn first_volume(&self, query: &str) -> Result<Option<VolumeInfo>, LookupError> {
        let url = format!("{}/volumes", self.base_url);

        tracing::debug!(query = %query, "Querying Google Books");

        let response = self
            .http
            .get(&url)
            .query(&[("q", query), ("maxResults", "1")])
            .send()
            .await
            .map_err(|e| LookupError::Transient(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(LookupError::RateLimited);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LookupError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: VolumesResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Transient(format!("decode failed: {}", e)))?;

        Ok(body
            .items
            .and_then(|items| items.into_iter().next())
            .map(|v| v.volume_info))
    }
}

/// Strip hyphens and whitespace from an ISBN
fn clean_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Finds an ISBN for a book known only by title and author.
///
/// ISBN-13 is preferred over ISBN-10 when both identifiers are present.
pub struct IsbnLookup {
    client: Arc<GoogleBooksClient>,
}

impl IsbnLookup {
    pub fn new(client: Arc<GoogleBooksClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LookupClient for IsbnLookup {
    async fn lookup(&self, hints: &SearchHints) -> Result<LookupResult, LookupError> {
        let Some(title) = hints.title.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(LookupResult::miss());
        };

        let mut query = format!("intitle:{}", title);
        if let Some(author) = hints.author.as_deref().filter(|a| !a.trim().is_empty()) {
            query.push_str(&format!("+inauthor:{}", author));
        }
        if let Some(publisher) = hints.publisher.as_deref().filter(|p| !p.trim().is_empty()) {
            query.push_str(&format!("+inpublisher:{}", publisher));
        }
        if let Some(year) = hints.year {
            query.push_str(&format!("+{}", year));
        }

        let Some(info) = self.client.first_volume(&query).await? else {
            return Ok(LookupResult::miss());
        };

        let identifiers = info.industry_identifiers.unwrap_or_default();
        let isbn = identifiers
            .iter()
            .find(|id| id.id_type == "ISBN_13")
            .or_else(|| identifiers.iter().find(|id| id.id_type == "ISBN_10"))
            .map(|id| clean_isbn(&id.identifier));

        match isbn.filter(|i| !i.is_empty()) {
            Some(isbn) => Ok(LookupResult::hit(isbn)),
            None => Ok(LookupResult::miss()),
        }
    }
}

/// Finds a cover image URL, preferring an isbn: query and the largest
/// available image.
pub struct CoverLookup {
    client: Arc<GoogleBooksClient>,
}

impl CoverLookup {
    pub fn new(client: Arc<GoogleBooksClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LookupClient for CoverLookup {
    async fn lookup(&self, hints: &SearchHints) -> Result<LookupResult, LookupError> {
        let query = match hints.isbn.as_deref().map(clean_isbn) {
            Some(isbn) if isbn.len() > 9 => format!("isbn:{}", isbn),
            _ => {
                let mut parts = Vec::new();
                if let Some(title) = hints.title.as_deref().filter(|t| !t.trim().is_empty()) {
                    parts.push(format!("intitle:{}", title));
                }
                if let Some(author) = hints.author.as_deref().filter(|a| !a.trim().is_empty()) {
                    parts.push(format!("inauthor:{}", author));
                }
                if parts.is_empty() {
                    return Ok(LookupResult::miss());
                }
                parts.join("+")
            }
        };

        let Some(info) = self.client.first_volume(&query).await? else {
            return Ok(LookupResult::miss());
        };

        let url = info.image_links.and_then(|links| {
            links
                .extra_large
                .or(links.large)
                .or(links.medium)
                .or(links.thumbnail)
                .or(links.small_thumbnail)
        });

        match url {
            Some(url) => Ok(LookupResult::hit(url.replacen("http://", "https://", 1))),
            None => Ok(LookupResult::miss()),
        }
    }
}

/// Repairs a mangled title by looking the book up by ISBN.
///
/// Items without a usable ISBN are reported as misses: title repair by fuzzy
/// title search is too low-confidence to auto-apply.
pub struct TitleLookup {
    client: Arc<GoogleBooksClient>,
}

impl TitleLookup {
    pub fn new(client: Arc<GoogleBooksClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LookupClient for TitleLookup {
    async fn lookup(&self, hints: &SearchHints) -> Result<LookupResult, LookupError> {
        let Some(isbn) = hints.isbn.as_deref().map(clean_isbn).filter(|i| i.len() > 5) else {
            return Ok(LookupResult::miss());
        };

        let Some(info) = self.client.first_volume(&format!("isbn:{}", isbn)).await? else {
            return Ok(LookupResult::miss());
        };

        let Some(title) = info.title.filter(|t| !t.trim().is_empty()) else {
            return Ok(LookupResult::miss());
        };

        let full_title = match info.subtitle.filter(|s| !s.trim().is_empty()) {
            Some(subtitle) => format!("{}: {}", title, subtitle),
            None => title,
        };

        let cleaned = clean_title(&full_title);
        if cleaned.len() > 3 {
            Ok(LookupResult::hit(cleaned))
        } else {
            Ok(LookupResult::miss())
        }
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    items: Option<Vec<Volume>>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    industry_identifiers: Option<Vec<IndustryIdentifier>>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    id_type: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    extra_large: Option<String>,
    large: Option<String>,
    medium: Option<String>,
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hints_with_title(title: &str, author: &str) -> SearchHints {
        SearchHints {
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            ..Default::default()
        }
    }

    async fn client_for(server: &MockServer) -> Arc<GoogleBooksClient> {
        Arc::new(GoogleBooksClient::new(server.uri()).expect("client builds"))
    }

    #[tokio::test]
    async fn isbn_lookup_prefers_isbn13() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "volumeInfo": {
                        "title": "La colmena",
                        "industryIdentifiers": [
                            {"type": "ISBN_10", "identifier": "8437604944"},
                            {"type": "ISBN_13", "identifier": "978-84-376-0494-7"}
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let lookup = IsbnLookup::new(client_for(&server).await);
        let result = lookup
            .lookup(&hints_with_title("La colmena", "Camilo José Cela"))
            .await
            .expect("lookup succeeds");

        assert!(result.found);
        assert_eq!(result.value.as_deref(), Some("9788437604947"));
    }

    #[tokio::test]
    async fn empty_response_is_a_miss_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let lookup = IsbnLookup::new(client_for(&server).await);
        let result = lookup
            .lookup(&hints_with_title("Unknown", "Nobody"))
            .await
            .expect("miss is not an error");

        assert!(!result.found);
        assert!(result.value.is_none());
    }

    #[tokio::test]
    async fn http_429_surfaces_as_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let lookup = CoverLookup::new(client_for(&server).await);
        let err = lookup
            .lookup(&hints_with_title("Anything", "Anyone"))
            .await
            .expect_err("429 must be an error");

        assert!(matches!(err, LookupError::RateLimited));
    }

    #[tokio::test]
    async fn cover_lookup_prefers_largest_image_and_https() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "volumeInfo": {
                        "title": "El Quijote",
                        "imageLinks": {
                            "thumbnail": "http://books.example/thumb.jpg",
                            "large": "http://books.example/large.jpg"
                        }
                    }
                }]
            })))
            .mount(&server)
            .await;

        let lookup = CoverLookup::new(client_for(&server).await);
        let result = lookup
            .lookup(&hints_with_title("El Quijote", "Cervantes"))
            .await
            .expect("lookup succeeds");

        assert_eq!(
            result.value.as_deref(),
            Some("https://books.example/large.jpg")
        );
    }

    #[tokio::test]
    async fn title_lookup_joins_subtitle_and_cleans_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "volumeInfo": {
                        "title": "Poesía completa [Texto impreso]",
                        "subtitle": "edición crítica"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let lookup = TitleLookup::new(client_for(&server).await);
        let hints = SearchHints {
            isbn: Some("978-84-376-0494-7".to_string()),
            ..Default::default()
        };
        let result = lookup.lookup(&hints).await.expect("lookup succeeds");

        assert_eq!(
            result.value.as_deref(),
            Some("Poesía completa: edición crítica")
        );
    }

    #[tokio::test]
    async fn title_lookup_without_isbn_is_a_miss() {
        let server = MockServer::start().await;
        let lookup = TitleLookup::new(client_for(&server).await);
        let result = lookup
            .lookup(&SearchHints::default())
            .await
            .expect("no isbn means miss, no call issued");
        assert!(!result.found);
    }
}
