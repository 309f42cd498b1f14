use async_trait::async_trait;
use serde_json::Value;
use shelfscout_core::{RawRecord, SourceKind};
use tracing::info;

use super::{BookSource, endpoint, non_empty, truncate_chars};
use crate::error::Result;
use crate::http::RateLimitedClient;

const MAX_RESULTS: usize = 40;
const DESCRIPTION_MAX: usize = 500;
const MAX_CATEGORIES: usize = 3;

/// Google Books volumes API. Works without a key at a lower quota.
pub struct GoogleBooksSource {
    client: RateLimitedClient,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksSource {
    pub fn new(client: RateLimitedClient, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[async_trait]
impl BookSource for GoogleBooksSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GoogleBooks
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut url = endpoint(&self.base_url, &["volumes"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query.trim())
                .append_pair("maxResults", &limit.min(MAX_RESULTS).to_string())
                .append_pair("printType", "books");
            if let Some(key) = &self.api_key {
                pairs.append_pair("key", key);
            }
        }

        let json: Value = self.client.get_json(url.as_str()).await?;
        let mut records = parse_volumes(&json);
        records.truncate(limit);

        info!(source = "google_books", query, count = records.len(), "search finished");
        Ok(records)
    }
}

/// Records from a `volumes` response body.
pub fn parse_volumes(json: &Value) -> Vec<RawRecord> {
    json.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("volumeInfo"))
                .filter_map(parse_volume_info)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_volume_info(info: &Value) -> Option<RawRecord> {
    let title = str_field(info, "title")?;

    let mut record = RawRecord::new(SourceKind::GoogleBooks);
    record.title = Some(title);

    let authors = strings(info.get("authors"));
    if !authors.is_empty() {
        record.author = Some(authors.join(", "));
    }

    record.publisher = str_field(info, "publisher");
    record.date = str_field(info, "publishedDate");
    record.year = record
        .date
        .as_deref()
        .and_then(|d| d.get(..4))
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .map(ToOwned::to_owned);
    record.language = str_field(info, "language");
    record.pages = info
        .get("pageCount")
        .and_then(Value::as_i64)
        .filter(|p| *p > 0)
        .map(|p| p.to_string());
    record.description = str_field(info, "description").map(|d| truncate_chars(&d, DESCRIPTION_MAX));
    record.subjects = strings(info.get("categories"))
        .into_iter()
        .take(MAX_CATEGORIES)
        .collect();
    record.isbn = industry_identifier(info, "ISBN_13").or_else(|| industry_identifier(info, "ISBN_10"));
    record.url = str_field(info, "infoLink");
    record.cover_url = info
        .get("imageLinks")
        .and_then(|links| links.get("thumbnail"))
        .and_then(Value::as_str)
        .and_then(non_empty);

    Some(record)
}

fn industry_identifier(info: &Value, kind: &str) -> Option<String> {
    info.get("industryIdentifiers")
        .and_then(Value::as_array)?
        .iter()
        .find(|id| id.get("type").and_then(Value::as_str) == Some(kind))
        .and_then(|id| id.get("identifier"))
        .and_then(Value::as_str)
        .and_then(non_empty)
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).filter_map(non_empty).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "totalItems": 2,
            "items": [
                {
                    "volumeInfo": {
                        "title": "The Pragmatic Programmer",
                        "authors": ["Andrew Hunt", "David Thomas"],
                        "publisher": "Addison-Wesley",
                        "publishedDate": "1999-10-20",
                        "description": "x".repeat(800),
                        "industryIdentifiers": [
                            {"type": "ISBN_10", "identifier": "020161622X"},
                            {"type": "ISBN_13", "identifier": "9780201616224"}
                        ],
                        "pageCount": 321,
                        "categories": ["Computers", "Programming", "Software", "Craft"],
                        "imageLinks": {"thumbnail": "http://books.google.com/books/content?id=1"},
                        "language": "en",
                        "infoLink": "https://books.google.com/books?id=1"
                    }
                },
                { "volumeInfo": { "authors": ["Untitled"] } }
            ]
        })
    }

    #[test]
    fn parses_volume_info() {
        let records = parse_volumes(&sample());
        assert_eq!(records.len(), 1);

        let book = &records[0];
        assert_eq!(book.title.as_deref(), Some("The Pragmatic Programmer"));
        assert_eq!(book.author.as_deref(), Some("Andrew Hunt, David Thomas"));
        assert_eq!(book.isbn.as_deref(), Some("9780201616224"));
        assert_eq!(book.year.as_deref(), Some("1999"));
        assert_eq!(book.date.as_deref(), Some("1999-10-20"));
        assert_eq!(book.pages.as_deref(), Some("321"));
        assert_eq!(book.description.as_ref().map(|d| d.chars().count()), Some(500));
        assert_eq!(book.subjects, vec!["Computers", "Programming", "Software"]);
        assert_eq!(book.url.as_deref(), Some("https://books.google.com/books?id=1"));
        assert!(book.cover_url.is_some());
    }

    #[test]
    fn falls_back_to_isbn_10() {
        let json = json!({"items": [{"volumeInfo": {
            "title": "Old Book",
            "industryIdentifiers": [{"type": "ISBN_10", "identifier": "0441172717"}]
        }}]});
        let records = parse_volumes(&json);
        assert_eq!(records[0].isbn.as_deref(), Some("0441172717"));
        assert_eq!(records[0].year, None);
    }

    #[test]
    fn empty_response_has_no_items() {
        assert!(parse_volumes(&json!({"kind": "books#volumes", "totalItems": 0})).is_empty());
    }

    #[tokio::test]
    async fn search_caps_max_results_and_sends_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/volumes")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "pragmatic".into()),
                Matcher::UrlEncoded("maxResults".into(), "40".into()),
                Matcher::UrlEncoded("printType".into(), "books".into()),
                Matcher::UrlEncoded("key".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_body(sample().to_string())
            .create_async()
            .await;

        let source = GoogleBooksSource::new(
            RateLimitedClient::new_for_tests(0),
            server.url(),
            Some("secret".into()),
        );
        let records = source.search("pragmatic", 100).await.unwrap();
        assert_eq!(records.len(), 1);
        mock.assert_async().await;
    }
}
