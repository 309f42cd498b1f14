use async_trait::async_trait;
use serde_json::Value;
use shelfscout_core::{Isbn, RawRecord, SourceKind};
use tracing::{debug, info};

use super::{BookSource, endpoint, non_empty};
use crate::error::Result;
use crate::http::RateLimitedClient;

const SEARCH_FIELDS: &str = "key,title,author_name,first_publish_year,isbn,language,publisher,number_of_pages_median,subject,cover_i";
const MAX_AUTHORS: usize = 2;
const MAX_SUBJECTS: usize = 5;

pub struct OpenLibrarySource {
    client: RateLimitedClient,
    base_url: String,
}

impl OpenLibrarySource {
    pub fn new(client: RateLimitedClient, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Look a single edition up through the Books API. `Ok(None)` when
    /// Open Library has no record for the ISBN.
    pub async fn fetch_by_isbn(&self, isbn: &Isbn) -> Result<Option<RawRecord>> {
        let mut url = endpoint(&self.base_url, &["api", "books"])?;
        let bibkey = format!("ISBN:{}", isbn.isbn13);
        url.query_pairs_mut()
            .append_pair("bibkeys", &bibkey)
            .append_pair("format", "json")
            .append_pair("jscmd", "data");

        let json: Value = self.client.get_json(url.as_str()).await?;
        let Some(edition) = json.get(&bibkey) else {
            debug!(isbn = %isbn.isbn13, "no Open Library edition");
            return Ok(None);
        };

        let mut record = parse_edition(edition, &self.base_url);
        if record.isbn.is_none() {
            record.isbn = Some(isbn.isbn13.clone());
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl BookSource for OpenLibrarySource {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenLibrary
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut url = endpoint(&self.base_url, &["search.json"])?;
        url.query_pairs_mut()
            .append_pair("q", query.trim())
            .append_pair("limit", &limit.to_string())
            .append_pair("fields", SEARCH_FIELDS);

        let json: Value = self.client.get_json(url.as_str()).await?;
        let mut records = parse_search_response(&json, &self.base_url);
        records.truncate(limit);

        info!(source = "openlibrary", query, count = records.len(), "search finished");
        Ok(records)
    }
}

/// Records from a `search.json` response body.
pub fn parse_search_response(json: &Value, base_url: &str) -> Vec<RawRecord> {
    json.get("docs")
        .and_then(Value::as_array)
        .map(|docs| docs.iter().filter_map(|doc| parse_doc(doc, base_url)).collect())
        .unwrap_or_default()
}

fn parse_doc(doc: &Value, base_url: &str) -> Option<RawRecord> {
    let title = doc.get("title").and_then(Value::as_str).and_then(non_empty)?;

    let mut record = RawRecord::new(SourceKind::OpenLibrary);
    record.title = Some(title);

    let authors = string_list(doc.get("author_name"));
    if !authors.is_empty() {
        record.author = Some(authors.into_iter().take(MAX_AUTHORS).collect::<Vec<_>>().join(", "));
    }

    record.year = doc
        .get("first_publish_year")
        .and_then(Value::as_i64)
        .map(|y| y.to_string());
    record.isbn = first_string(doc.get("isbn"));
    record.publisher = first_string(doc.get("publisher"));
    record.language = first_string(doc.get("language"));
    record.pages = doc
        .get("number_of_pages_median")
        .and_then(Value::as_i64)
        .map(|p| p.to_string());
    record.subjects = string_list(doc.get("subject"))
        .into_iter()
        .take(MAX_SUBJECTS)
        .collect();
    record.cover_url = doc
        .get("cover_i")
        .and_then(Value::as_i64)
        .map(cover_url);
    record.url = doc
        .get("key")
        .and_then(Value::as_str)
        .map(|key| format!("{base_url}{key}"));

    Some(record)
}

/// An edition object from `api/books?jscmd=data`.
fn parse_edition(v: &Value, base_url: &str) -> RawRecord {
    let mut record = RawRecord::new(SourceKind::OpenLibrary);
    record.title = v.get("title").and_then(Value::as_str).and_then(non_empty);

    let authors = named_list(v.get("authors"));
    if !authors.is_empty() {
        record.author = Some(authors.into_iter().take(MAX_AUTHORS).collect::<Vec<_>>().join(", "));
    }

    record.publisher = named_list(v.get("publishers")).into_iter().next();
    record.date = v.get("publish_date").and_then(Value::as_str).and_then(non_empty);
    record.pages = v
        .get("number_of_pages")
        .and_then(Value::as_i64)
        .map(|p| p.to_string());
    record.subjects = named_list(v.get("subjects"))
        .into_iter()
        .take(MAX_SUBJECTS)
        .collect();

    let identifiers = v.get("identifiers");
    record.isbn = first_string(identifiers.and_then(|ids| ids.get("isbn_13")))
        .or_else(|| first_string(identifiers.and_then(|ids| ids.get("isbn_10"))));

    record.cover_url = v
        .get("cover")
        .and_then(Value::as_object)
        .and_then(|cover| {
            cover
                .get("large")
                .or_else(|| cover.get("medium"))
                .or_else(|| cover.get("small"))
        })
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);

    record.url = v
        .get("url")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .or_else(|| {
            v.get("key")
                .and_then(Value::as_str)
                .map(|key| format!("{base_url}{key}"))
        });

    record
}

fn cover_url(id: i64) -> String {
    format!("https://covers.openlibrary.org/b/id/{id}-L.jpg")
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).filter_map(non_empty).collect())
        .unwrap_or_default()
}

fn first_string(value: Option<&Value>) -> Option<String> {
    string_list(value).into_iter().next()
}

/// `[{"name": ..}]` or plain string arrays.
fn named_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    item.get("name")
                        .and_then(Value::as_str)
                        .or_else(|| item.as_str())
                })
                .filter_map(non_empty)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn sample_search() -> Value {
        json!({
            "numFound": 2,
            "docs": [
                {
                    "key": "/works/OL1968368W",
                    "title": "Dune",
                    "author_name": ["Frank Herbert", "Brian Herbert", "Kevin J. Anderson"],
                    "first_publish_year": 1965,
                    "isbn": ["9780441172719", "0441172717"],
                    "language": ["eng", "spa"],
                    "publisher": ["Ace Books", "Chilton"],
                    "number_of_pages_median": 604,
                    "subject": ["Science fiction", "Deserts", "Ecology", "Politics", "Religion", "Spice"],
                    "cover_i": 11481354
                },
                { "key": "/works/OL2W", "author_name": ["No Title"] }
            ]
        })
    }

    #[test]
    fn parses_search_docs() {
        let records = parse_search_response(&sample_search(), "https://openlibrary.org");
        assert_eq!(records.len(), 1);

        let dune = &records[0];
        assert_eq!(dune.title.as_deref(), Some("Dune"));
        assert_eq!(dune.author.as_deref(), Some("Frank Herbert, Brian Herbert"));
        assert_eq!(dune.year.as_deref(), Some("1965"));
        assert_eq!(dune.isbn.as_deref(), Some("9780441172719"));
        assert_eq!(dune.publisher.as_deref(), Some("Ace Books"));
        assert_eq!(dune.language.as_deref(), Some("eng"));
        assert_eq!(dune.pages.as_deref(), Some("604"));
        assert_eq!(dune.subjects.len(), 5);
        assert_eq!(
            dune.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/11481354-L.jpg")
        );
        assert_eq!(dune.url.as_deref(), Some("https://openlibrary.org/works/OL1968368W"));
    }

    #[test]
    fn missing_docs_is_empty() {
        assert!(parse_search_response(&json!({"error": "bad"}), "https://openlibrary.org").is_empty());
    }

    #[tokio::test]
    async fn search_sends_query_and_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search.json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "dune".into()),
                Matcher::UrlEncoded("limit".into(), "3".into()),
                Matcher::UrlEncoded("fields".into(), SEARCH_FIELDS.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sample_search().to_string())
            .create_async()
            .await;

        let source = OpenLibrarySource::new(RateLimitedClient::new_for_tests(0), server.url());
        let records = source.search("dune", 3).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].url.as_deref(),
            Some(format!("{}/works/OL1968368W", server.url()).as_str())
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_by_isbn_maps_edition() {
        let mut server = Server::new_async().await;
        let body = json!({
            "ISBN:9780441172719": {
                "url": "https://openlibrary.org/books/OL7353617M/Dune",
                "title": "Dune",
                "authors": [{"name": "Frank Herbert", "url": "https://openlibrary.org/authors/OL79034A"}],
                "publishers": [{"name": "Ace Books"}],
                "publish_date": "August 1990",
                "number_of_pages": 535,
                "identifiers": {"isbn_10": ["0441172717"], "isbn_13": ["9780441172719"]},
                "subjects": [{"name": "Science fiction"}],
                "cover": {"medium": "https://covers.openlibrary.org/b/id/1-M.jpg"}
            }
        });
        let _m = server
            .mock("GET", "/api/books")
            .match_query(Matcher::UrlEncoded("bibkeys".into(), "ISBN:9780441172719".into()))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let source = OpenLibrarySource::new(RateLimitedClient::new_for_tests(0), server.url());
        let isbn = Isbn::parse("0441172717").unwrap();
        let record = source.fetch_by_isbn(&isbn).await.unwrap().unwrap();
        assert_eq!(record.title.as_deref(), Some("Dune"));
        assert_eq!(record.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(record.publisher.as_deref(), Some("Ace Books"));
        assert_eq!(record.date.as_deref(), Some("August 1990"));
        assert_eq!(record.pages.as_deref(), Some("535"));
        assert_eq!(record.isbn.as_deref(), Some("9780441172719"));
        assert_eq!(
            record.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/1-M.jpg")
        );
    }

    #[tokio::test]
    async fn fetch_by_isbn_not_found_is_none() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/books")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let source = OpenLibrarySource::new(RateLimitedClient::new_for_tests(0), server.url());
        let isbn = Isbn::parse("9780441172719").unwrap();
        assert!(source.fetch_by_isbn(&isbn).await.unwrap().is_none());
    }
}
