use async_trait::async_trait;
use serde_json::Value;
use shelfscout_core::{RawRecord, SourceKind};
use tracing::info;

use super::{BookSource, endpoint, non_empty, truncate_chars};
use crate::error::Result;
use crate::http::RateLimitedClient;

const FIELDS: &[&str] = &["identifier", "title", "creator", "date", "publisher", "description", "format"];
const DESCRIPTION_MAX: usize = 300;
const MAX_CREATORS: usize = 2;

/// Internet Archive advanced search over `mediatype:texts`.
pub struct InternetArchiveSource {
    client: RateLimitedClient,
    base_url: String,
}

impl InternetArchiveSource {
    pub fn new(client: RateLimitedClient, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BookSource for InternetArchiveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::InternetArchive
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut url = endpoint(&self.base_url, &["advancedsearch.php"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &format!("title:({}) AND mediatype:texts", query.trim()));
            for field in FIELDS {
                pairs.append_pair("fl[]", field);
            }
            pairs
                .append_pair("rows", &limit.to_string())
                .append_pair("page", "1")
                .append_pair("output", "json");
        }

        let json: Value = self.client.get_json(url.as_str()).await?;
        let mut records = parse_search_response(&json, &self.base_url);
        records.truncate(limit);

        info!(source = "internet_archive", query, count = records.len(), "search finished");
        Ok(records)
    }
}

/// Records from an `advancedsearch.php` JSON body.
pub fn parse_search_response(json: &Value, base_url: &str) -> Vec<RawRecord> {
    json.get("response")
        .and_then(|r| r.get("docs"))
        .and_then(Value::as_array)
        .map(|docs| docs.iter().filter_map(|doc| parse_doc(doc, base_url)).collect())
        .unwrap_or_default()
}

fn parse_doc(doc: &Value, base_url: &str) -> Option<RawRecord> {
    let identifier = doc.get("identifier").and_then(Value::as_str).and_then(non_empty)?;
    let title = text_values(doc.get("title")).into_iter().next()?;

    let mut record = RawRecord::new(SourceKind::InternetArchive);
    record.title = Some(title);

    let creators = text_values(doc.get("creator"));
    if !creators.is_empty() {
        record.author = Some(creators.into_iter().take(MAX_CREATORS).collect::<Vec<_>>().join(", "));
    }

    record.date = text_values(doc.get("date")).into_iter().next();
    record.publisher = text_values(doc.get("publisher")).into_iter().next();
    record.description = text_values(doc.get("description"))
        .into_iter()
        .next()
        .map(|d| truncate_chars(&d, DESCRIPTION_MAX));
    record.format = text_values(doc.get("format")).into_iter().find(|f| {
        let f = f.to_ascii_lowercase();
        f.contains("pdf") || f.contains("epub")
    });
    record.url = Some(format!("{base_url}/details/{identifier}"));
    record.download_url = Some(format!("{base_url}/download/{identifier}"));
    record.identifier = Some(identifier);

    Some(record)
}

/// Archive metadata fields come back as either a string or a list.
fn text_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => non_empty(s).into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(non_empty)
            .collect(),
        _ => Vec::new(),
    }
}
