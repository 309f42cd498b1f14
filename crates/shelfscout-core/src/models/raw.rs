use serde::{Deserialize, Serialize};

use super::SourceKind;

/// A search hit as an adapter scraped it, before any cleaning.
///
/// Every field is optional text; adapters render numbers (years, page
/// counts) to strings so normalization sees one shape regardless of source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    #[serde(default)]
    pub mirrors: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl RawRecord {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            title: None,
            author: None,
            year: None,
            date: None,
            isbn: None,
            identifier: None,
            publisher: None,
            language: None,
            pages: None,
            format: None,
            filesize: None,
            description: None,
            url: None,
            download_url: None,
            cover_url: None,
            mirrors: Vec::new(),
            subjects: Vec::new(),
        }
    }

    /// Overlay the non-empty values of a detail-page record onto this one.
    /// Blank detail values never erase what the listing already had.
    pub fn merge_details(&mut self, details: RawRecord) {
        fn take(target: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *target = Some(v);
            }
        }

        take(&mut self.title, details.title);
        take(&mut self.author, details.author);
        take(&mut self.year, details.year);
        take(&mut self.date, details.date);
        take(&mut self.isbn, details.isbn);
        take(&mut self.identifier, details.identifier);
        take(&mut self.publisher, details.publisher);
        take(&mut self.language, details.language);
        take(&mut self.pages, details.pages);
        take(&mut self.format, details.format);
        take(&mut self.filesize, details.filesize);
        take(&mut self.description, details.description);
        take(&mut self.url, details.url);
        take(&mut self.download_url, details.download_url);
        take(&mut self.cover_url, details.cover_url);
        if !details.mirrors.is_empty() {
            self.mirrors = details.mirrors;
        }
        if !details.subjects.is_empty() {
            self.subjects = details.subjects;
        }
    }
}
