use chrono::{DateTime, Utc};
use rslug::slugify;
use serde::{Deserialize, Serialize};

use super::SourceKind;

const TITLE_SLUG_MAX: usize = 50;
const AUTHOR_SLUG_MAX: usize = 30;

/// Normalized, source-agnostic book metadata.
///
/// Text fields are cleaned when the record is built (see
/// [`crate::normalize::normalize_record`]); `isbn` is either empty or has
/// ISBN-10/13 shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBook {
    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub isbn: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default)]
    pub publisher: String,

    #[serde(default)]
    pub language: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,

    #[serde(default)]
    pub file_format: String,

    #[serde(default)]
    pub file_size: String,

    #[serde(default)]
    pub file_hash: String,

    pub source: SourceKind,

    #[serde(default)]
    pub source_url: String,

    #[serde(default)]
    pub download_url: String,

    #[serde(default)]
    pub cover_url: String,

    #[serde(default)]
    pub mirrors: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub genre: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub local_file_path: String,

    #[serde(default)]
    pub local_cover_path: String,

    #[serde(default)]
    pub amazon_link: String,

    #[serde(default)]
    pub ebay_link: String,

    #[serde(default)]
    pub google_books_link: String,

    pub scraped_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalBook {
    pub fn new(title: impl Into<String>, source: SourceKind) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            author: String::new(),
            isbn: String::new(),
            year: None,
            publisher: String::new(),
            language: String::new(),
            pages: None,
            file_format: String::new(),
            file_size: String::new(),
            file_hash: String::new(),
            source,
            source_url: String::new(),
            download_url: String::new(),
            cover_url: String::new(),
            mirrors: Vec::new(),
            description: String::new(),
            genre: Vec::new(),
            tags: Vec::new(),
            local_file_path: String::new(),
            local_cover_path: String::new(),
            amazon_link: String::new(),
            ebay_link: String::new(),
            google_books_link: String::new(),
            scraped_at: now,
            updated_at: now,
        }
    }

    /// Title slug used in file names.
    pub fn clean_title(&self) -> String {
        slug(&self.title, TITLE_SLUG_MAX)
    }

    /// Author slug used in file names.
    pub fn clean_author(&self) -> String {
        slug(&self.author, AUTHOR_SLUG_MAX)
    }

    /// `<title-slug>-<author-slug>`, or just the title slug without an author.
    /// Shared by the JSON, HTML, book and cover outputs of one record.
    pub fn filename_base(&self) -> String {
        let title = self.clean_title();
        let title = if title.is_empty() { "untitled".to_string() } else { title };
        match self.clean_author() {
            author if author.is_empty() => title,
            author => format!("{title}-{author}"),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Slugify and cut to `max_len`, never leaving a trailing separator.
pub fn slug(input: &str, max_len: usize) -> String {
    let full = slugify!(input);
    let mut cut: String = full.chars().take(max_len).collect();
    while cut.ends_with('-') {
        cut.pop();
    }
    cut
}
