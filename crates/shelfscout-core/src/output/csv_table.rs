use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::models::CanonicalBook;

const LIST_SEPARATOR: &str = "; ";

/// One flattened CSV row. List fields are joined with `"; "`.
#[derive(Debug, Clone, Serialize)]
pub struct CsvRow<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub isbn: &'a str,
    pub year: Option<i32>,
    pub publisher: &'a str,
    pub language: &'a str,
    pub pages: Option<u32>,
    pub file_format: &'a str,
    pub file_size: &'a str,
    pub file_hash: &'a str,
    pub source: &'static str,
    pub source_url: &'a str,
    pub download_url: &'a str,
    pub cover_url: &'a str,
    pub mirrors: String,
    pub description: &'a str,
    pub genre: String,
    pub tags: String,
    pub local_file_path: &'a str,
    pub local_cover_path: &'a str,
    pub amazon_link: &'a str,
    pub ebay_link: &'a str,
    pub google_books_link: &'a str,
    pub scraped_at: String,
    pub updated_at: String,
}

impl<'a> From<&'a CanonicalBook> for CsvRow<'a> {
    fn from(book: &'a CanonicalBook) -> Self {
        Self {
            title: &book.title,
            author: &book.author,
            isbn: &book.isbn,
            year: book.year,
            publisher: &book.publisher,
            language: &book.language,
            pages: book.pages,
            file_format: &book.file_format,
            file_size: &book.file_size,
            file_hash: &book.file_hash,
            source: book.source.as_str(),
            source_url: &book.source_url,
            download_url: &book.download_url,
            cover_url: &book.cover_url,
            mirrors: book.mirrors.join(LIST_SEPARATOR),
            description: &book.description,
            genre: book.genre.join(LIST_SEPARATOR),
            tags: book.tags.join(LIST_SEPARATOR),
            local_file_path: &book.local_file_path,
            local_cover_path: &book.local_cover_path,
            amazon_link: &book.amazon_link,
            ebay_link: &book.ebay_link,
            google_books_link: &book.google_books_link,
            scraped_at: book.scraped_at.to_rfc3339(),
            updated_at: book.updated_at.to_rfc3339(),
        }
    }
}

/// Write `{metadata_dir}/{file_name}` with a header row. An empty list
/// writes nothing, but the target path is still returned.
pub fn save_books_csv(
    metadata_dir: &Path,
    books: &[CanonicalBook],
    file_name: &str,
) -> Result<PathBuf> {
    let path = metadata_dir.join(file_name);
    if books.is_empty() {
        return Ok(path);
    }

    std::fs::create_dir_all(metadata_dir)?;
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(&path)?;
    for book in books {
        wtr.serialize(CsvRow::from(book))?;
    }
    wtr.flush()?;
    Ok(path)
}
