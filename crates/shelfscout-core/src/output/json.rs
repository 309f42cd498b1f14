use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::models::{CanonicalBook, SourceKind, slug};

const SEARCH_FILE_PREFIX: &str = "search_";

/// Everything one search produced, saved next to the per-book files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub total_results: usize,
    pub sources_used: Vec<SourceKind>,
    pub books: Vec<CanonicalBook>,
}

impl SearchResults {
    pub fn new(query: impl Into<String>, books: Vec<CanonicalBook>) -> Self {
        let mut sources_used: Vec<SourceKind> = Vec::new();
        for book in &books {
            if !sources_used.contains(&book.source) {
                sources_used.push(book.source);
            }
        }
        Self {
            query: query.into(),
            timestamp: Utc::now().timestamp(),
            total_results: books.len(),
            sources_used,
            books,
        }
    }

    pub fn file_name(&self) -> String {
        let query = slug(&self.query, 60);
        let query = if query.is_empty() { "all".to_string() } else { query };
        format!("{SEARCH_FILE_PREFIX}{query}_{}.json", self.timestamp)
    }
}

/// Save a book as `{metadata_dir}/{filename_base}.json`.
pub fn save_book_json(metadata_dir: &Path, book: &CanonicalBook) -> Result<PathBuf> {
    fs::create_dir_all(metadata_dir)?;
    let path = metadata_dir.join(format!("{}.json", book.filename_base()));
    let json = serde_json::to_string_pretty(book)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Load a single book from a JSON file.
pub fn load_book_json(path: &Path) -> Result<CanonicalBook> {
    let contents = fs::read_to_string(path)?;
    let book: CanonicalBook = serde_json::from_str(&contents)?;
    Ok(book)
}

/// Every per-book JSON file in the metadata directory. Search envelopes
/// and unreadable files are skipped.
pub fn list_book_json(metadata_dir: &Path) -> Result<Vec<CanonicalBook>> {
    if !metadata_dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(metadata_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter(|path| {
            !path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(SEARCH_FILE_PREFIX))
        })
        .collect();
    paths.sort();

    let mut books = Vec::with_capacity(paths.len());
    for path in paths {
        match load_book_json(&path) {
            Ok(book) => books.push(book),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid book file"),
        }
    }
    Ok(books)
}

/// Save the search envelope as `{metadata_dir}/search_{query}_{timestamp}.json`.
pub fn save_search_results(metadata_dir: &Path, results: &SearchResults) -> Result<PathBuf> {
    fs::create_dir_all(metadata_dir)?;
    let path = metadata_dir.join(results.file_name());
    fs::write(&path, serde_json::to_string_pretty(results)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(title: &str, source: SourceKind) -> CanonicalBook {
        let mut book = CanonicalBook::new(title, source);
        book.author = "Frank Herbert".into();
        book.year = Some(1965);
        book
    }

    #[test]
    fn save_and_load_book() {
        let dir = TempDir::new().unwrap();
        let book = sample("Dune", SourceKind::LibGen);

        let path = save_book_json(dir.path(), &book).unwrap();
        assert!(path.ends_with("dune-frank-herbert.json"));
        assert_eq!(load_book_json(&path).unwrap(), book);
    }

    #[test]
    fn list_skips_search_envelopes_and_garbage() {
        let dir = TempDir::new().unwrap();
        save_book_json(dir.path(), &sample("Dune", SourceKind::LibGen)).unwrap();
        save_book_json(dir.path(), &sample("Dune Messiah", SourceKind::OpenLibrary)).unwrap();
        let results = SearchResults::new("dune", vec![sample("Dune", SourceKind::LibGen)]);
        save_search_results(dir.path(), &results).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let books = list_book_json(dir.path()).unwrap();
        assert_eq!(books.len(), 2);
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_book_json(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn search_envelope_records_sources_in_order() {
        let books = vec![
            sample("Dune", SourceKind::OpenLibrary),
            sample("Dune Messiah", SourceKind::LibGen),
            sample("Children of Dune", SourceKind::OpenLibrary),
        ];
        let results = SearchResults::new("frank herbert", books);
        assert_eq!(results.total_results, 3);
        assert_eq!(
            results.sources_used,
            vec![SourceKind::OpenLibrary, SourceKind::LibGen]
        );

        let dir = TempDir::new().unwrap();
        let path = save_search_results(dir.path(), &results).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(name, format!("search_frank-herbert_{}.json", results.timestamp));

        let parsed: SearchResults =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, results);
    }
}
