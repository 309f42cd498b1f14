//! Text cleanup and regex field extraction applied to every [`RawRecord`].

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{CanonicalBook, RawRecord};

/// Inclusive bounds for a plausible publication year.
pub const MIN_YEAR: i32 = 1500;
pub const MAX_YEAR: i32 = 2030;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static DISALLOWED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s\-.,;:!?()\[\]{}]").expect("valid regex"));
static ISBN13_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:978|979)\d{10}").expect("valid regex"));
static ISBN10_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{9}[\dXx]").expect("valid regex"));
static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(1[5-9]\d{2}|20[0-3]\d)\b").expect("valid regex"));
static FILE_SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(TB|GB|MB|KB|B)").expect("valid regex"));
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Collapse whitespace, strip markup and drop anything that is not a word
/// character, whitespace or common punctuation.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = collapse_whitespace(text);
    let text = TAG_RE.replace_all(&text, "");
    let text = DISALLOWED_RE.replace_all(&text, "");
    collapse_whitespace(&text)
}

/// Pull the first ISBN-13 (978/979 prefix) or, failing that, ISBN-10 out of
/// free text. Returns digits only, or an empty string.
pub fn extract_isbn(text: &str) -> String {
    let compact: String = text.chars().filter(|c| *c != '-' && *c != ' ').collect();

    if let Some(m) = ISBN13_RE.find(&compact) {
        return m.as_str().to_string();
    }
    if let Some(m) = ISBN10_RE.find(&compact) {
        return m.as_str().to_uppercase();
    }
    String::new()
}

/// Latest year in `[MIN_YEAR, MAX_YEAR]` mentioned in the text.
pub fn extract_year(text: &str) -> Option<i32> {
    YEAR_RE
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<i32>().ok())
        .filter(|year| (MIN_YEAR..=MAX_YEAR).contains(year))
        .max()
}

/// First size mention rendered as `"<n> <UNIT>"`, e.g. `"2.5 MB"`.
pub fn extract_file_size(text: &str) -> String {
    FILE_SIZE_RE
        .captures(text)
        .map(|caps| format!("{} {}", &caps[1], caps[2].to_uppercase()))
        .unwrap_or_default()
}

/// First run of digits as a number; `"350 p."` gives `Some(350)`.
pub fn safe_int(text: &str) -> Option<u32> {
    DIGITS_RE.find(text).and_then(|m| m.as_str().parse().ok())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Convert a scraped record into its canonical form.
pub fn normalize_record(raw: RawRecord) -> CanonicalBook {
    let title = clean_text(raw.title.as_deref().unwrap_or_default());

    let isbn = non_blank(&raw.isbn)
        .or_else(|| non_blank(&raw.identifier))
        .map(extract_isbn)
        .unwrap_or_default();

    let year_text = non_blank(&raw.year)
        .or_else(|| non_blank(&raw.date))
        .unwrap_or(title.as_str());
    let year = extract_year(year_text);

    let now = Utc::now();
    let mut book = CanonicalBook::new(title.clone(), raw.source);
    book.author = clean_text(raw.author.as_deref().unwrap_or_default());
    book.isbn = isbn;
    book.year = year;
    book.publisher = clean_text(raw.publisher.as_deref().unwrap_or_default());
    book.language = raw.language.unwrap_or_default().trim().to_string();
    book.pages = raw.pages.as_deref().and_then(safe_int);
    book.file_format = raw.format.unwrap_or_default().trim().to_uppercase();
    book.file_size = extract_file_size(raw.filesize.as_deref().unwrap_or_default());
    book.description = clean_text(raw.description.as_deref().unwrap_or_default());
    book.source_url = raw.url.unwrap_or_default();
    book.download_url = raw.download_url.unwrap_or_default();
    book.cover_url = raw.cover_url.unwrap_or_default();
    book.mirrors = raw.mirrors;
    book.genre = raw.subjects;
    book.scraped_at = now;
    book.updated_at = now;
    book
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::is_valid_isbn_shape;
    use crate::models::SourceKind;

    #[test]
    fn clean_text_strips_tags_and_collapses_whitespace() {
        assert_eq!(clean_text("<b>Hi</b>  there"), "Hi there");
        assert_eq!(clean_text("  a\n\tb  "), "a b");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn clean_text_drops_unusual_symbols() {
        assert_eq!(clean_text("C++ & Rust #1 (2nd ed.)"), "C Rust 1 (2nd ed.)");
        assert_eq!(clean_text("Café: über"), "Café: über");
    }

    #[test]
    fn extract_isbn_prefers_isbn13() {
        assert_eq!(extract_isbn("ISBN 978-0-13-235088-4"), "9780132350884");
        assert_eq!(extract_isbn("isbn: 0-13-235088-x"), "013235088X");
        assert_eq!(extract_isbn("no number here"), "");
    }

    #[test]
    fn extract_isbn_is_idempotent_on_clean_isbn13() {
        let once = extract_isbn("9780262033848");
        assert_eq!(once, "9780262033848");
        assert_eq!(extract_isbn(&once), once);
    }

    #[test]
    fn extract_year_returns_latest_in_range() {
        assert_eq!(extract_year("first 2019 then 1999 reprint"), Some(2019));
        assert_eq!(extract_year("printed 1499"), None);
        assert_eq!(extract_year("due 2031"), None);
        assert_eq!(extract_year("1500 and 2030"), Some(2030));
        assert_eq!(extract_year("2035 or 1984"), Some(1984));
        assert_eq!(extract_year(""), None);
    }

    #[test]
    fn extract_file_size_normalizes_unit() {
        assert_eq!(extract_file_size("Size: 2.5 mb"), "2.5 MB");
        assert_eq!(extract_file_size("700KB"), "700 KB");
        assert_eq!(extract_file_size("pdf, 1 GB, english"), "1 GB");
        assert_eq!(extract_file_size("unknown"), "");
    }

    #[test]
    fn safe_int_takes_first_number() {
        assert_eq!(safe_int("350 p."), Some(350));
        assert_eq!(safe_int("xii, 464"), Some(464));
        assert_eq!(safe_int("n/a"), None);
    }

    #[test]
    fn normalize_record_builds_canonical_book() {
        let mut raw = RawRecord::new(SourceKind::LibGen);
        raw.title = Some("  Clean   Code <i>(2008)</i> ".into());
        raw.author = Some("Robert C. Martin".into());
        raw.identifier = Some("ISBN 978-0-13-235088-4".into());
        raw.pages = Some("464 pages".into());
        raw.format = Some("pdf".into());
        raw.filesize = Some("3 mb".into());
        raw.url = Some("https://libgen.is/book/index.php?md5=1".into());
        raw.subjects = vec!["Programming".into()];

        let book = normalize_record(raw);
        assert_eq!(book.title, "Clean Code (2008)");
        assert_eq!(book.isbn, "9780132350884");
        assert!(is_valid_isbn_shape(&book.isbn));
        // no year/date field, so the title is searched
        assert_eq!(book.year, Some(2008));
        assert_eq!(book.pages, Some(464));
        assert_eq!(book.file_format, "PDF");
        assert_eq!(book.file_size, "3 MB");
        assert_eq!(book.genre, vec!["Programming".to_string()]);
        assert_eq!(book.source, SourceKind::LibGen);
    }

    #[test]
    fn normalize_record_year_field_wins_over_date() {
        let mut raw = RawRecord::new(SourceKind::InternetArchive);
        raw.title = Some("Moby Dick".into());
        raw.year = Some("1851".into());
        raw.date = Some("1992-01-01".into());
        assert_eq!(normalize_record(raw).year, Some(1851));
    }
}
