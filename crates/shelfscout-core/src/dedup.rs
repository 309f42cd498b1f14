use std::collections::HashSet;

use tracing::info;

use crate::models::{CanonicalBook, RawRecord};

/// Word overlap above which two titles are treated as the same book.
pub const DUPLICATE_THRESHOLD: f64 = 0.7;

/// Anything that can be compared by title.
pub trait Titled {
    fn title(&self) -> &str;
}

impl Titled for CanonicalBook {
    fn title(&self) -> &str {
        &self.title
    }
}

impl Titled for RawRecord {
    fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}

/// Drops later records whose title overlaps an earlier one.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self {
            threshold: DUPLICATE_THRESHOLD,
        }
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether two titles count as duplicates under this threshold.
    pub fn is_duplicate(&self, a: &str, b: &str) -> bool {
        word_overlap(&normalized_title_words(a), &normalized_title_words(b)) > self.threshold
    }

    /// Keep first-seen records, in order. Quadratic in the number of kept
    /// records, which stays small for a single search.
    pub fn dedup<T: Titled>(&self, records: Vec<T>) -> Vec<T> {
        let before = records.len();
        let mut kept: Vec<T> = Vec::with_capacity(before);
        let mut kept_words: Vec<HashSet<String>> = Vec::with_capacity(before);

        for record in records {
            let words = normalized_title_words(record.title());
            let duplicate = kept_words
                .iter()
                .any(|seen| word_overlap(&words, seen) > self.threshold);
            if !duplicate {
                kept_words.push(words);
                kept.push(record);
            }
        }

        let removed = before - kept.len();
        if removed > 0 {
            info!(removed, kept = kept.len(), "removed duplicate records");
        }
        kept
    }
}

/// Lower-cased title words with punctuation dropped.
pub fn normalized_title_words(title: &str) -> HashSet<String> {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Jaccard index of two word sets; two empty sets score 0.
pub fn word_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn book(title: &str, source: SourceKind) -> CanonicalBook {
        CanonicalBook::new(title, source)
    }

    #[test]
    fn punctuation_variants_collapse() {
        let books = vec![
            book("Clean Code: A Handbook", SourceKind::LibGen),
            book("Clean Code A Handbook", SourceKind::OpenLibrary),
        ];
        let kept = Deduplicator::new().dedup(books);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source, SourceKind::LibGen);
    }

    #[test]
    fn different_titles_stay_distinct() {
        let books = vec![
            book("Clean Code", SourceKind::LibGen),
            book("Introduction to Algorithms", SourceKind::GoogleBooks),
        ];
        assert_eq!(Deduplicator::new().dedup(books).len(), 2);
    }

    #[test]
    fn keeps_first_seen_order() {
        let books = vec![
            book("Dune", SourceKind::AnnasArchive),
            book("The Hobbit", SourceKind::LibGen),
            book("dune", SourceKind::InternetArchive),
            book("Neuromancer", SourceKind::OpenLibrary),
        ];
        let titles: Vec<String> = Deduplicator::new()
            .dedup(books)
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["Dune", "The Hobbit", "Neuromancer"]);
    }

    #[test]
    fn threshold_is_strict() {
        // 7 shared of 10 distinct words is exactly 0.7
        let a = "a b c d e f g h";
        let b = "a b c d e f g i j";
        let overlap = word_overlap(&normalized_title_words(a), &normalized_title_words(b));
        assert!((overlap - 0.7).abs() < 1e-9);
        assert!(!Deduplicator::new().is_duplicate(a, b));
        assert!(Deduplicator::new().with_threshold(0.6).is_duplicate(a, b));
    }

    #[test]
    fn empty_titles_never_match() {
        assert_eq!(word_overlap(&HashSet::new(), &HashSet::new()), 0.0);
        let books = vec![book("", SourceKind::LibGen), book("", SourceKind::LibGen)];
        assert_eq!(Deduplicator::new().dedup(books).len(), 2);
    }

    #[test]
    fn works_on_raw_records() {
        let mut first = RawRecord::new(SourceKind::LibGen);
        first.title = Some("The Rust Programming Language".into());
        let mut second = RawRecord::new(SourceKind::AnnasArchive);
        second.title = Some("The Rust Programming Language!".into());
        assert_eq!(Deduplicator::new().dedup(vec![first, second]).len(), 1);
    }
}
