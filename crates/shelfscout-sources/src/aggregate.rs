use std::time::Duration;

use shelfscout_core::{AppConfig, CanonicalBook, Deduplicator, Isbn, RawRecord, SourceKind, normalize_record};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Result, SourceError};
use crate::http::RateLimitedClient;
use crate::sources::{BookSource, OpenLibrarySource, build_sources};

/// Runs a query across the configured sources and turns the hits into
/// canonical, de-duplicated books.
pub struct Aggregator {
    sources: Vec<Box<dyn BookSource>>,
    isbn_lookup: Option<OpenLibrarySource>,
    deduplicator: Option<Deduplicator>,
    fetch_details: bool,
    source_delay: Duration,
}

impl Aggregator {
    pub fn new(sources: Vec<Box<dyn BookSource>>) -> Self {
        Self {
            sources,
            isbn_lookup: None,
            deduplicator: Some(Deduplicator::new()),
            fetch_details: false,
            source_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let deduplicator = config
            .sources
            .dedup
            .then(|| Deduplicator::new().with_threshold(config.sources.duplicate_threshold));
        let isbn_lookup = OpenLibrarySource::new(
            RateLimitedClient::from_config(config)?,
            config.sources.openlibrary_url.clone(),
        );

        Ok(Self {
            sources: build_sources(config)?,
            isbn_lookup: Some(isbn_lookup),
            deduplicator,
            fetch_details: config.sources.fetch_details,
            source_delay: config.scraping_delay(),
        })
    }

    pub fn with_source_delay(mut self, delay: Duration) -> Self {
        self.source_delay = delay;
        self
    }

    pub fn with_details(mut self, fetch_details: bool) -> Self {
        self.fetch_details = fetch_details;
        self
    }

    pub fn with_deduplicator(mut self, deduplicator: Option<Deduplicator>) -> Self {
        self.deduplicator = deduplicator;
        self
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// Search every source in turn. A failing source is logged and skipped,
    /// so the result may be partial but the call itself never fails.
    pub async fn search_all(&self, query: &str, limit_per_source: usize) -> Vec<CanonicalBook> {
        let mut books = Vec::new();

        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 && !self.source_delay.is_zero() {
                sleep(self.source_delay).await;
            }
            match self.run_source(source.as_ref(), query, limit_per_source).await {
                Ok(found) => books.extend(found),
                Err(e) => warn!(source = source.kind().as_str(), error = %e, "source search failed"),
            }
        }

        let books = self.finish(books);
        info!(query, total = books.len(), "search across sources finished");
        books
    }

    /// Search one enabled source. Unlike [`Self::search_all`], its failure
    /// is returned to the caller.
    pub async fn search_source(
        &self,
        kind: SourceKind,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalBook>> {
        let source = self
            .sources
            .iter()
            .find(|s| s.kind() == kind)
            .ok_or_else(|| SourceError::ApiError(kind.to_string(), "source is not enabled".into()))?;
        let books = self.run_source(source.as_ref(), query, limit).await?;
        Ok(self.finish(books))
    }

    /// Find a specific book by title and optional author.
    pub async fn search_book(
        &self,
        title: &str,
        author: Option<&str>,
        source: Option<SourceKind>,
        limit: usize,
    ) -> Result<Vec<CanonicalBook>> {
        let query = match author.map(str::trim).filter(|a| !a.is_empty()) {
            Some(author) => format!("{} {author}", title.trim()),
            None => title.trim().to_string(),
        };
        match source {
            Some(kind) => self.search_source(kind, &query, limit).await,
            None => Ok(self.search_all(&query, limit).await),
        }
    }

    /// Resolve an ISBN through Open Library. Fails on a malformed ISBN and
    /// returns `Ok(None)` when nothing is on record.
    pub async fn lookup_isbn(&self, isbn: &str) -> Result<Option<CanonicalBook>> {
        let isbn = Isbn::parse(isbn)?;
        let Some(lookup) = &self.isbn_lookup else {
            return Ok(None);
        };
        Ok(lookup.fetch_by_isbn(&isbn).await?.map(normalize_record))
    }

    async fn run_source(
        &self,
        source: &dyn BookSource,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalBook>> {
        let hits = source.search(query, limit).await?;
        let mut books = Vec::with_capacity(hits.len());

        for mut hit in hits {
            if self.fetch_details {
                self.merge_details(source, &mut hit).await;
            }
            let book = normalize_record(hit);
            if book.title.is_empty() {
                debug!(source = source.kind().as_str(), "dropping record without a title");
                continue;
            }
            books.push(book);
        }

        info!(source = source.kind().as_str(), query, count = books.len(), "source results");
        Ok(books)
    }

    async fn merge_details(&self, source: &dyn BookSource, hit: &mut RawRecord) {
        let Some(url) = hit.url.clone() else {
            return;
        };
        match source.details(&url).await {
            Ok(Some(details)) => hit.merge_details(details),
            Ok(None) => {}
            Err(e) => warn!(source = source.kind().as_str(), url = %url, error = %e, "details fetch failed"),
        }
    }

    fn finish(&self, books: Vec<CanonicalBook>) -> Vec<CanonicalBook> {
        match &self.deduplicator {
            Some(d) => d.dedup(books),
            None => books,
        }
    }
}
