use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Selector};
use shelfscout_core::{AppConfig, RawRecord, SourceKind};

use crate::error::{Result, SourceError};
use crate::http::RateLimitedClient;

pub mod annas_archive;
pub mod google_books;
pub mod internet_archive;
pub mod libgen;
pub mod mirrors;
pub mod openlibrary;

pub use annas_archive::AnnasArchiveSource;
pub use google_books::GoogleBooksSource;
pub use internet_archive::InternetArchiveSource;
pub use libgen::LibGenSource;
pub use mirrors::MirrorSet;
pub use openlibrary::OpenLibrarySource;

/// One searchable book site.
#[async_trait]
pub trait BookSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Up to `limit` raw hits for a free-text query.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>>;

    /// Extra fields from a result's detail page, for sources that have one.
    async fn details(&self, _url: &str) -> Result<Option<RawRecord>> {
        Ok(None)
    }
}

/// Build the adapter for one source from configuration.
pub fn build_source(kind: SourceKind, config: &AppConfig) -> Result<Box<dyn BookSource>> {
    let client = RateLimitedClient::from_config(config)?;
    let sources = &config.sources;
    Ok(match kind {
        SourceKind::AnnasArchive => Box::new(AnnasArchiveSource::new(
            client,
            MirrorSet::new(SourceKind::AnnasArchive, sources.annas_archive_mirrors.clone()),
        )),
        SourceKind::LibGen => Box::new(LibGenSource::new(
            client,
            MirrorSet::new(SourceKind::LibGen, sources.libgen_mirrors.clone()),
        )),
        SourceKind::OpenLibrary => {
            Box::new(OpenLibrarySource::new(client, sources.openlibrary_url.clone()))
        }
        SourceKind::GoogleBooks => Box::new(GoogleBooksSource::new(
            client,
            sources.google_books_url.clone(),
            sources.google_books_api_key.clone(),
        )),
        SourceKind::InternetArchive => Box::new(InternetArchiveSource::new(
            client,
            sources.internet_archive_url.clone(),
        )),
    })
}

/// Adapters for every enabled source, in configured order.
pub fn build_sources(config: &AppConfig) -> Result<Vec<Box<dyn BookSource>>> {
    config
        .sources
        .enabled
        .iter()
        .map(|kind| build_source(*kind, config))
        .collect()
}

// ─── Shared parsing helpers ───────────────────────────────────────────────────

pub(crate) fn parse_selector(input: &str) -> Result<Selector> {
    Selector::parse(input)
        .map_err(|e| SourceError::Parse(format!("invalid selector {input}: {e}")))
}

pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| SourceError::Parse(format!("invalid URL {base_url}: {e}")))
}

/// Append path segments to a base URL, keeping any path it already has.
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = parse_base_url(base_url.trim_end_matches('/'))?;
    url.path_segments_mut()
        .map_err(|_| SourceError::Parse(format!("invalid base URL {base_url}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Resolve a possibly relative link against a site root.
pub(crate) fn absolute_url(href: &str, base: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") || href.starts_with("magnet:") {
        return Some(href.to_string());
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    parse_base_url(base)
        .ok()
        .and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_segments() {
        let url = endpoint("https://openlibrary.org", &["search.json"]).unwrap();
        assert_eq!(url.as_str(), "https://openlibrary.org/search.json");

        let url = endpoint("https://www.googleapis.com/books/v1/", &["volumes"]).unwrap();
        assert_eq!(url.as_str(), "https://www.googleapis.com/books/v1/volumes");
    }

    #[test]
    fn absolute_url_resolves_relative_links() {
        let base = "https://annas-archive.org";
        assert_eq!(
            absolute_url("/md5/abc", base).as_deref(),
            Some("https://annas-archive.org/md5/abc")
        );
        assert_eq!(
            absolute_url("//libgen.li/ads.php", base).as_deref(),
            Some("https://libgen.li/ads.php")
        );
        assert_eq!(
            absolute_url("get.php?md5=1", "https://libgen.rs/search.php").as_deref(),
            Some("https://libgen.rs/get.php?md5=1")
        );
        assert_eq!(absolute_url("javascript:void(0)", base), None);
    }

    #[test]
    fn build_sources_follows_enabled_order() {
        let mut config = AppConfig::default();
        config.sources.enabled = vec![SourceKind::GoogleBooks, SourceKind::LibGen];
        let kinds: Vec<SourceKind> = build_sources(&config)
            .unwrap()
            .iter()
            .map(|s| s.kind())
            .collect();
        assert_eq!(kinds, vec![SourceKind::GoogleBooks, SourceKind::LibGen]);
    }
}
