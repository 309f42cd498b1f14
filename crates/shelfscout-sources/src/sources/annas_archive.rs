use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use shelfscout_core::{Isbn, RawRecord, SourceKind};
use tracing::{debug, info};

use super::{
    BookSource, MirrorSet, absolute_url, element_text, non_empty, parse_base_url, parse_selector,
};
use crate::error::{Result, SourceError};
use crate::http::RateLimitedClient;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));
static FORMAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(pdf|epub|djvu|mobi|azw3|fb2|txt|cbr|cbz)\b").expect("valid regex"));
static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(kb|mb|gb)\b").expect("valid regex"));
static LANG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(en|ru|de|fr|es|it|pt|pl|uk|ja|ko|zh|english|russian|german|french|spanish|italian|portuguese|polish|ukrainian|japanese|korean|chinese)\b")
        .expect("valid regex")
});
static ISBN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:isbn(?:-1[03])?:?\s*)?([0-9X][0-9X\-\s]{8,20}[0-9X])\b")
        .expect("valid regex")
});

/// Anna's Archive: HTML search results plus per-file detail pages.
pub struct AnnasArchiveSource {
    client: RateLimitedClient,
    mirrors: MirrorSet,
}

impl AnnasArchiveSource {
    pub fn new(client: RateLimitedClient, mirrors: MirrorSet) -> Self {
        Self { client, mirrors }
    }

    fn build_search_path(query: &str) -> Result<String> {
        let mut url = parse_base_url("https://annas-archive.org/search")?;
        url.query_pairs_mut().append_pair("q", query.trim());
        Ok(match url.query() {
            Some(q) => format!("/search?{q}"),
            None => "/search".to_string(),
        })
    }
}

#[async_trait]
impl BookSource for AnnasArchiveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::AnnasArchive
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let path = Self::build_search_path(query)?;
        let (html, mirror) = self.mirrors.fetch(&self.client, &path).await?;
        let mut records = parse_search_html(&html, &mirror)?;
        records.truncate(limit);

        info!(source = "annas-archive", query, count = records.len(), "search finished");
        Ok(records)
    }

    async fn details(&self, url: &str) -> Result<Option<RawRecord>> {
        let html = self.client.get(url).await?;
        parse_details_html(&html, url).map(Some)
    }
}

/// Result cards from a search page. Cards without a title are skipped and
/// repeated files (same md5 link) are kept once.
pub fn parse_search_html(html: &str, base: &str) -> Result<Vec<RawRecord>> {
    let card_selector = parse_selector(
        "div.js-scroll-hidden, div[class*='h-[125px]'], div.search-result, article",
    )?;
    let heading_selector = parse_selector("h3")?;
    let md5_link_selector = parse_selector("a[href*='/md5/']")?;
    let meta_selector = parse_selector("div.text-sm, div.metadata, span.metadata")?;
    let image_selector = parse_selector("img[src]")?;

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for card in document.select(&card_selector) {
        let md5_link = card.select(&md5_link_selector).next();
        let title = card
            .select(&heading_selector)
            .next()
            .or(md5_link)
            .map(|el| element_text(&el))
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let url = md5_link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| absolute_url(href, base));
        let dedup_key = url.clone().unwrap_or_else(|| title.to_lowercase());
        if !seen.insert(dedup_key) {
            continue;
        }

        let mut meta_lines = card
            .select(&meta_selector)
            .map(|el| element_text(&el))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        if meta_lines.is_empty() {
            debug!(title = %title, "card without metadata lines, using card text");
            let fallback = element_text(&card);
            if !fallback.is_empty() {
                meta_lines.push(fallback);
            }
        }

        let mut record = RawRecord::new(SourceKind::AnnasArchive);
        record.title = Some(title);
        record.author = Some(parse_authors_from_meta(&meta_lines).join(", ")).filter(|a| !a.is_empty());
        record.year = parse_year_from_meta(&meta_lines);
        record.format = parse_format_from_meta(&meta_lines);
        record.filesize = parse_size_from_meta(&meta_lines);
        record.language = parse_lang_from_meta(&meta_lines);
        record.isbn = parse_isbn_from_meta(&meta_lines);
        record.publisher = parse_publisher_from_meta(&meta_lines);
        record.cover_url = card
            .select(&image_selector)
            .filter_map(|img| img.value().attr("src"))
            .find_map(|src| absolute_url(src, base));
        record.url = url;
        out.push(record);
    }

    Ok(out)
}

/// Fields from a file's detail page: the key/value table, download
/// mirrors (best first) and the cover image.
pub fn parse_details_html(html: &str, page_url: &str) -> Result<RawRecord> {
    let heading_selector = parse_selector("h1")?;
    let row_selector = parse_selector("tr")?;
    let cell_selector = parse_selector("td, th")?;
    let link_selector = parse_selector("a[href]")?;
    let image_selector = parse_selector("img[src]")?;

    let document = Html::parse_document(html);
    let mut record = RawRecord::new(SourceKind::AnnasArchive);
    record.url = Some(page_url.to_string());
    record.title = document
        .select(&heading_selector)
        .next()
        .and_then(|h| non_empty(&element_text(&h)));

    for row in document.select(&row_selector) {
        let cells: Vec<String> = row.select(&cell_selector).map(|c| element_text(&c)).collect();
        if cells.len() < 2 {
            continue;
        }
        let key = cells[0].to_lowercase();
        let value = non_empty(&cells[1]);
        let slot = if key.contains("author") {
            &mut record.author
        } else if key.contains("publisher") {
            &mut record.publisher
        } else if key.contains("year") || key.contains("date") {
            &mut record.year
        } else if key.contains("isbn") {
            &mut record.isbn
        } else if key.contains("language") {
            &mut record.language
        } else if key.contains("pages") {
            &mut record.pages
        } else if key.contains("size") {
            &mut record.filesize
        } else if key.contains("format") {
            &mut record.format
        } else {
            continue;
        };
        *slot = value;
    }

    let mut seen = HashSet::new();
    let mut mirrors: Vec<String> = document
        .select(&link_selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| is_download_candidate(href))
        .filter_map(|href| absolute_url(href, page_url))
        .filter(|url| seen.insert(url.clone()))
        .collect();
    mirrors.sort_by_key(|url| std::cmp::Reverse(download_priority(url)));
    record.download_url = mirrors.first().cloned();
    record.mirrors = mirrors;

    record.cover_url = document
        .select(&image_selector)
        .filter_map(|img| img.value().attr("src"))
        .find(|src| src.to_lowercase().contains("cover"))
        .and_then(|src| absolute_url(src, page_url));

    if record.title.is_none() && record.mirrors.is_empty() {
        return Err(SourceError::Parse(format!("no book details found at {page_url}")));
    }
    Ok(record)
}

fn parse_authors_from_meta(meta_lines: &[String]) -> Vec<String> {
    for line in meta_lines {
        let lower = line.to_lowercase();
        if FORMAT_RE.is_match(line)
            || lower.contains("mb")
            || lower.contains("press")
            || YEAR_RE.is_match(line)
        {
            continue;
        }
        let authors = line
            .split(';')
            .map(str::trim)
            .filter(|part| part.len() > 2)
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        if !authors.is_empty() {
            return authors;
        }
    }
    Vec::new()
}

pub fn parse_year_from_meta(meta_lines: &[String]) -> Option<String> {
    let combined = meta_lines.join(" ");
    YEAR_RE.find(&combined).map(|m| m.as_str().to_string())
}

pub fn parse_format_from_meta(meta_lines: &[String]) -> Option<String> {
    let combined = meta_lines.join(" ");
    FORMAT_RE
        .captures(&combined)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Size as `"<n> <UNIT>"`.
pub fn parse_size_from_meta(meta_lines: &[String]) -> Option<String> {
    let combined = meta_lines.join(" ");
    let caps = SIZE_RE.captures(&combined)?;
    Some(format!("{} {}", &caps[1], caps[2].to_uppercase()))
}

pub fn parse_lang_from_meta(meta_lines: &[String]) -> Option<String> {
    let combined = meta_lines.join(" ");
    let token = LANG_RE
        .captures(&combined)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())?;
    Some(match token.as_str() {
        "english" | "en" => "en".to_string(),
        "russian" | "ru" => "ru".to_string(),
        "german" | "de" => "de".to_string(),
        "french" | "fr" => "fr".to_string(),
        "spanish" | "es" => "es".to_string(),
        "italian" | "it" => "it".to_string(),
        "portuguese" | "pt" => "pt".to_string(),
        "polish" | "pl" => "pl".to_string(),
        "ukrainian" | "uk" => "uk".to_string(),
        "japanese" | "ja" => "ja".to_string(),
        "korean" | "ko" => "ko".to_string(),
        "chinese" | "zh" => "zh".to_string(),
        _ => token,
    })
}

fn parse_publisher_from_meta(meta_lines: &[String]) -> Option<String> {
    meta_lines
        .iter()
        .find(|line| {
            let lower = line.to_lowercase();
            ["press", "publisher", "springer", "wiley", "elsevier", "o'reilly"]
                .iter()
                .any(|needle| lower.contains(needle))
        })
        .and_then(|line| non_empty(line))
}

fn parse_isbn_from_meta(meta_lines: &[String]) -> Option<String> {
    let combined = meta_lines.join(" ");
    ISBN_RE
        .captures_iter(&combined)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| Isbn::parse(m.as_str()).ok())
        .map(|isbn| isbn.isbn13)
}

fn is_download_candidate(href: &str) -> bool {
    let href = href.to_lowercase();
    ["libgen", "download", "mirror"]
        .iter()
        .any(|needle| href.contains(needle))
}

fn download_priority(url: &str) -> u8 {
    let url = url.to_lowercase();
    if url.contains("libgen.li") {
        100
    } else if url.contains("libgen") {
        90
    } else if url.contains("ipfs") {
        70
    } else if url.contains("annas-archive") {
        40
    } else {
        50
    }
}
