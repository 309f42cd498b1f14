use async_trait::async_trait;
use scraper::{ElementRef, Html};
use shelfscout_core::{RawRecord, SourceKind};
use tracing::info;

use super::{BookSource, MirrorSet, absolute_url, element_text, non_empty, parse_base_url, parse_selector};
use crate::error::Result;
use crate::http::RateLimitedClient;

const MIN_CELLS: usize = 10;
const MIRROR_CELL: usize = 9;

/// Library Genesis classic search (`search.php`), newest first.
pub struct LibGenSource {
    client: RateLimitedClient,
    mirrors: MirrorSet,
}

impl LibGenSource {
    pub fn new(client: RateLimitedClient, mirrors: MirrorSet) -> Self {
        Self { client, mirrors }
    }

    fn build_search_path(query: &str) -> Result<String> {
        let mut url = parse_base_url("https://libgen.rs/search.php")?;
        url.query_pairs_mut()
            .append_pair("req", query.trim())
            .append_pair("column", "def")
            .append_pair("sort", "year")
            .append_pair("sortmode", "DESC");
        Ok(format!("/search.php?{}", url.query().unwrap_or_default()))
    }
}

#[async_trait]
impl BookSource for LibGenSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LibGen
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let path = Self::build_search_path(query)?;
        let (html, mirror) = self.mirrors.fetch(&self.client, &path).await?;
        let mut records = parse_search_html(&html, &format!("{mirror}/search.php"))?;
        records.truncate(limit);

        info!(source = "libgen", query, count = records.len(), "search finished");
        Ok(records)
    }
}

/// Rows of the `table.c` results table. The header row and rows with fewer
/// than ten cells are skipped.
pub fn parse_search_html(html: &str, page_url: &str) -> Result<Vec<RawRecord>> {
    let table_selector = parse_selector("table.c")?;
    let row_selector = parse_selector("tr")?;
    let cell_selector = parse_selector("td")?;
    let link_selector = parse_selector("a[href]")?;
    let isbn_selector = parse_selector("font i, i")?;

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_selector).next() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for row in table.select(&row_selector).skip(1) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        if cells.len() < MIN_CELLS {
            continue;
        }
        let text = |i: usize| non_empty(&element_text(&cells[i]));

        let title_cell = cells[2];
        let book_link = title_cell
            .select(&link_selector)
            .find(|a| a.value().attr("href").is_some_and(|h| h.contains("md5=")));
        let title = book_link
            .map(|a| own_text(&a))
            .and_then(|t| non_empty(&t))
            .or_else(|| text(2));
        let Some(title) = title else {
            continue;
        };

        let mut record = RawRecord::new(SourceKind::LibGen);
        record.title = Some(title);
        record.author = text(1);
        record.publisher = text(3);
        record.year = text(4);
        record.pages = text(5);
        record.language = text(6);
        record.filesize = text(7);
        record.format = text(8);
        record.identifier = title_cell
            .select(&isbn_selector)
            .next()
            .and_then(|i| non_empty(&element_text(&i)));
        record.url = book_link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| absolute_url(href, page_url));

        record.mirrors = cells[MIRROR_CELL..]
            .iter()
            .flat_map(|cell| cell.select(&link_selector))
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| !href.contains("librarian"))
            .filter_map(|href| absolute_url(href, page_url))
            .collect();
        record.download_url = record.mirrors.first().cloned();

        out.push(record);
    }

    Ok(out)
}

/// Text directly inside an element, ignoring nested markup such as the
/// ISBN line LibGen appends to titles.
fn own_text(element: &ElementRef<'_>) -> String {
    let text: Vec<&str> = element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|t| &**t)
        .collect();
    super::normalize_whitespace(&text.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const PAGE: &str = "https://libgen.rs/search.php";

    #[test]
    fn parses_results_table() {
        let records = parse_search_html(include_str!("fixtures/libgen_search.html"), PAGE).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(
            first.title.as_deref(),
            Some("Clean Code: A Handbook of Agile Software Craftsmanship")
        );
        assert_eq!(first.author.as_deref(), Some("Robert C. Martin"));
        assert_eq!(first.publisher.as_deref(), Some("Prentice Hall"));
        assert_eq!(first.year.as_deref(), Some("2008"));
        assert_eq!(first.pages.as_deref(), Some("464 [431]"));
        assert_eq!(first.language.as_deref(), Some("English"));
        assert_eq!(first.filesize.as_deref(), Some("3 Mb"));
        assert_eq!(first.format.as_deref(), Some("pdf"));
        assert_eq!(first.identifier.as_deref(), Some("9780132350884, 0132350882"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://libgen.rs/book/index.php?md5=ABCDEF0123456789ABCDEF0123456789")
        );
        assert_eq!(first.mirrors.len(), 2);
        assert_eq!(
            first.download_url.as_deref(),
            Some("http://library.lol/main/ABCDEF0123456789ABCDEF0123456789")
        );

        let second = &records[1];
        assert_eq!(second.title.as_deref(), Some("The Clean Coder"));
        assert_eq!(second.identifier, None);
        assert_eq!(
            second.download_url.as_deref(),
            Some("https://libgen.rs/get.php?md5=0000111122223333444455556666AAAA")
        );
    }

    #[test]
    fn missing_table_is_empty() {
        let records = parse_search_html("<html><body>nothing</body></html>", PAGE).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn search_path_sorts_by_year() {
        let path = LibGenSource::build_search_path("clean code").unwrap();
        assert_eq!(
            path,
            "/search.php?req=clean+code&column=def&sort=year&sortmode=DESC"
        );
    }

    #[tokio::test]
    async fn search_falls_back_to_next_mirror() {
        let mut down = Server::new_async().await;
        let mut up = Server::new_async().await;
        let _d = down
            .mock("GET", "/search.php")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;
        let _u = up
            .mock("GET", "/search.php")
            .match_query(Matcher::UrlEncoded("req".into(), "clean code".into()))
            .with_status(200)
            .with_body(include_str!("fixtures/libgen_search.html"))
            .create_async()
            .await;

        let source = LibGenSource::new(
            RateLimitedClient::new_for_tests(0),
            MirrorSet::new(SourceKind::LibGen, vec![down.url(), up.url()]),
        );
        let records = source.search("clean code", 5).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].download_url.as_deref().unwrap().starts_with(&up.url()));
    }
}
