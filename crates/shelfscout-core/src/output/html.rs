use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use upon::{Engine, Value, fmt as upon_fmt};

use crate::affiliate::AffiliateLinker;
use crate::error::Result;
use crate::models::CanonicalBook;

const BOOK_PAGE: &str = "book_page";
const BOOK_LIST: &str = "book_list";
const SITEMAP: &str = "sitemap";

/// Renders book pages, listing pages and the sitemap into the HTML
/// directory. Templates are compiled once and embedded in the binary.
pub struct HtmlPublisher {
    html_dir: PathBuf,
    engine: Engine<'static>,
    linker: AffiliateLinker,
}

#[derive(Serialize)]
struct BookView<'a> {
    title: &'a str,
    author: &'a str,
    isbn: &'a str,
    year: String,
    pages: String,
    publisher: &'a str,
    language: &'a str,
    file_format: &'a str,
    file_size: &'a str,
    genre: String,
    source: &'static str,
    source_url: &'a str,
    download_url: &'a str,
    download_label: &'a str,
    cover_url: &'a str,
    description: &'a str,
    summary: String,
    page: String,
}

impl<'a> BookView<'a> {
    fn new(book: &'a CanonicalBook) -> Self {
        let summary = [
            book.file_format.as_str(),
            book.file_size.as_str(),
            book.source.label(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" • ");

        Self {
            title: &book.title,
            author: &book.author,
            isbn: &book.isbn,
            year: book.year.map(|y| y.to_string()).unwrap_or_default(),
            pages: book.pages.map(|p| p.to_string()).unwrap_or_default(),
            publisher: &book.publisher,
            language: &book.language,
            file_format: &book.file_format,
            file_size: &book.file_size,
            genre: book.genre.join(", "),
            source: book.source.label(),
            source_url: &book.source_url,
            download_url: &book.download_url,
            download_label: if book.file_format.is_empty() { "Book" } else { book.file_format.as_str() },
            cover_url: &book.cover_url,
            description: &book.description,
            summary,
            page: page_file_name(book),
        }
    }
}

#[derive(Serialize)]
struct StoreLink {
    name: &'static str,
    url: String,
}

#[derive(Serialize)]
struct BookPageContext<'a> {
    book: BookView<'a>,
    links: Vec<StoreLink>,
}

#[derive(Serialize)]
struct ListStats {
    total_books: usize,
    sources: String,
}

#[derive(Serialize)]
struct BookListContext<'a> {
    title: &'a str,
    query: &'a str,
    stats: ListStats,
    books: Vec<BookView<'a>>,
}

#[derive(Serialize)]
struct SitemapContext {
    pages: Vec<String>,
}

impl HtmlPublisher {
    pub fn new(html_dir: impl Into<PathBuf>, linker: AffiliateLinker) -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_default_formatter(&escape_markup);
        engine.add_template(BOOK_PAGE, include_str!("../../templates/book_page.html"))?;
        engine.add_template(BOOK_LIST, include_str!("../../templates/book_list.html"))?;
        engine.add_template(SITEMAP, include_str!("../../templates/sitemap.xml"))?;
        Ok(Self {
            html_dir: html_dir.into(),
            engine,
            linker,
        })
    }

    pub fn html_dir(&self) -> &Path {
        &self.html_dir
    }

    pub fn render_book_page(&self, book: &CanonicalBook) -> Result<String> {
        let links = self
            .linker
            .price_comparison_links(book)
            .into_iter()
            .map(|(name, url)| StoreLink { name, url })
            .collect();
        let ctx = BookPageContext {
            book: BookView::new(book),
            links,
        };
        Ok(self.engine.template(BOOK_PAGE).render(&ctx).to_string()?)
    }

    pub fn render_book_list(
        &self,
        books: &[CanonicalBook],
        title: &str,
        query: &str,
    ) -> Result<String> {
        let mut sources: Vec<&str> = books.iter().map(|b| b.source.label()).collect();
        sources.sort_unstable();
        sources.dedup();

        let ctx = BookListContext {
            title,
            query,
            stats: ListStats {
                total_books: books.len(),
                sources: sources.join(", "),
            },
            books: books.iter().map(BookView::new).collect(),
        };
        Ok(self.engine.template(BOOK_LIST).render(&ctx).to_string()?)
    }

    pub fn render_sitemap(&self, books: &[CanonicalBook]) -> Result<String> {
        let ctx = SitemapContext {
            pages: books.iter().map(page_file_name).collect(),
        };
        Ok(self.engine.template(SITEMAP).render(&ctx).to_string()?)
    }

    /// Write `{html_dir}/{filename_base}.html`.
    pub fn write_book_page(&self, book: &CanonicalBook) -> Result<PathBuf> {
        let html = self.render_book_page(book)?;
        self.write(&page_file_name(book), &html)
    }

    /// Write `{html_dir}/book_list_{query}.html` (`all` without a query).
    pub fn write_book_list(
        &self,
        books: &[CanonicalBook],
        title: &str,
        query: &str,
    ) -> Result<PathBuf> {
        let html = self.render_book_list(books, title, query)?;
        self.write(&list_file_name(query), &html)
    }

    pub fn write_sitemap(&self, books: &[CanonicalBook]) -> Result<PathBuf> {
        let xml = self.render_sitemap(books)?;
        self.write("sitemap.xml", &xml)
    }

    /// Book pages, the listing page and the sitemap. A page that fails to
    /// render is logged and left out.
    pub fn write_all(&self, books: &[CanonicalBook], query: &str) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(books.len() + 2);
        for book in books {
            match self.write_book_page(book) {
                Ok(path) => written.push(path),
                Err(e) => warn!(title = %book.title, error = %e, "failed to render book page"),
            }
        }

        let title = if query.is_empty() {
            "Book Library".to_string()
        } else {
            format!("Search results: {query}")
        };
        written.push(self.write_book_list(books, &title, query)?);
        written.push(self.write_sitemap(books)?);

        info!(files = written.len(), "generated HTML files");
        Ok(written)
    }

    fn write(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.html_dir)?;
        let path = self.html_dir.join(file_name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

fn page_file_name(book: &CanonicalBook) -> String {
    format!("{}.html", book.filename_base())
}

fn list_file_name(query: &str) -> String {
    let name: String = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if name.is_empty() {
        "book_list_all.html".to_string()
    } else {
        format!("book_list_{name}.html")
    }
}

/// Default formatter: every interpolated string is HTML/XML escaped.
fn escape_markup(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
    match value {
        Value::String(s) => f.write_str(&escape(s))?,
        v => upon_fmt::default(f, v)?,
    };
    Ok(())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
