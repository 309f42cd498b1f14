use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shelfscout_core::output::{
    HtmlPublisher, SearchResults, list_book_json, save_book_json, save_books_csv,
    save_search_results,
};
use shelfscout_core::{AffiliateLinker, AppConfig, CanonicalBook, SourceKind, is_valid_isbn_shape, validate};
use shelfscout_sources::{Aggregator, DownloadOutcome, Downloader};

const CSV_FILE_NAME: &str = "books.csv";

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "shelfscout",
    about = "Search book metadata across open catalogues and shadow libraries",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (same as DEBUG=true).
    #[arg(long, global = true)]
    debug: bool,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting SHELFSCOUT_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search all enabled sources and write metadata, CSV and HTML.
    Search {
        query: String,
        /// Results per source.
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Skip book and cover downloads.
        #[arg(long)]
        no_download: bool,
        /// Only search this source (annas-archive, libgen, openlibrary,
        /// google-books, internet-archive). Implies --no-download.
        #[arg(long)]
        source: Option<String>,
    },

    /// Find one book by title (or ISBN) and optional author.
    Book {
        title: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Show saved metadata and download statistics.
    Stats,

    /// Show the effective configuration.
    Config,

    /// Remove truncated downloads.
    Cleanup,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(cli.debug || config.core.debug);

    let json_output = cli.json || std::env::var("SHELFSCOUT_JSON").as_deref() == Ok("1");
    for warning in config.warnings() {
        warn!("{warning}");
    }

    match cli.command {
        Commands::Search {
            query,
            limit,
            no_download,
            source,
        } => {
            let source = source.as_deref().map(parse_source).transpose()?;
            let download = !no_download && source.is_none();
            run_search(&config, &query, limit, source, download, json_output, start).await?;
        }

        Commands::Book {
            title,
            author,
            source,
            limit,
        } => {
            let source = source.as_deref().map(parse_source).transpose()?;
            let aggregator = Aggregator::from_config(&scoped_config(&config, source))?;

            let mut books = find_book(&aggregator, &title, author.as_deref(), source, limit).await?;

            let linker = AffiliateLinker::new(&config.affiliate);
            for book in &mut books {
                linker.enrich(book);
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": books, "total": books.len(), "title": title },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if books.is_empty() {
                println!("No results for: {title}");
            } else {
                for book in &books {
                    print_book_details(book);
                }
            }
        }

        Commands::Stats => {
            let saved = list_book_json(&config.metadata_dir())?;
            let downloads = Downloader::from_config(&config)?.stats().await?;
            let mut per_source: Vec<(&str, usize)> = SourceKind::ALL
                .iter()
                .map(|kind| (kind.label(), saved.iter().filter(|b| b.source == *kind).count()))
                .filter(|(_, n)| *n > 0)
                .collect();
            per_source.sort_by(|a, b| b.1.cmp(&a.1));
            let dur = start.elapsed().as_millis();

            if json_output {
                let by_source: serde_json::Map<String, serde_json::Value> = per_source
                    .iter()
                    .map(|(label, n)| (label.to_string(), serde_json::json!(n)))
                    .collect();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "saved_books": saved.len(),
                        "by_source": by_source,
                        "downloads": downloads,
                        "tier": config.tier_name(),
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("shelfscout statistics ({} tier):", config.tier_name());
                println!("  Saved metadata:  {}", saved.len());
                for (label, n) in &per_source {
                    println!("    {label:<18} {n}");
                }
                println!(
                    "  Books on disk:   {} ({:.2} MB)",
                    downloads.books, downloads.books_size_mb
                );
                println!(
                    "  Covers on disk:  {} ({:.2} MB)",
                    downloads.covers, downloads.covers_size_mb
                );
            }
        }

        Commands::Config => {
            let dur = start.elapsed().as_millis();
            let enabled: Vec<&str> = config.sources.enabled.iter().map(|k| k.as_str()).collect();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "config_path": AppConfig::config_path(),
                        "tier": config.tier_name(),
                        "requests_per_minute": config.requests_per_minute(),
                        "max_concurrent_downloads": config.max_concurrent_downloads(),
                        "output_dir": config.output_dir(),
                        "sources": enabled,
                        "features": config.enabled_features(),
                        "warnings": config.warnings(),
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Config file:      {}", AppConfig::config_path().display());
                println!("Tier:             {}", config.tier_name());
                println!("Requests/minute:  {}", config.requests_per_minute());
                println!("Max downloads:    {}", config.max_concurrent_downloads());
                println!("Output dir:       {}", config.output_dir().display());
                println!("Sources:          {}", enabled.join(", "));
                println!("Features:");
                for (name, on) in config.enabled_features() {
                    println!("  {} {name}", if on { "✓" } else { "○" });
                }
                for warning in config.warnings() {
                    println!("! {warning}");
                }
            }
        }

        Commands::Cleanup => {
            let removed = Downloader::from_config(&config)?.cleanup().await?;
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "removed": removed },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Removed {removed} incomplete files.");
            }
        }
    }

    Ok(())
}

// ─── Search pipeline ────────────────────────────────────────────────────────

struct WrittenFiles {
    json: Vec<PathBuf>,
    csv: Option<PathBuf>,
    html: Vec<PathBuf>,
}

async fn run_search(
    config: &AppConfig,
    query: &str,
    limit: usize,
    source: Option<SourceKind>,
    download: bool,
    json_output: bool,
    start: Instant,
) -> Result<()> {
    let aggregator = Aggregator::from_config(&scoped_config(config, source))?;
    let mut books = match source {
        Some(kind) => aggregator.search_source(kind, query, limit).await?,
        None => aggregator.search_all(query, limit).await,
    };
    info!(query, total = books.len(), "search complete");

    let downloads: Vec<DownloadOutcome> = if download && !books.is_empty() {
        Downloader::from_config(config)?.download_all(&mut books).await
    } else {
        Vec::new()
    };

    let linker = AffiliateLinker::new(&config.affiliate);
    for book in &mut books {
        linker.enrich(book);
        for problem in validate(book) {
            warn!(title = %book.title, "{problem}");
        }
    }

    let results = SearchResults::new(query, books);
    let files = write_outputs(config, &linker, &results)?;
    let dur = start.elapsed().as_millis();

    if json_output {
        print_json(&serde_json::json!({
            "status": "ok",
            "data": {
                "query": results.query,
                "total": results.total_results,
                "sources_used": results.sources_used,
                "items": results.books,
                "downloads": downloads,
                "files": {
                    "json": files.json,
                    "csv": files.csv,
                    "html": files.html,
                },
            },
            "meta": { "duration_ms": dur }
        }))?;
        return Ok(());
    }

    if results.books.is_empty() {
        println!("No results for: {query}");
        return Ok(());
    }

    println!("Found {} books for \"{query}\":", results.total_results);
    print_table(&results.books);

    let downloaded = downloads.iter().filter(|o| o.book_path.is_some()).count();
    if !downloads.is_empty() {
        println!("\nDownloaded {downloaded}/{} books.", downloads.len());
    }
    println!("\nSaved {} metadata files to {}", files.json.len(), config.metadata_dir().display());
    if let Some(csv) = &files.csv {
        println!("CSV: {}", csv.display());
    }
    if !files.html.is_empty() {
        println!("HTML: {} pages in {}", files.html.len(), config.html_dir().display());
    }
    Ok(())
}

fn write_outputs(
    config: &AppConfig,
    linker: &AffiliateLinker,
    results: &SearchResults,
) -> Result<WrittenFiles> {
    let metadata_dir = config.metadata_dir();
    let mut files = WrittenFiles {
        json: Vec::new(),
        csv: None,
        html: Vec::new(),
    };

    if config.output.save_json {
        for book in &results.books {
            match save_book_json(&metadata_dir, book) {
                Ok(path) => files.json.push(path),
                Err(e) => warn!(title = %book.title, error = %e, "could not save metadata"),
            }
        }
        save_search_results(&metadata_dir, results).context("saving search results")?;
    }

    if config.output.save_csv && !results.books.is_empty() {
        files.csv = Some(
            save_books_csv(&metadata_dir, &results.books, CSV_FILE_NAME).context("saving CSV")?,
        );
    }

    if config.output.generate_html && !results.books.is_empty() {
        let publisher = HtmlPublisher::new(config.html_dir(), linker.clone())?;
        files.html = publisher
            .write_all(&results.books, &results.query)
            .context("writing HTML pages")?;
    }

    Ok(files)
}

/// ISBN lookup first when the argument looks like one, then a title search.
/// A failed lookup only costs the shortcut.
async fn find_book(
    aggregator: &Aggregator,
    title: &str,
    author: Option<&str>,
    source: Option<SourceKind>,
    limit: usize,
) -> Result<Vec<CanonicalBook>> {
    if looks_like_isbn(title) {
        match aggregator.lookup_isbn(title).await {
            Ok(Some(book)) => return Ok(vec![book]),
            Ok(None) => {}
            Err(e) => warn!(isbn = title, error = %e, "ISBN lookup failed, searching by title"),
        }
    }
    Ok(aggregator.search_book(title, author, source, limit).await?)
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(debug: bool) {
    let level = if debug { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_source(name: &str) -> Result<SourceKind> {
    name.parse::<SourceKind>()
        .with_context(|| format!("unknown source {name:?}"))
}

/// The configuration restricted to one source when `--source` is given.
fn scoped_config(config: &AppConfig, source: Option<SourceKind>) -> AppConfig {
    let mut scoped = config.clone();
    if let Some(kind) = source {
        scoped.sources.enabled = vec![kind];
    }
    scoped
}

fn looks_like_isbn(text: &str) -> bool {
    let text = text.trim();
    text.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, 'X' | 'x' | '-' | ' '))
        && is_valid_isbn_shape(text)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn print_table(books: &[CanonicalBook]) {
    println!(
        "{:>3}  {:<45}  {:<25}  {:>4}  {:<16}  {}",
        "#", "Title", "Author", "Year", "Source", "Format"
    );
    for (i, book) in books.iter().enumerate() {
        println!(
            "{:>3}  {:<45}  {:<25}  {:>4}  {:<16}  {}",
            i + 1,
            truncate(&book.title, 45),
            truncate(&book.author, 25),
            book.year.map(|y| y.to_string()).unwrap_or_default(),
            book.source.label(),
            book.file_format,
        );
    }
}

fn print_book_details(book: &CanonicalBook) {
    println!("{}", book.title);
    let fields = [
        ("Author", book.author.clone()),
        ("ISBN", book.isbn.clone()),
        ("Year", book.year.map(|y| y.to_string()).unwrap_or_default()),
        ("Publisher", book.publisher.clone()),
        ("Format", book.file_format.clone()),
        ("Size", book.file_size.clone()),
        ("Source", format!("{} {}", book.source.label(), book.source_url)),
        ("Amazon", book.amazon_link.clone()),
    ];
    for (label, value) in fields {
        if !value.trim().is_empty() {
            println!("  {label:<10} {}", value.trim());
        }
    }
    println!();
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}
