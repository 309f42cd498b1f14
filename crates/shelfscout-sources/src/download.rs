use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use reqwest::Url;
use serde::Serialize;
use shelfscout_core::{AppConfig, CanonicalBook};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{Result, SourceError};
use crate::http::RateLimitedClient;

const MIN_FILE_BYTES: u64 = 1024;
const MIN_EBOOK_BYTES: u64 = 10 * 1024;
const BYTES_PER_MB: u64 = 1024 * 1024;
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// What happened to one book in [`Downloader::download_all`].
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub title: String,
    pub book_path: Option<PathBuf>,
    pub cover_path: Option<PathBuf>,
    pub errors: Vec<String>,
}

impl DownloadOutcome {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            book_path: None,
            cover_path: None,
            errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadStats {
    pub books: usize,
    pub books_size_mb: f64,
    pub covers: usize,
    pub covers_size_mb: f64,
}

// ─── Downloader ───────────────────────────────────────────────────────────────

/// Fetches book files and covers into `<output>/books` and `<output>/covers`.
pub struct Downloader {
    client: RateLimitedClient,
    books_dir: PathBuf,
    covers_dir: PathBuf,
    max_file_bytes: u64,
    max_concurrent: usize,
    download_books: bool,
    download_covers: bool,
}

impl Downloader {
    pub fn new(client: RateLimitedClient, books_dir: PathBuf, covers_dir: PathBuf) -> Self {
        Self {
            client,
            books_dir,
            covers_dir,
            max_file_bytes: 100 * BYTES_PER_MB,
            max_concurrent: 3,
            download_books: true,
            download_covers: true,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut downloader = Self::new(
            RateLimitedClient::from_config(config)?,
            config.books_dir(),
            config.covers_dir(),
        );
        downloader.max_file_bytes = config.downloads.max_file_size_mb.saturating_mul(BYTES_PER_MB);
        downloader.max_concurrent = config.max_concurrent_downloads().max(1);
        downloader.download_books = config.downloads.download_books;
        downloader.download_covers = config.downloads.download_covers;
        Ok(downloader)
    }

    pub fn books_dir(&self) -> &Path {
        &self.books_dir
    }

    pub fn covers_dir(&self) -> &Path {
        &self.covers_dir
    }

    /// Download files and covers for every book, at most
    /// `max_concurrent` at a time. Successful downloads record their local
    /// paths (and the book's MD5) on the book itself; failures are logged
    /// and reported per title without stopping the rest.
    ///
    /// Books that map to the same file name run after the first one has
    /// finished, so they pick up its files instead of writing the same path
    /// concurrently. Outcomes keep the input order.
    pub async fn download_all(&self, books: &mut [CanonicalBook]) -> Vec<DownloadOutcome> {
        let semaphore = Semaphore::new(self.max_concurrent);
        let semaphore = &semaphore;

        let mut seen = HashSet::new();
        let (unique, repeats): (Vec<_>, Vec<_>) = books
            .iter_mut()
            .enumerate()
            .partition(|(_, book)| seen.insert(book.filename_base()));

        let tasks = unique
            .into_iter()
            .map(|(i, book)| async move { (i, self.download_one(book, semaphore).await) });
        let mut indexed = join_all(tasks).await;
        for (i, book) in repeats {
            debug!(title = %book.title, "same file name as an earlier book");
            indexed.push((i, self.download_one(book, semaphore).await));
        }
        indexed.sort_by_key(|(i, _)| *i);
        let outcomes: Vec<DownloadOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(total = outcomes.len(), failed, "downloads finished");
        outcomes
    }

    async fn download_one(&self, book: &mut CanonicalBook, semaphore: &Semaphore) -> DownloadOutcome {
        let mut outcome = DownloadOutcome::new(&book.title);
        let Ok(_permit) = semaphore.acquire().await else {
            outcome.errors.push("download queue closed".to_string());
            return outcome;
        };

        if self.download_books && !book.download_url.is_empty() {
            match self.download_book(book).await {
                Ok(path) => {
                    match file_md5(&path).await {
                        Ok(hash) => book.file_hash = hash,
                        Err(e) => warn!(path = %path.display(), error = %e, "could not hash file"),
                    }
                    book.local_file_path = path.display().to_string();
                    outcome.book_path = Some(path);
                }
                Err(e) => {
                    warn!(title = %book.title, error = %e, "book download failed");
                    outcome.errors.push(format!("book: {e}"));
                }
            }
        }

        if self.download_covers && !book.cover_url.is_empty() {
            match self.download_cover(book).await {
                Ok(path) => {
                    book.local_cover_path = path.display().to_string();
                    outcome.cover_path = Some(path);
                }
                Err(e) => {
                    warn!(title = %book.title, error = %e, "cover download failed");
                    outcome.errors.push(format!("cover: {e}"));
                }
            }
        }

        book.touch();
        outcome
    }

    /// Download a book file, trying the download URL and then each mirror.
    /// An existing file with the same name is reused.
    pub async fn download_book(&self, book: &CanonicalBook) -> Result<PathBuf> {
        let ext = book_extension(&book.file_format);
        let path = self.books_dir.join(format!("{}.{ext}", book.filename_base()));
        if fs::try_exists(&path).await? {
            debug!(path = %path.display(), "reusing downloaded book");
            return Ok(path);
        }

        let mut candidates: Vec<&str> = vec![book.download_url.as_str()];
        for mirror in &book.mirrors {
            if !candidates.contains(&mirror.as_str()) {
                candidates.push(mirror);
            }
        }

        let mut last_error = SourceError::NoMirror(book.title.clone());
        for url in candidates.into_iter().filter(|u| !u.is_empty()) {
            let attempt = match self.fetch_to_file(url, &path).await {
                Ok(()) => verify_book(&path, ext).await,
                Err(e) => Err(e),
            };
            match attempt {
                Ok(()) => {
                    info!(title = %book.title, path = %path.display(), "book downloaded");
                    return Ok(path);
                }
                Err(e) => {
                    debug!(url, error = %e, "download candidate failed");
                    remove_quietly(&path).await;
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    pub async fn download_cover(&self, book: &CanonicalBook) -> Result<PathBuf> {
        let ext = cover_extension(&book.cover_url);
        let path = self.covers_dir.join(format!("{}.{ext}", book.filename_base()));
        if fs::try_exists(&path).await? {
            return Ok(path);
        }
        if let Err(e) = self.fetch_to_file(&book.cover_url, &path).await {
            remove_quietly(&path).await;
            return Err(e);
        }
        Ok(path)
    }

    async fn fetch_to_file(&self, url: &str, path: &Path) -> Result<()> {
        let mut response = self.client.get_response(url).await?;
        if let Some(len) = response.content_length() {
            if len > self.max_file_bytes {
                return Err(SourceError::TooLarge(format!("{url} is {len} bytes")));
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_file_bytes {
                return Err(SourceError::TooLarge(format!("{url} exceeds {} bytes", self.max_file_bytes)));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Remove files under 1 KiB from both directories. Returns how many
    /// were removed.
    pub async fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;
        for dir in [&self.books_dir, &self.covers_dir] {
            for (path, len) in list_files(dir).await? {
                if len < MIN_FILE_BYTES {
                    fs::remove_file(&path).await?;
                    debug!(path = %path.display(), "removed truncated file");
                    removed += 1;
                }
            }
        }
        info!(removed, "cleanup finished");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<DownloadStats> {
        let books = list_files(&self.books_dir).await?;
        let covers = list_files(&self.covers_dir).await?;
        Ok(DownloadStats {
            books: books.len(),
            books_size_mb: total_mb(&books),
            covers: covers.len(),
            covers_size_mb: total_mb(&covers),
        })
    }
}

/// Hex MD5 digest of a file's contents.
pub async fn file_md5(path: &Path) -> Result<String> {
    let data = fs::read(path).await?;
    Ok(format!("{:x}", md5::compute(data)))
}

fn book_extension(format: &str) -> &'static str {
    match format.trim().to_ascii_uppercase().as_str() {
        "EPUB" => "epub",
        "MOBI" => "mobi",
        "AZW3" => "azw3",
        "TXT" => "txt",
        "RTF" => "rtf",
        "DOC" => "doc",
        "DOCX" => "docx",
        _ => "pdf",
    }
}

fn cover_extension(url: &str) -> &'static str {
    let ext = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()));
    ext.and_then(|ext| COVER_EXTENSIONS.iter().copied().find(|known| *known == ext))
        .unwrap_or("jpg")
}

async fn verify_book(path: &Path, ext: &str) -> Result<()> {
    let len = fs::metadata(path).await?.len();
    if len < MIN_FILE_BYTES {
        return Err(SourceError::InvalidFile(format!("{} is only {len} bytes", path.display())));
    }
    match ext {
        "pdf" => {
            let mut header = [0u8; 5];
            let mut file = fs::File::open(path).await?;
            file.read_exact(&mut header).await?;
            if &header != b"%PDF-" {
                return Err(SourceError::InvalidFile(format!("{} is not a PDF", path.display())));
            }
        }
        "epub" | "mobi" | "azw3" if len <= MIN_EBOOK_BYTES => {
            return Err(SourceError::InvalidFile(format!(
                "{} is too small for an ebook",
                path.display()
            )));
        }
        _ => {}
    }
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial file");
        }
    }
}

async fn list_files(dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    if !fs::try_exists(dir).await? {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_file() {
            files.push((entry.path(), meta.len()));
        }
    }
    Ok(files)
}

fn total_mb(files: &[(PathBuf, u64)]) -> f64 {
    let bytes: u64 = files.iter().map(|(_, len)| len).sum();
    (bytes as f64 / BYTES_PER_MB as f64 * 100.0).round() / 100.0
}
