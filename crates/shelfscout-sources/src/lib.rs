//! shelfscout sources: HTTP access, per-site adapters, multi-source search
//! and file downloads.

pub mod aggregate;
pub mod download;
pub mod error;
pub mod http;
pub mod sources;

pub use aggregate::Aggregator;
pub use download::{DownloadOutcome, DownloadStats, Downloader, file_md5};
pub use error::{Result, SourceError};
pub use http::RateLimitedClient;
pub use sources::{BookSource, build_source, build_sources};
