use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Where a record was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    AnnasArchive,
    #[serde(rename = "libgen")]
    LibGen,
    #[serde(rename = "openlibrary")]
    OpenLibrary,
    GoogleBooks,
    InternetArchive,
}

impl SourceKind {
    /// Search order used when no source is selected.
    pub const ALL: [SourceKind; 5] = [
        Self::AnnasArchive,
        Self::LibGen,
        Self::OpenLibrary,
        Self::GoogleBooks,
        Self::InternetArchive,
    ];

    /// Stable identifier, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnnasArchive => "annas-archive",
            Self::LibGen => "libgen",
            Self::OpenLibrary => "openlibrary",
            Self::GoogleBooks => "google-books",
            Self::InternetArchive => "internet-archive",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AnnasArchive => "Anna's Archive",
            Self::LibGen => "LibGen",
            Self::OpenLibrary => "Open Library",
            Self::GoogleBooks => "Google Books",
            Self::InternetArchive => "Internet Archive",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| CoreError::UnknownSource(s.to_string()))
    }
}
