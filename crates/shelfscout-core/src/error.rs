use thiserror::Error;

/// All errors that can occur in shelfscout-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid ISBN: {0}")]
    InvalidIsbn(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Template error: {0}")]
    Template(#[from] upon::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
