use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dedup::DUPLICATE_THRESHOLD;
use crate::error::{CoreError, Result};
use crate::models::SourceKind;

const DEFAULT_DELAY_SECS: f64 = 1.0;

/// Root application configuration, loaded from `~/.config/shelfscout/config.toml`
/// and then overridden from the environment.
///
/// Built once at startup and handed to each component by reference; nothing
/// mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub scraping: ScrapingConfig,
    pub sources: SourcesConfig,
    pub output: OutputConfig,
    pub downloads: DownloadConfig,
    pub affiliate: AffiliateConfig,
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub output_dir: String,
    pub debug: bool,
    pub is_premium: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Seconds to wait between requests to the same source and between sources.
    pub delay_secs: f64,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub requests_per_minute: u32,
    pub premium_requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub enabled: Vec<SourceKind>,
    pub annas_archive_mirrors: Vec<String>,
    pub libgen_mirrors: Vec<String>,
    pub openlibrary_url: String,
    pub google_books_url: String,
    pub internet_archive_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_books_api_key: Option<String>,
    /// Follow each search hit to its detail page when the source supports it.
    pub fetch_details: bool,
    pub dedup: bool,
    pub duplicate_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub save_json: bool,
    pub save_csv: bool,
    pub generate_html: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub download_books: bool,
    pub download_covers: bool,
    pub max_file_size_mb: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AffiliateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebay_campaign_id: Option<String>,
}

/// Toggles for publishing integrations. shelfscout only reads and reports
/// them; the uploaders themselves live elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub gdrive_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdrive_folder_id: Option<String>,
    pub ftp_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_username: Option<String>,
    pub wordpress_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordpress_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordpress_username: Option<String>,
    pub blogspot_enabled: bool,
    pub telegram_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            scraping: ScrapingConfig::default(),
            sources: SourcesConfig::default(),
            output: OutputConfig::default(),
            downloads: DownloadConfig::default(),
            affiliate: AffiliateConfig::default(),
            integrations: IntegrationsConfig::default(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            output_dir: "output".to_string(),
            debug: false,
            is_premium: false,
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            delay_secs: DEFAULT_DELAY_SECS,
            max_retries: 3,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36".to_string(),
            requests_per_minute: 60,
            premium_requests_per_minute: 300,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: SourceKind::ALL.to_vec(),
            annas_archive_mirrors: vec![
                "https://annas-archive.org".to_string(),
                "https://annas-archive.se".to_string(),
                "https://annas-archive.li".to_string(),
            ],
            libgen_mirrors: vec![
                "https://libgen.rs".to_string(),
                "https://libgen.li".to_string(),
                "https://libgen.is".to_string(),
            ],
            openlibrary_url: "https://openlibrary.org".to_string(),
            google_books_url: "https://www.googleapis.com/books/v1".to_string(),
            internet_archive_url: "https://archive.org".to_string(),
            google_books_api_key: None,
            fetch_details: true,
            dedup: true,
            duplicate_threshold: DUPLICATE_THRESHOLD,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_json: true,
            save_csv: true,
            generate_html: true,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_books: true,
            download_covers: true,
            max_file_size_mb: 100,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/shelfscout/config.toml`
    pub fn config_path() -> PathBuf {
        // Allow override via env var
        if let Ok(path) = std::env::var("SHELFSCOUT_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("shelfscout")
            .join("config.toml")
    }

    /// Load config from disk (defaults if missing), then apply process
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Reject values no component can work with.
    fn check(&self) -> Result<()> {
        let delay = self.scraping.delay_secs;
        if !delay.is_finite() || delay < 0.0 {
            return Err(CoreError::ConfigError(format!(
                "scraping.delay_secs must be a non-negative number of seconds, got {delay}"
            )));
        }
        Ok(())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Overlay environment variables on top of the file values.
    ///
    /// Unparsable numbers keep the current value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        env.bool("DEBUG", &mut self.core.debug);
        env.bool("IS_PREMIUM", &mut self.core.is_premium);
        env.string("OUTPUT_DIR", &mut self.core.output_dir);

        env.seconds("SCRAPING_DELAY", &mut self.scraping.delay_secs);
        env.parse("MAX_RETRIES", &mut self.scraping.max_retries);
        env.parse("TIMEOUT", &mut self.scraping.timeout_secs);
        env.parse("REQUESTS_PER_MINUTE", &mut self.scraping.requests_per_minute);
        env.parse(
            "PREMIUM_REQUESTS_PER_MINUTE",
            &mut self.scraping.premium_requests_per_minute,
        );

        env.optional("GOOGLE_BOOKS_API_KEY", &mut self.sources.google_books_api_key);

        env.bool("DOWNLOAD_BOOKS", &mut self.downloads.download_books);
        env.bool("DOWNLOAD_COVERS", &mut self.downloads.download_covers);
        env.parse("MAX_FILE_SIZE_MB", &mut self.downloads.max_file_size_mb);

        env.optional("AMAZON_AFFILIATE_TAG", &mut self.affiliate.amazon_tag);
        env.optional("EBAY_AFFILIATE_ID", &mut self.affiliate.ebay_campaign_id);

        let i = &mut self.integrations;
        env.bool("GDRIVE_ENABLED", &mut i.gdrive_enabled);
        env.optional("GDRIVE_FOLDER_ID", &mut i.gdrive_folder_id);
        env.bool("FTP_ENABLED", &mut i.ftp_enabled);
        env.optional("FTP_HOST", &mut i.ftp_host);
        env.optional("FTP_USERNAME", &mut i.ftp_username);
        env.bool("WORDPRESS_ENABLED", &mut i.wordpress_enabled);
        env.optional("WORDPRESS_URL", &mut i.wordpress_url);
        env.optional("WORDPRESS_USERNAME", &mut i.wordpress_username);
        env.bool("BLOGSPOT_ENABLED", &mut i.blogspot_enabled);
        env.bool("TELEGRAM_BOT_ENABLED", &mut i.telegram_enabled);
        env.optional("TELEGRAM_BOT_TOKEN", &mut i.telegram_bot_token);
    }

    // ─── Tier-dependent values ─────────────────────────────

    pub fn tier_name(&self) -> &'static str {
        if self.core.is_premium { "Premium" } else { "Free" }
    }

    pub fn requests_per_minute(&self) -> u32 {
        if self.core.is_premium {
            self.scraping.premium_requests_per_minute
        } else {
            self.scraping.requests_per_minute
        }
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        if self.core.is_premium { 10 } else { 3 }
    }

    pub fn scraping_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.scraping.delay_secs.max(0.0))
            .unwrap_or(Duration::from_secs_f64(DEFAULT_DELAY_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.scraping.timeout_secs)
    }

    /// Feature name → enabled, sorted by name.
    pub fn enabled_features(&self) -> BTreeMap<&'static str, bool> {
        let mut features = BTreeMap::from([
            ("metadata_scraping", true),
            ("file_download", self.downloads.download_books),
            ("cover_download", self.downloads.download_covers),
            ("gdrive_upload", self.integrations.gdrive_enabled),
            ("ftp_upload", self.integrations.ftp_enabled),
            ("wordpress_posting", self.integrations.wordpress_enabled),
            ("blogspot_posting", self.integrations.blogspot_enabled),
            ("html_generation", self.output.generate_html),
        ]);
        if self.core.is_premium {
            features.insert("telegram_notifications", self.integrations.telegram_enabled);
            features.insert("unlimited_downloads", true);
        }
        features
    }

    /// Human-readable warnings about incomplete settings. Never fatal.
    pub fn warnings(&self) -> Vec<String> {
        let i = &self.integrations;
        let mut warnings = Vec::new();

        if i.gdrive_enabled && i.gdrive_folder_id.is_none() {
            warnings.push("Google Drive enabled but no folder ID provided".to_string());
        }
        if i.ftp_enabled && (i.ftp_host.is_none() || i.ftp_username.is_none()) {
            warnings.push("FTP enabled but credentials incomplete".to_string());
        }
        if i.wordpress_enabled && (i.wordpress_url.is_none() || i.wordpress_username.is_none()) {
            warnings.push("WordPress enabled but credentials incomplete".to_string());
        }
        if self.core.is_premium && i.telegram_enabled && i.telegram_bot_token.is_none() {
            warnings.push("Telegram bot enabled but no token provided".to_string());
        }
        if !(0.0..=1.0).contains(&self.sources.duplicate_threshold) {
            warnings.push(format!(
                "Duplicate threshold {} is outside [0, 1]",
                self.sources.duplicate_threshold
            ));
        }
        warnings
    }

    // ─── Derived paths ─────────────────────────────────────

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.core.output_dir)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.output_dir().join("metadata")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.output_dir().join("html")
    }

    pub fn books_dir(&self) -> PathBuf {
        self.output_dir().join("books")
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.output_dir().join("covers")
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string())
    }

    fn bool(&self, key: &str, target: &mut bool) {
        if let Some(value) = self.get(key) {
            *target = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
    }

    fn string(&self, key: &str, target: &mut String) {
        if let Some(value) = self.get(key).filter(|v| !v.is_empty()) {
            *target = value;
        }
    }

    fn optional(&self, key: &str, target: &mut Option<String>) {
        if let Some(value) = self.get(key).filter(|v| !v.is_empty()) {
            *target = Some(value);
        }
    }

    /// Finite, non-negative seconds only.
    fn seconds(&self, key: &str, target: &mut f64) {
        if let Some(parsed) = self
            .get(key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
        {
            *target = parsed;
        }
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, target: &mut T) {
        if let Some(parsed) = self.get(key).and_then(|v| v.parse::<T>().ok()) {
            *target = parsed;
        }
    }
}
