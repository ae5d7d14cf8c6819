use serde::Deserialize;

/// Main configuration structure for gallery-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub seed: SeedConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    pub output: OutputConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent workers
    pub workers: u32,

    /// Delay between consecutive worker starts (milliseconds)
    #[serde(rename = "worker-stagger-ms", default)]
    pub worker_stagger_ms: u64,

    /// Maximum assets fetched per record in one asset-fetch pass
    #[serde(rename = "items-per-record")]
    pub items_per_record: u32,

    /// Age after which an `in_progress` claim may be taken over (seconds)
    ///
    /// Absent means claims are never reclaimed.
    #[serde(rename = "lease-secs", default)]
    pub lease_secs: Option<u64>,
}

/// Seed list configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Path to a JSON array of surnames
    #[serde(rename = "name-list")]
    pub name_list: String,

    /// Maximum number of new surnames registered per run
    #[serde(rename = "name-count")]
    pub name_count: u32,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Search page URL; `{surname}` is replaced by the encoded surname
    #[serde(rename = "search-url")]
    pub search_url: String,

    /// JSON API endpoint for album listings
    #[serde(rename = "api-url")]
    pub api_url: String,

    /// Image URL template with `{key}`, `{variant}` and `{ext}` placeholders
    #[serde(rename = "photo-url")]
    pub photo_url: String,

    /// Size variants fetched for every image
    pub variants: Vec<String>,

    #[serde(default = "default_extension")]
    pub extension: String,

    /// Images requested per album API call
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

/// Advisory delays applied by the site handlers (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct PolitenessConfig {
    #[serde(rename = "search-delay-ms", default = "default_search_delay")]
    pub search_delay_ms: u64,

    #[serde(rename = "gallery-delay-ms", default = "default_gallery_delay")]
    pub gallery_delay_ms: u64,

    #[serde(rename = "download-delay-ms", default = "default_download_delay")]
    pub download_delay_ms: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            search_delay_ms: default_search_delay(),
            gallery_delay_ms: default_gallery_delay(),
            download_delay_ms: default_download_delay(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory that receives downloaded assets
    #[serde(rename = "assets-root")]
    pub assets_root: String,

    /// Optional debug log file
    #[serde(rename = "log-file", default)]
    pub log_file: Option<String>,
}

fn default_extension() -> String {
    "jpg".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_search_delay() -> u64 {
    5000
}

fn default_gallery_delay() -> u64 {
    2000
}

fn default_download_delay() -> u64 {
    500
}
