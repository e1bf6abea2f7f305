use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure for compass-gitlab.
///
/// Everything the services need is read once at process start and passed
/// down explicitly; nothing reads environment variables after that.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub compass: CompassConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,

    #[serde(default)]
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    /// Page size used for paginated REST calls
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompassConfig {
    /// GraphQL gateway endpoint
    #[serde(default = "default_compass_gateway_url")]
    pub gateway_url: String,

    /// Site the app is installed on
    #[serde(default)]
    pub cloud_id: String,

    /// Identifier of this app, sent with every catalog call
    #[serde(default)]
    pub app_id: String,

    /// API token for the gateway. Usually supplied through `COMPASS_API_TOKEN`.
    pub api_token: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Metric definition for merge request cycle time
    #[serde(default = "default_cycle_time_metric")]
    pub cycle_time_metric_id: String,

    /// Metric definition for open merge request count
    #[serde(default = "default_open_mr_metric")]
    pub open_merge_requests_metric_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Externally reachable base URL, used when registering GitLab webhooks
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// JSON file backing the key/value store. Defaults to the user data directory.
    pub path: Option<PathBuf>,

    /// Keep everything in memory and never touch disk
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackfillConfig {
    /// Current schema version; the backfill job runs once per version
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Days of history to send
    #[serde(default = "default_backfill_days")]
    pub days: u32,

    /// Upper bound of the random delay before the job starts
    #[serde(default = "default_max_jitter")]
    pub max_jitter_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeatureFlags {
    /// Report staging deployments in addition to production ones
    #[serde(default)]
    pub send_staging_events: bool,

    /// Schedule the historical backfill job when the server starts
    #[serde(default)]
    pub enable_backfill: bool,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: default_gitlab_base_url(),
            per_page: default_per_page(),
        }
    }
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_compass_gateway_url(),
            cloud_id: String::new(),
            app_id: String::new(),
            api_token: None,
            max_retries: default_max_retries(),
            cycle_time_metric_id: default_cycle_time_metric(),
            open_merge_requests_metric_id: default_open_mr_metric(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            days: default_backfill_days(),
            max_jitter_seconds: default_max_jitter(),
        }
    }
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_compass_gateway_url() -> String {
    "https://api.atlassian.com/graphql".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_cycle_time_metric() -> String {
    "ari:cloud:compass::metric-definition/builtin/pull-request-cycle-time-avg-last-10".to_string()
}

fn default_open_mr_metric() -> String {
    "ari:cloud:compass::metric-definition/builtin/open-pull-requests".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_schema_version() -> u32 {
    1
}

fn default_backfill_days() -> u32 {
    30
}

fn default_max_jitter() -> u64 {
    900
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./compass-gitlab.toml
    /// 3. ./compass-gitlab.json
    /// 4. ./compass-gitlab.yaml
    /// 5. ./compass-gitlab.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "compass-gitlab.toml",
            "compass-gitlab.json",
            "compass-gitlab.yaml",
            "compass-gitlab.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Resolve the store file, falling back to the platform data directory.
    pub fn storage_path(&self) -> Result<Option<PathBuf>> {
        if self.storage.in_memory {
            return Ok(None);
        }
        if let Some(path) = &self.storage.path {
            return Ok(Some(path.clone()));
        }
        let dir = dirs::data_dir()
            .context("No data directory found; set storage.path or storage.in-memory")?
            .join("compass-gitlab");
        Ok(Some(dir.join("store.json")))
    }

    /// URL GitLab should deliver webhook events to.
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.server.public_url.trim_end_matches('/'))
    }
}
