//! Configuration management
//!
//! YAML configuration with:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for every setting except Graph credentials

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub compare: CompareConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

/// Microsoft Graph connection settings
#[derive(Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Identity provider authority (token endpoint host)
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    /// Graph API root including version, e.g. `https://graph.microsoft.com/beta`
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Pre-acquired bearer token; takes precedence over client credentials
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on any single retry wait, including server `Retry-After` hints
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

// Secrets stay out of debug output
impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("GraphConfig")
            .field("authority_url", &self.authority_url)
            .field("base_url", &self.base_url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("access_token", &redact(&self.access_token))
            .field("scopes", &self.scopes)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("max_retry_delay_ms", &self.max_retry_delay_ms)
            .finish()
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            authority_url: default_authority_url(),
            base_url: default_graph_base_url(),
            tenant_id: None,
            client_id: None,
            client_secret: None,
            access_token: None,
            scopes: default_scopes(),
            timeout_secs: default_graph_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl GraphConfig {
    /// Whether a complete client-credential triple is configured
    pub fn has_client_credentials(&self) -> bool {
        [&self.tenant_id, &self.client_id, &self.client_secret]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    pub fn has_static_token(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/beta".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["https://graph.microsoft.com/.default".to_string()]
}

fn default_graph_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_max_retry_delay_ms() -> u64 {
    60_000
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
    /// Maximum number of rotated files to keep (0 = unlimited)
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
            max_log_files: default_max_log_files(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_prefix() -> String {
    "intune-assignment-checker".to_string()
}

fn default_log_rotation() -> bool {
    true
}

fn default_max_log_files() -> usize {
    14
}

/// In-memory cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Lifetime of a fetched policy configuration
    #[serde(default = "default_policy_config_ttl")]
    pub policy_config_ttl_secs: u64,
    /// Lifetime of the normalized policy inventory
    #[serde(default = "default_inventory_ttl")]
    pub inventory_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            policy_config_ttl_secs: default_policy_config_ttl(),
            inventory_ttl_secs: default_inventory_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_policy_config_ttl() -> u64 {
    300
}

fn default_inventory_ttl() -> u64 {
    120
}

fn default_cache_max_entries() -> usize {
    2000
}

/// Comparison and fetch tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompareConfig {
    /// Reasons and filters kept per comparison cell
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    /// Concurrent policy configuration fetches during a settings diff
    #[serde(default = "default_settings_fetch_concurrency")]
    pub settings_fetch_concurrency: usize,
    /// Concurrent source collection fetches during an inventory load
    #[serde(default = "default_source_fetch_concurrency")]
    pub source_fetch_concurrency: usize,
    /// Apps whose assignments are fetched together
    #[serde(default = "default_app_assignment_batch_size")]
    pub app_assignment_batch_size: usize,
    /// Ids per directory `getByIds` call
    #[serde(default = "default_group_lookup_chunk_size")]
    pub group_lookup_chunk_size: usize,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            display_limit: default_display_limit(),
            settings_fetch_concurrency: default_settings_fetch_concurrency(),
            source_fetch_concurrency: default_source_fetch_concurrency(),
            app_assignment_batch_size: default_app_assignment_batch_size(),
            group_lookup_chunk_size: default_group_lookup_chunk_size(),
        }
    }
}

fn default_display_limit() -> usize {
    6
}

fn default_settings_fetch_concurrency() -> usize {
    4
}

fn default_source_fetch_concurrency() -> usize {
    3
}

fn default_app_assignment_batch_size() -> usize {
    10
}

fn default_group_lookup_chunk_size() -> usize {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            graph: GraphConfig::default(),
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            compare: CompareConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], with an explicit file taking precedence
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = path
            .or_else(|| std::env::var("INTUNE_CHECKER_CONFIG").map(PathBuf::from).ok())
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => Self::from_file(path)?,
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => AppConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML configuration file without env overrides or validation
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/intune-assignment-checker/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("intune-assignment-checker/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("INTUNE_CHECKER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("INTUNE_CHECKER_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(tenant) = std::env::var("AZURE_TENANT_ID") {
            self.graph.tenant_id = Some(tenant);
        }
        if let Ok(client_id) = std::env::var("AZURE_CLIENT_ID") {
            self.graph.client_id = Some(client_id);
        }
        if let Ok(secret) = std::env::var("AZURE_CLIENT_SECRET") {
            self.graph.client_secret = Some(secret);
        }
        if let Ok(token) = std::env::var("GRAPH_ACCESS_TOKEN") {
            self.graph.access_token = Some(token);
        }
        if let Ok(url) = std::env::var("GRAPH_BASE_URL") {
            self.graph.base_url = url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("INTUNE_CHECKER_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.compare.display_limit == 0 {
            anyhow::bail!("compare.display_limit must be at least 1");
        }
        if self.compare.settings_fetch_concurrency == 0
            || self.compare.source_fetch_concurrency == 0
        {
            anyhow::bail!("Fetch concurrency limits must be at least 1");
        }
        if self.compare.app_assignment_batch_size == 0 || self.compare.group_lookup_chunk_size == 0
        {
            anyhow::bail!("Batch and chunk sizes must be at least 1");
        }

        if !self.graph.has_static_token() && !self.graph.has_client_credentials() {
            anyhow::bail!(
                "Graph credentials missing: set graph.access_token or tenant_id, client_id and client_secret"
            );
        }

        if !self.graph.base_url.starts_with("http://") && !self.graph.base_url.starts_with("https://")
        {
            anyhow::bail!("graph.base_url must be an http(s) URL: {}", self.graph.base_url);
        }

        Ok(())
    }
}
