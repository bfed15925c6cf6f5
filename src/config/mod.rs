//! Configuration management.
//!
//! Settings come from three layers, later layers winning:
//! built-in defaults, an optional TOML file, and `TRENDVAULT_*` environment
//! variables. Credentials never live in the file; providers name the
//! environment variables that hold their keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default per-category capacity.
pub const DEFAULT_CAPACITY: usize = 30;

/// Default categories, in run order.
pub const DEFAULT_CATEGORIES: [&str; 5] = ["K-Pop", "K-Drama", "K-Movie", "K-Entertain", "K-Culture"];

/// Main configuration for trendvault.
#[derive(Debug, Clone, Serialize)]
pub struct TrendvaultConfig {
    /// Live store and archive settings.
    pub store: StoreConfig,
    /// Raw cascade settings, resolved by [`crate::llm::BackoffPolicy::from_config`].
    pub cascade: CascadeConfig,
    /// Model discovery settings.
    pub catalog: CatalogConfig,
    /// Providers in tier order: primary first.
    pub providers: Vec<ProviderConfig>,
    /// Categories and their search keywords.
    pub categories: CategoriesConfig,
    /// Prompt templates and per-cycle behavior.
    pub pipeline: PipelineConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Prometheus exporter.
    pub metrics: MetricsConfig,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local maps; nothing survives a restart.
    #[default]
    Memory,
    /// A `SQLite` database at [`StoreConfig::db_path`].
    Sqlite,
}

impl StoreBackend {
    /// Parses a backend name, defaulting to memory.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Self::Sqlite,
            _ => Self::Memory,
        }
    }
}

/// Live store and archive settings.
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    /// Maximum live items per category after maintenance.
    pub capacity: usize,
    /// Age beyond which items are evicted first.
    pub freshness_hours: u64,
    /// Inserts scoring below this are dropped.
    pub min_score: f64,
    /// Items at or above this score are copied to the archive.
    pub archive_threshold: f64,
    /// Storage backend.
    pub backend: StoreBackend,
    /// Database path for the `SQLite` backend.
    pub db_path: PathBuf,
    /// Image URLs containing any of these are placeholders, exempt from image
    /// dedup.
    pub placeholder_markers: Vec<String>,
    /// Image URLs containing any of these are dropped during enrichment.
    pub bad_image_markers: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            freshness_hours: 24,
            min_score: 4.0,
            archive_threshold: 7.0,
            backend: StoreBackend::Memory,
            db_path: default_db_path(),
            placeholder_markers: vec!["placehold.co".to_string()],
            bad_image_markers: [
                "logo", "icon", "banner", "thumb", "profile", "default", "btn", "button", "symbol",
                "blank", "spacer",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

/// Cascade settings as written in the config file.
///
/// Every field is optional; unset fields keep the
/// [`crate::llm::BackoffPolicy`] defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// `"advance"` (default) or `"wait"`.
    pub rate_limit_policy: Option<String>,
    /// Same-candidate retries after a transient failure.
    pub max_transient_retries: Option<u32>,
    /// First transient backoff in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Cap on a single transient backoff in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Rate-limit wait when no retry-after is given.
    pub rate_limit_default_ms: Option<u64>,
    /// Jitter as a fraction of the delay.
    pub jitter_ratio: Option<f64>,
    /// Hard deadline for one cascade.
    pub deadline_ms: Option<u64>,
    /// Per-attempt request timeout.
    pub attempt_timeout_ms: Option<u64>,
    /// Retry rate-limited candidates once after the list is exhausted.
    pub retry_rate_limited_after_exhaustion: Option<bool>,
}

/// Model discovery settings.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogConfig {
    /// How long a successful discovery is reused (0 disables caching).
    pub discovery_ttl_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            discovery_ttl_secs: 600,
        }
    }
}

/// Wire protocol of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `OpenAI`-compatible chat completions (Groq, Perplexity, `OpenAI`).
    #[serde(alias = "openai_compatible", alias = "openai-compatible")]
    OpenAi,
    /// Google Gemini `generateContent`.
    Gemini,
}

/// One configured upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name.
    pub name: String,
    /// Wire protocol.
    pub kind: ProviderKind,
    /// API base URL.
    pub base_url: String,
    /// Environment variables holding equivalent API keys, rotated per cycle.
    #[serde(default)]
    pub api_key_env: Vec<String>,
    /// Fallback models, in order, used when discovery is unavailable.
    #[serde(default)]
    pub models: Vec<String>,
    /// Models ranked above everything else when discovered.
    #[serde(default)]
    pub preferred: Vec<String>,
    /// Whether the provider honors a forced JSON output mode.
    #[serde(default = "default_true")]
    pub structured_output: bool,
    /// Whether the provider takes part in cascades.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

impl ProviderConfig {
    fn groq() -> Self {
        Self {
            name: "groq".to_string(),
            kind: ProviderKind::OpenAi,
            base_url: crate::llm::OpenAiCompatibleClient::GROQ_BASE_URL.to_string(),
            api_key_env: vec![
                "GROQ_API_KEY1".to_string(),
                "GROQ_API_KEY2".to_string(),
                "GROQ_API_KEY3".to_string(),
                "GROQ_API_KEY".to_string(),
            ],
            models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "llama-3.1-70b-versatile".to_string(),
            ],
            preferred: Vec::new(),
            structured_output: true,
            enabled: true,
        }
    }

    fn gemini() -> Self {
        Self {
            name: "gemini".to_string(),
            kind: ProviderKind::Gemini,
            base_url: crate::llm::GeminiClient::DEFAULT_BASE_URL.to_string(),
            api_key_env: vec!["GEMINI_API_KEY".to_string()],
            models: vec!["gemini-2.0-flash".to_string(), "gemini-1.5-flash".to_string()],
            preferred: Vec::new(),
            structured_output: true,
            enabled: true,
        }
    }

    fn perplexity() -> Self {
        Self {
            name: "perplexity".to_string(),
            kind: ProviderKind::OpenAi,
            base_url: crate::llm::OpenAiCompatibleClient::PERPLEXITY_BASE_URL.to_string(),
            api_key_env: vec!["PERPLEXITY_API_KEY".to_string()],
            models: vec!["sonar-pro".to_string(), "sonar".to_string()],
            preferred: Vec::new(),
            structured_output: false,
            enabled: true,
        }
    }
}

/// Categories and their search keywords.
#[derive(Debug, Clone, Serialize)]
pub struct CategoriesConfig {
    /// Categories in run order.
    pub order: Vec<String>,
    /// Search keywords substituted for `{keywords}` in prompts.
    pub keywords: BTreeMap<String, String>,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        let keywords = [
            ("K-Pop", "멜론차트 빌보드 뮤직뱅크 인기가요 컴백 쇼케이스 신곡발표"),
            ("K-Drama", "드라마 시청률 넷플릭스 티빙 방영예정 제작발표회 주연 확정"),
            ("K-Movie", "박스오피스 개봉영화 시사회 무대인사 크랭크인 천만관객"),
            ("K-Entertain", "예능 시청률 나혼자산다 유퀴즈 런닝맨 전지적참견시점 출연"),
            (
                "K-Culture",
                "한국관광공사 추천 여행지 서울 맛집 미슐랭 가이드 경복궁 야간개장 한식 문화유산 축제",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            order: DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect(),
            keywords,
        }
    }
}

/// Prompt templates and per-cycle behavior.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// System message template.
    pub system_prompt: String,
    /// User message template; `{category}` and `{keywords}` are substituted.
    pub user_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Pause between categories, through the injected sleeper.
    pub category_pause_ms: u64,
    /// How long a published subject is skipped.
    pub cooldown_hours: u64,
    /// Subjects remembered per category.
    pub cooldown_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a Korean entertainment trend editor. Respond with JSON only."
                .to_string(),
            user_prompt: "List the currently trending {category} stories related to: {keywords}. \
                Return a JSON array of objects with fields \"title\", \"summary\", \"link\", \
                \"score\" (0-10), \"keyword\", \"image_url\" and \"published_at\" (RFC 3339)."
                .to_string(),
            temperature: 0.3,
            category_pause_ms: 5_000,
            cooldown_hours: 4,
            cooldown_capacity: 256,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, defaulting to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive, e.g. `info` or `trendvault=debug`.
    pub level: Option<String>,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsConfig {
    /// Whether to install the recorder.
    pub enabled: bool,
    /// Listener port; no HTTP listener when unset.
    pub port: Option<u16>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Store section.
    pub store: Option<ConfigFileStore>,
    /// Cascade section.
    pub cascade: Option<CascadeConfig>,
    /// Catalog section.
    pub catalog: Option<ConfigFileCatalog>,
    /// Providers; replace the defaults when present.
    pub providers: Option<Vec<ProviderConfig>>,
    /// Categories section.
    pub categories: Option<ConfigFileCategories>,
    /// Pipeline section.
    pub pipeline: Option<ConfigFilePipeline>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Metrics section.
    pub metrics: Option<ConfigFileMetrics>,
}

/// Store section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStore {
    /// Capacity per category.
    pub capacity: Option<usize>,
    /// Freshness horizon in hours.
    pub freshness_hours: Option<u64>,
    /// Quality floor.
    pub min_score: Option<f64>,
    /// Archive threshold.
    pub archive_threshold: Option<f64>,
    /// Backend name.
    pub backend: Option<String>,
    /// Database path.
    pub db_path: Option<String>,
    /// Placeholder image markers.
    pub placeholder_markers: Option<Vec<String>>,
    /// Bad image markers.
    pub bad_image_markers: Option<Vec<String>>,
}

/// Catalog section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCatalog {
    /// Discovery cache TTL.
    pub discovery_ttl_secs: Option<u64>,
}

/// Categories section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCategories {
    /// Run order.
    pub order: Option<Vec<String>>,
    /// Keywords per category, merged over the defaults.
    pub keywords: Option<BTreeMap<String, String>>,
}

/// Pipeline section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFilePipeline {
    /// System prompt template.
    pub system_prompt: Option<String>,
    /// User prompt template.
    pub user_prompt: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Pause between categories.
    pub category_pause_ms: Option<u64>,
    /// Subject cooldown.
    pub cooldown_hours: Option<u64>,
    /// Subjects remembered per category.
    pub cooldown_capacity: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// Metrics section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMetrics {
    /// Whether metrics are enabled.
    pub enabled: Option<bool>,
    /// Listener port.
    pub port: Option<u16>,
}

impl Default for TrendvaultConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            cascade: CascadeConfig::default(),
            catalog: CatalogConfig::default(),
            providers: vec![
                ProviderConfig::groq(),
                ProviderConfig::gemini(),
                ProviderConfig::perplexity(),
            ],
            categories: CategoriesConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl TrendvaultConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text, then applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration TOML.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self::from_config_file(file).with_env_overrides())
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/trendvault/` on macOS)
    /// 2. XDG config dir (`~/.config/trendvault/` for Unix compatibility)
    ///
    /// Falls back to defaults (with environment overrides) when no file is
    /// found or the file is invalid.
    #[must_use]
    pub fn load_default() -> Self {
        for path in default_config_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), "Ignoring invalid config file: {e}"),
            }
        }
        Self::default().with_env_overrides()
    }

    /// Folds a parsed `ConfigFile` over the defaults.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(store) = file.store {
            config.store.apply(store);
        }
        if let Some(cascade) = file.cascade {
            config.cascade = cascade;
        }
        if let Some(catalog) = file.catalog
            && let Some(ttl) = catalog.discovery_ttl_secs
        {
            config.catalog.discovery_ttl_secs = ttl;
        }
        if let Some(providers) = file.providers {
            config.providers = providers;
        }
        if let Some(categories) = file.categories {
            if let Some(order) = categories.order {
                config.categories.order = order;
            }
            if let Some(keywords) = categories.keywords {
                config.categories.keywords.extend(keywords);
            }
        }
        if let Some(pipeline) = file.pipeline {
            config.pipeline.apply(pipeline);
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.level = logging.level.or(config.logging.level);
            config.logging.file = logging.file.map(PathBuf::from).or(config.logging.file);
        }
        if let Some(metrics) = file.metrics {
            if let Some(enabled) = metrics.enabled {
                config.metrics.enabled = enabled;
            }
            config.metrics.port = metrics.port.or(config.metrics.port);
        }

        config
    }

    /// Applies `TRENDVAULT_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("TRENDVAULT_STORE_CAPACITY") {
            self.store.capacity = v;
        }
        if let Some(v) = env_parse("TRENDVAULT_FRESHNESS_HOURS") {
            self.store.freshness_hours = v;
        }
        if let Some(v) = env_parse("TRENDVAULT_MIN_SCORE") {
            self.store.min_score = v;
        }
        if let Some(v) = env_parse("TRENDVAULT_ARCHIVE_THRESHOLD") {
            self.store.archive_threshold = v;
        }
        if let Ok(v) = std::env::var("TRENDVAULT_STORE_BACKEND") {
            self.store.backend = StoreBackend::parse(&v);
        }
        if let Ok(v) = std::env::var("TRENDVAULT_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = env_parse("TRENDVAULT_DISCOVERY_TTL_SECS") {
            self.catalog.discovery_ttl_secs = v;
        }
        if let Some(v) = env_parse("TRENDVAULT_CATEGORY_PAUSE_MS") {
            self.pipeline.category_pause_ms = v;
        }
        if let Ok(v) = std::env::var("TRENDVAULT_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&v);
        }
        if let Ok(v) = std::env::var("TRENDVAULT_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("TRENDVAULT_METRICS_ENABLED") {
            self.metrics.enabled = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = env_parse("TRENDVAULT_METRICS_PORT") {
            self.metrics.port = Some(v);
        }
        self
    }

    /// Keywords for `category`, empty when none are configured.
    #[must_use]
    pub fn keywords_for(&self, category: &str) -> &str {
        self.categories
            .keywords
            .get(category)
            .map_or("", String::as_str)
    }

    /// Sets the storage backend and database path.
    #[must_use]
    pub fn with_sqlite(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.store.backend = StoreBackend::Sqlite;
        self.store.db_path = db_path.into();
        self
    }
}

impl StoreConfig {
    fn apply(&mut self, file: ConfigFileStore) {
        if let Some(v) = file.capacity {
            self.capacity = v;
        }
        if let Some(v) = file.freshness_hours {
            self.freshness_hours = v;
        }
        if let Some(v) = file.min_score {
            self.min_score = v;
        }
        if let Some(v) = file.archive_threshold {
            self.archive_threshold = v;
        }
        if let Some(v) = file.backend {
            self.backend = StoreBackend::parse(&v);
        }
        if let Some(v) = file.db_path {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = file.placeholder_markers {
            self.placeholder_markers = v;
        }
        if let Some(v) = file.bad_image_markers {
            self.bad_image_markers = v;
        }
    }
}

impl PipelineConfig {
    fn apply(&mut self, file: ConfigFilePipeline) {
        if let Some(v) = file.system_prompt {
            self.system_prompt = v;
        }
        if let Some(v) = file.user_prompt {
            self.user_prompt = v;
        }
        if let Some(v) = file.temperature {
            self.temperature = v;
        }
        if let Some(v) = file.category_pause_ms {
            self.category_pause_ms = v;
        }
        if let Some(v) = file.cooldown_hours {
            self.cooldown_hours = v;
        }
        if let Some(v) = file.cooldown_capacity {
            self.cooldown_capacity = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Candidate config file locations, in lookup order.
#[must_use]
pub fn default_config_paths() -> Vec<PathBuf> {
    let Some(base_dirs) = directories::BaseDirs::new() else {
        return Vec::new();
    };
    vec![
        base_dirs.config_dir().join("trendvault").join("config.toml"),
        base_dirs
            .home_dir()
            .join(".config")
            .join("trendvault")
            .join("config.toml"),
    ]
}

/// Default `SQLite` path under the user data directory.
fn default_db_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".trendvault").join("trendvault.db"),
        |d| d.data_local_dir().join("trendvault").join("trendvault.db"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrendvaultConfig::default();
        assert_eq!(config.store.capacity, 30);
        assert_eq!(config.store.freshness_hours, 24);
        assert!((config.store.min_score - 4.0).abs() < f64::EPSILON);
        assert!((config.store.archive_threshold - 7.0).abs() < f64::EPSILON);
        assert_eq!(config.categories.order.len(), 5);
        assert_eq!(config.categories.order[0], "K-Pop");
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.providers[0].name, "groq");
        assert_eq!(config.catalog.discovery_ttl_secs, 600);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            [store]
            capacity = 10
            backend = "sqlite"
            db_path = "/tmp/tv.db"

            [cascade]
            rate_limit_policy = "wait"
            deadline_ms = 30000

            [categories]
            order = ["K-Pop"]
            keywords = { "K-Pop" = "comeback" }

            [[providers]]
            name = "local"
            kind = "openai"
            base_url = "http://localhost:8080/v1"
            models = ["m1", "m2"]

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        let config = TrendvaultConfig::from_config_file(file);

        assert_eq!(config.store.capacity, 10);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/tv.db"));
        assert_eq!(config.cascade.rate_limit_policy.as_deref(), Some("wait"));
        assert_eq!(config.cascade.deadline_ms, Some(30_000));
        assert_eq!(config.categories.order, vec!["K-Pop".to_string()]);
        assert_eq!(config.keywords_for("K-Pop"), "comeback");
        assert!(!config.keywords_for("K-Drama").is_empty());
        assert_eq!(config.providers.len(), 1);
        assert!(config.providers[0].structured_output);
        assert!(config.providers[0].enabled);
        assert!(config.providers[0].api_key_env.is_empty());
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let result = TrendvaultConfig::from_toml("[store\ncapacity = ");
        assert!(matches!(
            result,
            Err(crate::Error::OperationFailed { .. })
        ));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(StoreBackend::parse("SQLite"), StoreBackend::Sqlite);
        assert_eq!(StoreBackend::parse("memory"), StoreBackend::Memory);
        assert_eq!(StoreBackend::parse("other"), StoreBackend::Memory);
    }

    #[test]
    fn test_config_serializes_without_secrets() {
        let json = serde_json::to_string(&TrendvaultConfig::default()).unwrap();
        assert!(json.contains("GROQ_API_KEY1"));
        assert!(json.contains("\"capacity\":30"));
    }
}
