// Configuration module for cinevia
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;

const APP_NAME: &str = "cinevia";
const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@cinevia.app";
const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Which local tier backs the remote service
    pub platform: PlatformConfig,

    /// Remote identity/relational service
    pub remote: RemoteConfig,

    /// Metadata provider configuration
    pub metadata: MetadataConfig,

    /// Authentication configuration
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 8097)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8097,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (database and local storage location)
    pub data_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

/// Platform the app runs on. Native gets the embedded database,
/// web gets browser-style local storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Native,
    Web,
}

impl Platform {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "native" => Some(Platform::Native),
            "web" => Some(Platform::Web),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Native => write!(f, "native"),
            Platform::Web => write!(f, "web"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub kind: Platform,

    /// Prefix for the local storage keys (`<namespace>_movies`, ...)
    pub storage_namespace: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            kind: Platform::Native,
            storage_namespace: APP_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote service (REST under /rest/v1, auth under /auth/v1)
    pub url: Option<String>,

    /// Public (anon) API key
    pub anon_key: Option<String>,

    /// Request timeout in seconds (default: 10)
    pub timeout_secs: u64,

    /// Seconds the remote tier is skipped after a transport failure (default: 30)
    pub retry_after_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            timeout_secs: 10,
            retry_after_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// TMDB API key (sent as the api_key query parameter)
    pub tmdb_api_key: Option<String>,

    /// TMDB read access token (sent as a bearer credential)
    pub tmdb_access_token: Option<String>,

    /// Language for titles and synopses (default: en-US)
    pub language: String,

    /// TMDB API base URL
    pub tmdb_base_url: String,

    /// YouTube Data API key, enables trailer search by title
    pub youtube_api_key: Option<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            tmdb_access_token: None,
            language: "en-US".to_string(),
            tmdb_base_url: DEFAULT_TMDB_BASE_URL.to_string(),
            youtube_api_key: None,
        }
    }
}

impl MetadataConfig {
    /// An API key or a read access token; either one authenticates
    pub fn has_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.tmdb_api_key) || present(&self.tmdb_access_token)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// This account is always an administrator
    pub admin_email: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
        }
    }
}

/// Application paths following XDG Base Directory Specification on Unix
/// On other platforms, falls back to the current directory or platform-specific locations
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    /// XDG: $XDG_CONFIG_HOME/cinevia or ~/.config/cinevia
    pub config_dir: PathBuf,

    /// Directory for persistent data (database, local storage)
    /// XDG: $XDG_DATA_HOME/cinevia or ~/.local/share/cinevia
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Create application paths using XDG directories (or fallbacks)
    ///
    /// Priority order:
    /// 1. Environment variables (CINEVIA_CONFIG_DIR, CINEVIA_DATA_DIR)
    /// 2. Config file overrides
    /// 3. XDG / platform-specific directories
    /// 4. Current directory fallback
    pub fn new(config_overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve_dir(
                "CINEVIA_CONFIG_DIR",
                &config_overrides.config_dir,
                dirs::config_dir(),
            ),
            data_dir: Self::resolve_dir(
                "CINEVIA_DATA_DIR",
                &config_overrides.data_dir,
                dirs::data_dir(),
            ),
        }
    }

    /// Create application paths using current directory (portable mode)
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd,
        }
    }

    fn resolve_dir(
        env_var: &str,
        config_override: &Option<PathBuf>,
        platform_dir: Option<PathBuf>,
    ) -> PathBuf {
        if let Ok(path) = std::env::var(env_var) {
            return PathBuf::from(path);
        }

        if let Some(ref path) = config_override {
            return path.clone();
        }

        if let Some(dir) = platform_dir {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("cinevia.db")
    }

    /// Get the database URL for SQLite
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Directory holding the web-platform local storage blobs
    pub fn local_storage_dir(&self) -> PathBuf {
        self.data_dir.join("local-storage")
    }

    /// Directory holding the secure key-value store (session cache)
    pub fn secure_storage_dir(&self) -> PathBuf {
        self.data_dir.join("secure-storage")
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(self.local_storage_dir()).await?;
        tokio::fs::create_dir_all(self.secure_storage_dir()).await?;
        Ok(())
    }

    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::debug!("Database path: {}", self.database_path().display());
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: AppPaths,
    pub port: u16,
    pub bind_address: String,
    pub platform: Platform,
    pub storage_namespace: String,
    pub remote: RemoteConfig,
    pub metadata: MetadataConfig,
    pub admin_email: String,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let portable_mode = env_flag("CINEVIA_PORTABLE");

        let (paths, config_file) = if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            let paths = AppPaths::current_dir();
            let file = Self::load_config_file(&paths.config_dir);
            (paths, file)
        } else {
            let file = Self::load_config_file(&Self::find_config_dir());
            (AppPaths::new(&file.paths), file)
        };

        Self::build(paths, config_file)
    }

    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("CINEVIA_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file, falling back to defaults
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(paths: AppPaths, config_file: ConfigFile) -> Self {
        let port = std::env::var("CINEVIA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(config_file.server.port);

        let bind_address = std::env::var("CINEVIA_BIND_ADDRESS")
            .unwrap_or_else(|_| config_file.server.bind_address.clone());

        let platform = std::env::var("CINEVIA_PLATFORM")
            .ok()
            .and_then(|v| Platform::parse(&v))
            .unwrap_or(config_file.platform.kind);

        let mut remote = config_file.remote;
        remote.url = std::env::var("CINEVIA_REMOTE_URL").ok().or(remote.url);
        remote.anon_key = std::env::var("CINEVIA_REMOTE_KEY").ok().or(remote.anon_key);

        let mut metadata = config_file.metadata;
        metadata.tmdb_api_key = std::env::var("TMDB_API_KEY").ok().or(metadata.tmdb_api_key);
        metadata.tmdb_access_token = std::env::var("TMDB_ACCESS_TOKEN")
            .ok()
            .or(metadata.tmdb_access_token);
        metadata.youtube_api_key = std::env::var("YOUTUBE_API_KEY")
            .ok()
            .or(metadata.youtube_api_key);

        let admin_email =
            std::env::var("CINEVIA_ADMIN_EMAIL").unwrap_or(config_file.auth.admin_email);

        Self {
            paths,
            port,
            bind_address,
            platform,
            storage_namespace: config_file.platform.storage_namespace,
            remote,
            metadata,
            admin_email,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::build(AppPaths::current_dir(), ConfigFile::default())
    }

    /// Whether the remote service has both a URL and a key
    pub fn remote_configured(&self) -> bool {
        self.remote.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self
                .remote
                .anon_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty())
    }

    /// Get the database URL, with override from DATABASE_URL env var
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Server listening on {}:{}", self.bind_address, self.port);
        tracing::info!("Platform: {}", self.platform);

        if self.remote_configured() {
            tracing::info!(
                "Remote backend: {}",
                self.remote.url.as_deref().unwrap_or_default()
            );
        } else {
            tracing::info!("Remote backend: not configured, using local tier only");
        }

        if self.metadata.has_credentials() {
            tracing::info!("Metadata provider: TMDB ({})", self.metadata.language);
        } else {
            tracing::warn!("TMDB credentials missing: manual lookup and seeding will fail");
            tracing::info!(
                "Hint: Set tmdb_api_key or tmdb_access_token in config.toml (TMDB_API_KEY / TMDB_ACCESS_TOKEN)"
            );
        }

        if self.metadata.youtube_api_key.is_some() {
            tracing::debug!("YouTube trailer search: enabled");
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(file: ConfigFile) -> AppConfig {
        AppConfig::build(AppPaths::current_dir(), file)
    }

    #[test]
    fn test_database_url_format() {
        let paths = AppPaths::current_dir();
        let url = paths.database_url();
        assert!(url.starts_with("sqlite:"));
        assert!(url.ends_with("cinevia.db?mode=rwc"));
    }

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();
        assert_eq!(config.server.port, 8097);
        assert_eq!(config.platform.kind, Platform::Native);
        assert_eq!(config.platform.storage_namespace, "cinevia");
        assert_eq!(config.remote.retry_after_secs, 30);
        assert_eq!(config.metadata.language, "en-US");
        assert!(config.metadata.tmdb_api_key.is_none());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[server]
port = 9000
bind_address = "127.0.0.1"

[platform]
kind = "web"
storage_namespace = "filmhub"

[remote]
url = "https://example.supabase.co"
anon_key = "anon"

[metadata]
tmdb_api_key = "test_key"
language = "cs-CZ"

[auth]
admin_email = "boss@example.com"
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.platform.kind, Platform::Web);
        assert_eq!(config.platform.storage_namespace, "filmhub");
        assert_eq!(config.remote.url.as_deref(), Some("https://example.supabase.co"));
        assert_eq!(config.remote.timeout_secs, 10);
        assert_eq!(config.metadata.tmdb_api_key, Some("test_key".to_string()));
        assert_eq!(config.metadata.language, "cs-CZ");
        assert_eq!(config.auth.admin_email, "boss@example.com");
    }

    #[test]
    fn test_remote_requires_url_and_key() {
        let mut file = ConfigFile::default();
        file.remote.url = Some("https://example.supabase.co".into());
        if std::env::var("CINEVIA_REMOTE_KEY").is_err() {
            assert!(!config_from(file.clone()).remote_configured());
        }

        file.remote.anon_key = Some("  ".into());
        if std::env::var("CINEVIA_REMOTE_KEY").is_err() {
            assert!(!config_from(file.clone()).remote_configured());
        }

        file.remote.anon_key = Some("anon".into());
        assert!(config_from(file).remote_configured());
    }

    #[test]
    fn test_either_tmdb_credential_counts() {
        let mut metadata = MetadataConfig::default();
        assert!(!metadata.has_credentials());

        metadata.tmdb_access_token = Some("read-token".into());
        assert!(metadata.has_credentials());

        metadata.tmdb_access_token = Some("  ".into());
        assert!(!metadata.has_credentials());

        metadata.tmdb_api_key = Some("key".into());
        assert!(metadata.has_credentials());
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("WEB"), Some(Platform::Web));
        assert_eq!(Platform::parse(" native "), Some(Platform::Native));
        assert_eq!(Platform::parse("ios"), None);
    }
}
