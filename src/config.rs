//! Configuration loading and types for CloudTunes.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct, then overlaid with environment variables (a
//! `.env` file in the working directory is honoured).  Each subsection
//! governs a different part of the system: networking, the Google OAuth
//! client, the music library pipeline, CORS, and logging.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Google OAuth client and Drive API settings.
    #[serde(default)]
    pub google: GoogleConfig,

    /// Listing and thumbnail extraction settings.
    #[serde(default)]
    pub library: LibraryConfig,

    /// Cross-origin settings.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Deployment environment.
///
/// `Development` runs a local listener on the loopback interface.
/// `Production` assumes a hosting platform that injects `PORT` and routes
/// external traffic to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address. Empty means "pick from the environment".
    #[serde(default)]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Externally visible base URL used to build stream URLs
    /// (e.g. `https://music.example.com`). Empty means derive from `Host`.
    #[serde(default)]
    pub public_base_url: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            environment: Environment::default(),
            public_base_url: String::new(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// The address the listener binds to.
    pub fn bind_address(&self) -> String {
        let host = if !self.host.is_empty() {
            self.host.as_str()
        } else {
            match self.environment {
                Environment::Development => "127.0.0.1",
                Environment::Production => "0.0.0.0",
            }
        };
        format!("{}:{}", host, self.port)
    }
}

/// Google OAuth client and Drive API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client id.
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,

    /// OAuth redirect URI registered with the client.
    #[serde(default)]
    pub redirect_uri: String,

    /// Long-lived refresh token exchanged for access tokens.
    #[serde(default)]
    pub refresh_token: String,

    /// OAuth token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    /// Drive API base URL (overridable for tests and proxies).
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            refresh_token: String::new(),
            token_uri: default_token_uri(),
            api_base: default_api_base(),
        }
    }
}

/// Music library pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// Folder listed when a request does not name one.
    #[serde(default = "default_folder_id")]
    pub default_folder_id: String,

    /// Inclusive end of the leading byte range fetched for cover art.
    ///
    /// This is a heuristic: most MP3/FLAC/M4A files keep their artwork
    /// near the start, but nothing in those formats guarantees it.
    #[serde(default = "default_thumbnail_probe_bytes")]
    pub thumbnail_probe_bytes: u64,

    /// Maximum number of per-file extractions in flight for one listing.
    #[serde(default = "default_max_concurrent_extractions")]
    pub max_concurrent_extractions: usize,

    /// Optional deadline for each partial fetch. Unset means no deadline.
    #[serde(default)]
    pub thumbnail_fetch_timeout_secs: Option<u64>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            default_folder_id: default_folder_id(),
            thumbnail_probe_bytes: default_thumbnail_probe_bytes(),
            max_concurrent_extractions: default_max_concurrent_extractions(),
            thumbnail_fetch_timeout_secs: None,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API with credentials.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json. Empty picks json in production.
    #[serde(default)]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: String::new(),
        }
    }
}

impl LoggingConfig {
    /// Whether log lines should be emitted as JSON.
    pub fn use_json(&self, environment: Environment) -> bool {
        match self.format.as_str() {
            "json" => true,
            "text" => false,
            _ => environment == Environment::Production,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    3001
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_folder_id() -> String {
    "root".to_string()
}

fn default_thumbnail_probe_bytes() -> u64 {
    crate::cover_art::THUMBNAIL_PROBE_BYTES
}

fn default_max_concurrent_extractions() -> usize {
    8
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Load configuration from `path` if given (the file must exist), then
/// apply `.env` and process environment overrides.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => load_config(p)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", p.display()))?,
        None => Config::default(),
    };

    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

impl Config {
    /// Overlay values from an environment lookup function.
    ///
    /// Only non-empty values override. Takes the lookup as a closure so
    /// tests do not have to mutate the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GOOGLE_CLIENT_ID") {
            self.google.client_id = v;
        }
        if let Some(v) = get("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = v;
        }
        if let Some(v) = get("GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = v;
        }
        if let Some(v) = get("GOOGLE_REFRESH_TOKEN") {
            self.google.refresh_token = v;
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT '{v}': {e}"))?;
        }
        if let Some(v) = get("APP_ENV") {
            self.server.environment = Environment::parse(&v)
                .ok_or_else(|| anyhow::anyhow!("Invalid APP_ENV '{v}'"))?;
        }
        if let Some(v) = get("PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = get("DEFAULT_FOLDER_ID") {
            self.library.default_folder_id = v;
        }
        if let Some(v) = get("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        Ok(())
    }

    /// Check that the OAuth client is fully configured.
    pub fn validate_credentials(&self) -> anyhow::Result<()> {
        let missing: Vec<&str> = [
            ("GOOGLE_CLIENT_ID", &self.google.client_id),
            ("GOOGLE_CLIENT_SECRET", &self.google.client_secret),
            ("GOOGLE_REFRESH_TOKEN", &self.google.refresh_token),
        ]
        .iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "Missing OAuth configuration: {}",
                missing.join(", ")
            ))
        }
    }
}
