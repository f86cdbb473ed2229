//! Configuration management
//!
//! This module handles loading and parsing configuration for the WXR export service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Site information written into the channel header
    #[serde(default)]
    pub site: SiteConfig,
    /// Export engine configuration
    #[serde(default)]
    pub export: ExportConfig,
    /// Capability check for the export endpoint
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin allowed to call the API from a browser; CORS is off when unset
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/content.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Site information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title, also used to build the download filename
    #[serde(default = "default_site_title")]
    pub title: String,
    /// Blog URL
    #[serde(default = "default_site_url")]
    pub url: String,
    /// Base site URL (network URL on multisite); defaults to `url`
    #[serde(default)]
    pub site_url: Option<String>,
    /// Tagline
    #[serde(default)]
    pub description: String,
    /// Language code
    #[serde(default = "default_language")]
    pub language: String,
    /// Public base URL of the uploads directory; defaults to `<url>/wp-content/uploads`
    #[serde(default)]
    pub upload_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_site_title(),
            url: default_site_url(),
            site_url: None,
            description: String::new(),
            language: default_language(),
            upload_url: None,
        }
    }
}

impl SiteConfig {
    /// Blog URL without a trailing slash
    pub fn blog_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Base site URL, falling back to the blog URL
    pub fn base_site_url(&self) -> &str {
        self.site_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or_else(|| self.blog_url())
    }

    /// Uploads base URL without a trailing slash
    pub fn uploads_url(&self) -> String {
        match &self.upload_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/wp-content/uploads", self.blog_url()),
        }
    }
}

fn default_site_title() -> String {
    "My Site".to_string()
}

fn default_site_url() -> String {
    "http://localhost".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

/// A registered content type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeConfig {
    /// Type name as stored in `posts.post_type`
    pub name: String,
    /// Whether entities of this type may be exported
    #[serde(default = "default_true")]
    pub exportable: bool,
    /// Taxonomies attached to this type
    #[serde(default)]
    pub taxonomies: Vec<String>,
}

impl ContentTypeConfig {
    fn new(name: &str, exportable: bool, taxonomies: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            exportable,
            taxonomies: taxonomies.iter().map(|t| t.to_string()).collect(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Export engine configuration
///
/// Doubles as the content-type and status registry consulted when a raw
/// export request is turned into a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Number of entities fetched and serialized per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Registered post statuses
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
    /// Registered content types
    #[serde(default = "default_content_types")]
    pub content_types: Vec<ContentTypeConfig>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            statuses: default_statuses(),
            content_types: default_content_types(),
        }
    }
}

/// Status that is never exported unless explicitly requested
pub const AUTO_DRAFT_STATUS: &str = "auto-draft";

impl ExportConfig {
    /// Look up a registered content type
    pub fn content_type(&self, name: &str) -> Option<&ContentTypeConfig> {
        self.content_types.iter().find(|t| t.name == name)
    }

    /// Whether `name` is a registered, exportable content type
    pub fn is_exportable(&self, name: &str) -> bool {
        self.content_type(name).map_or(false, |t| t.exportable)
    }

    /// Taxonomies registered for a content type
    pub fn taxonomies_for(&self, name: &str) -> &[String] {
        self.content_type(name)
            .map(|t| t.taxonomies.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `status` is a registered status
    pub fn is_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }

    /// Every registered status except `auto-draft`
    pub fn default_statuses(&self) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|s| s.as_str() != AUTO_DRAFT_STATUS)
            .cloned()
            .collect()
    }
}

fn default_batch_size() -> usize {
    20
}

fn default_statuses() -> Vec<String> {
    [
        "publish", "future", "draft", "pending", "private", "trash", "auto-draft", "inherit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_content_types() -> Vec<ContentTypeConfig> {
    vec![
        ContentTypeConfig::new("post", true, &["category", "post_tag", "post_format"]),
        ContentTypeConfig::new("page", true, &[]),
        ContentTypeConfig::new("attachment", true, &[]),
        ContentTypeConfig::new("revision", false, &[]),
        ContentTypeConfig::new("nav_menu_item", true, &["nav_menu"]),
    ]
}

/// Capability check configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token granting the export capability; exports are refused when unset
    #[serde(default)]
    pub export_token: Option<String>,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - WXR_EXPORT_SERVER_HOST
    /// - WXR_EXPORT_SERVER_PORT
    /// - WXR_EXPORT_CORS_ORIGIN
    /// - WXR_EXPORT_DATABASE_DRIVER
    /// - WXR_EXPORT_DATABASE_URL
    /// - WXR_EXPORT_SITE_TITLE
    /// - WXR_EXPORT_SITE_URL
    /// - WXR_EXPORT_BATCH_SIZE
    /// - WXR_EXPORT_AUTH_TOKEN
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "export.batch_size must be at least 1".to_string(),
            ));
        }
        if self.export.default_statuses().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "export.statuses must contain a status other than '{}'",
                AUTO_DRAFT_STATUS
            )));
        }
        if self.site.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "site.url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("WXR_EXPORT_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("WXR_EXPORT_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(origin) = std::env::var("WXR_EXPORT_CORS_ORIGIN") {
            self.server.cors_origin = Some(origin).filter(|o| !o.is_empty());
        }

        if let Ok(driver) = std::env::var("WXR_EXPORT_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("WXR_EXPORT_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(title) = std::env::var("WXR_EXPORT_SITE_TITLE") {
            self.site.title = title;
        }
        if let Ok(url) = std::env::var("WXR_EXPORT_SITE_URL") {
            self.site.url = url;
        }

        if let Ok(size) = std::env::var("WXR_EXPORT_BATCH_SIZE") {
            if let Ok(size) = size.parse::<usize>() {
                self.export.batch_size = size;
            }
        }

        if let Ok(token) = std::env::var("WXR_EXPORT_AUTH_TOKEN") {
            self.auth.export_token = Some(token).filter(|t| !t.is_empty());
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_KEYS: &[&str] = &[
        "WXR_EXPORT_SERVER_HOST",
        "WXR_EXPORT_SERVER_PORT",
        "WXR_EXPORT_CORS_ORIGIN",
        "WXR_EXPORT_DATABASE_DRIVER",
        "WXR_EXPORT_DATABASE_URL",
        "WXR_EXPORT_SITE_TITLE",
        "WXR_EXPORT_SITE_URL",
        "WXR_EXPORT_BATCH_SIZE",
        "WXR_EXPORT_AUTH_TOKEN",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        guard
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/content.db");
        assert_eq!(config.export.batch_size, 20);
        assert!(config.auth.export_token.is_none());
        assert!(config.export.is_exportable("post"));
        assert!(!config.export.is_exportable("revision"));
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.site.title, "My Site");
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "site:\n  title: \"Example Blog\"\nexport:\n  batch_size: 50\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.site.title, "Example Blog");
        assert_eq!(config.site.language, "en-US");
        assert_eq!(config.export.batch_size, 50);
        assert_eq!(config.export.statuses.len(), 8);
    }

    #[test]
    fn test_load_custom_content_types() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
export:
  content_types:
    - name: post
      taxonomies: [category, post_tag]
    - name: book
      taxonomies: [genre]
    - name: secret
      exportable: false
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert!(config.export.is_exportable("book"));
        assert!(!config.export.is_exportable("secret"));
        assert!(!config.export.is_exportable("page"));
        assert_eq!(config.export.taxonomies_for("book"), ["genre".to_string()]);
        assert!(config.export.taxonomies_for("unknown").is_empty());
    }

    #[test]
    fn test_default_statuses_exclude_auto_draft() {
        let export = ExportConfig::default();
        let statuses = export.default_statuses();

        assert!(!statuses.iter().any(|s| s == AUTO_DRAFT_STATUS));
        assert!(statuses.iter().any(|s| s == "publish"));
        assert!(export.is_status(AUTO_DRAFT_STATUS));
    }

    #[test]
    fn test_site_urls() {
        let site = SiteConfig {
            url: "https://example.com/".to_string(),
            ..SiteConfig::default()
        };
        assert_eq!(site.blog_url(), "https://example.com");
        assert_eq!(site.base_site_url(), "https://example.com");
        assert_eq!(site.uploads_url(), "https://example.com/wp-content/uploads");

        let site = SiteConfig {
            site_url: Some("https://network.example.com".to_string()),
            upload_url: Some("https://cdn.example.com/uploads/".to_string()),
            ..site
        };
        assert_eq!(site.base_site_url(), "https://network.example.com");
        assert_eq!(site.uploads_url(), "https://cdn.example.com/uploads");
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let result = Config::load(file.path());

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("parse"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "export:\n  batch_size: 0\n").unwrap();

        let result = Config::load(file.path());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("batch_size"));
    }

    #[test]
    fn test_auto_draft_only_statuses_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "export:\n  statuses: [auto-draft]\n").unwrap();

        let result = Config::load(file.path());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("export.statuses"));
    }

    #[test]
    fn test_env_override_server_and_database() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("WXR_EXPORT_SERVER_HOST", "127.0.0.1");
        std::env::set_var("WXR_EXPORT_SERVER_PORT", "4000");
        std::env::set_var("WXR_EXPORT_CORS_ORIGIN", "https://admin.example.com");
        std::env::set_var("WXR_EXPORT_DATABASE_DRIVER", "mysql");
        std::env::set_var("WXR_EXPORT_DATABASE_URL", "mysql://wp@localhost/wordpress");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.cors_origin.as_deref(), Some("https://admin.example.com"));
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert_eq!(config.database.url, "mysql://wp@localhost/wordpress");

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_override_site_export_and_auth() {
        let _guard = lock_env();

        let file = NamedTempFile::new().unwrap();

        std::env::set_var("WXR_EXPORT_SITE_TITLE", "Env Site");
        std::env::set_var("WXR_EXPORT_BATCH_SIZE", "5");
        std::env::set_var("WXR_EXPORT_AUTH_TOKEN", "s3cret");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.site.title, "Env Site");
        assert_eq!(config.export.batch_size, 5);
        assert_eq!(config.auth.export_token.as_deref(), Some("s3cret"));

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "database:\n  driver: sqlite\n").unwrap();

        std::env::set_var("WXR_EXPORT_SERVER_PORT", "not_a_number");
        std::env::set_var("WXR_EXPORT_DATABASE_DRIVER", "postgres");
        std::env::set_var("WXR_EXPORT_BATCH_SIZE", "many");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.export.batch_size, 20);

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }
}
