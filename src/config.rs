use std::path::{Path, PathBuf};

use anyhow::Context;
use directories_next::ProjectDirs;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public base URL used when building paste links. Derived from the port
    /// when unset.
    pub base_url: Option<String>,
    pub port: u16,
    /// Allow clients to override "now" through a request header.
    pub test_mode: bool,
    pub database: Database,
    pub limits: Limits,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_content_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: None,
            port: 3000,
            test_mode: false,
            database: Database::default(),
            limits: Limits::default(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Database {
            url: "sqlite://fadebin.db?mode=rwc".to_owned(),
            max_connections: 5,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_content_size: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load the config file at `path`, or the platform default location when
    /// no path is given. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => match default_path() {
                Some(path) => path,
                None => return Ok(Config::default()),
            },
        };

        if !path.exists() {
            info!("no config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Config::parse(&source).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(base_url) => base_url.trim_end_matches('/').to_owned(),
            None => format!("http://localhost:{}", self.port),
        }
    }
}

fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "fadebin").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            port = 8080

            [database]
            url = "postgres://localhost/fadebin"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert!(!config.test_mode);
        assert_eq!(config.database.url, "postgres://localhost/fadebin");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.limits.max_content_size, 1024 * 1024);
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let config = Config::parse(r#"base_url = "https://paste.example/""#).unwrap();
        assert_eq!(config.base_url(), "https://paste.example");
    }

    #[test]
    fn missing_file_is_default() {
        let config = Config::load(Some(Path::new("/nonexistent/fadebin.toml"))).unwrap();
        assert_eq!(config.port, 3000);
    }
}
