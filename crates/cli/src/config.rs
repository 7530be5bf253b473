use anyhow::{Context, Result};
use db::DatabaseConfig;
use loki::LokiConfig;
use nomad::NomadConfig;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "jobtrail.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub nomad: NomadConfig,
    pub loki: LokiConfig,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub nomad_addr: Option<String>,
    pub nomad_token: Option<String>,
    pub loki_addr: Option<String>,
}

impl Config {
    /// Reads the TOML file at `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(addr) = overrides.nomad_addr {
            self.nomad.address = addr;
        }
        if let Some(token) = overrides.nomad_token {
            self.nomad.token = Some(token);
        }
        if let Some(addr) = overrides.loki_addr {
            self.loki.address = addr;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join(DEFAULT_CONFIG_FILE))
            .await
            .unwrap();

        assert_eq!(config.database.url, "sqlite:jobtrail.db");
        assert_eq!(config.loki.page_limit, 5000);
        assert_eq!(config.loki.max_lines, 10000);
        assert!(config.nomad.token.is_none());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        tokio::fs::write(
            &path,
            r#"
[database]
url = "sqlite:/var/lib/jobtrail/state.db"

[loki]
address = "http://loki:3100"
page_limit = 1000
"#,
        )
        .await
        .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.database.url, "sqlite:/var/lib/jobtrail/state.db");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.loki.address, "http://loki:3100");
        assert_eq!(config.loki.page_limit, 1000);
        assert_eq!(config.loki.max_lines, 10000);
        assert_eq!(config.nomad.address, "http://127.0.0.1:4646");
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        tokio::fs::write(&path, "[loki]\npage_limit = \"many\"\n")
            .await
            .unwrap();

        let err = Config::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::default().apply(Overrides {
            database_url: Some("sqlite::memory:".to_string()),
            nomad_token: Some("secret".to_string()),
            loki_addr: Some("http://logs:3100".to_string()),
            ..Overrides::default()
        });

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.nomad.token.as_deref(), Some("secret"));
        assert_eq!(config.nomad.address, "http://127.0.0.1:4646");
        assert_eq!(config.loki.address, "http://logs:3100");
    }
}
