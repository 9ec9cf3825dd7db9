use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for wty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where the admin credential is kept between runs. Defaults to the
    /// platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_user_agent() -> String {
    concat!("wty/", env!("CARGO_PKG_VERSION")).to_string()
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "wty", "wty")
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            Ok(config)
        }
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = project_dirs() {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.wty/config.toml")
        }
    }

    /// Admin credential file, honoring `session.credentials_file`.
    pub fn credentials_path(&self) -> PathBuf {
        if let Some(path) = &self.session.credentials_file {
            return path.clone();
        }
        if let Some(dirs) = project_dirs() {
            dirs.data_dir().join("credentials.json")
        } else {
            PathBuf::from("~/.wty/credentials.json")
        }
    }
}
