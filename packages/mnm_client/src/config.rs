use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::encode_component;

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [server]
//                    host = "10.0.0.2"
//
//   env var:         MNM_SERVER__HOST=10.0.0.2   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Where the client connects (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Service name; the page lives at `/<service>` and the push channel at `/s/<service>`.
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub https: bool,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            service: String::new(),
            https: false,
        }
    }
}

/// Session tunables (lives under `[session]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// Fail a fetch that has not resolved after this many seconds (0 = wait forever).
    #[serde(default)]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 0,
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8123
}
fn default_outbound_capacity() -> usize {
    256
}

/// Build a figment that layers: defaults → config.toml → MNM_* env vars.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("MNM_").split("__"))
}

// =============================================================================
// Runtime config structs
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Page URL; fetch paths resolve against it.
    pub page_url: Url,
    pub push_url: Url,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Result<Self> {
        let (http, ws) = if fc.https {
            ("https", "wss")
        } else {
            ("http", "ws")
        };
        let authority = format!("{}:{}", fc.host, fc.port);
        let service = encode_component(&fc.service);

        let page_url = Url::parse(&format!("{http}://{authority}/{service}"))
            .with_context(|| format!("Invalid server address: {authority}"))?;
        let push_url = Url::parse(&format!("{ws}://{authority}/s/{service}"))
            .with_context(|| format!("Invalid server address: {authority}"))?;

        Ok(Self { page_url, push_url })
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub fetch_timeout: Option<Duration>,
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_file(&SessionFileConfig::default())
    }
}

impl SessionConfig {
    pub fn from_file(fc: &SessionFileConfig) -> Self {
        Self {
            fetch_timeout: if fc.fetch_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.fetch_timeout_secs))
            },
            outbound_capacity: fc.outbound_capacity.max(1),
        }
    }
}

// =============================================================================
// Directory layout
// =============================================================================

#[derive(Clone, Debug)]
pub struct MnmConfig {
    pub data_dir: PathBuf,
}

impl MnmConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".mnm"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_defaults() {
        let d = FileConfig::default();
        assert_eq!(d.server.host, "127.0.0.1");
        assert_eq!(d.server.port, 8123);
        assert!(d.server.service.is_empty());
        assert!(!d.server.https);
        assert_eq!(d.session.fetch_timeout_secs, 0);
        assert_eq!(d.session.outbound_capacity, 256);
    }

    #[test]
    fn test_server_config_urls() {
        let fc = ServerFileConfig {
            service: "local".to_string(),
            ..Default::default()
        };
        let sc = ServerConfig::from_file(&fc).unwrap();
        assert_eq!(sc.page_url.as_str(), "http://127.0.0.1:8123/local");
        assert_eq!(sc.push_url.as_str(), "ws://127.0.0.1:8123/s/local");
    }

    #[test]
    fn test_server_config_https_and_escaping() {
        let fc = ServerFileConfig {
            host: "example.org".to_string(),
            port: 443,
            service: "my svc".to_string(),
            https: true,
        };
        let sc = ServerConfig::from_file(&fc).unwrap();
        assert_eq!(sc.page_url.as_str(), "https://example.org/my%20svc");
        assert_eq!(sc.push_url.as_str(), "wss://example.org/s/my%20svc");
    }

    #[test]
    fn test_server_config_rejects_bad_host() {
        let fc = ServerFileConfig {
            host: "bad host".to_string(),
            ..Default::default()
        };
        assert!(ServerConfig::from_file(&fc).is_err());
    }

    #[test]
    fn test_session_config_timeout_zero_disables() {
        let sc = SessionConfig::from_file(&SessionFileConfig::default());
        assert!(sc.fetch_timeout.is_none());

        let sc = SessionConfig::from_file(&SessionFileConfig {
            fetch_timeout_secs: 30,
            outbound_capacity: 0,
        });
        assert_eq!(sc.fetch_timeout, Some(Duration::from_secs(30)));
        assert_eq!(sc.outbound_capacity, 1);
    }

    #[test]
    fn test_mnm_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        let config = MnmConfig::new(Some(dir.clone())).unwrap();
        assert_eq!(config.data_dir, dir);
        assert!(dir.exists());
        assert_eq!(config.config_toml_path(), dir.join("config.toml"));
    }

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.port, 8123);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nhost = \"10.0.0.2\"\nport = 9000\nservice = \"work\"\n\n[session]\nfetch_timeout_secs = 15\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.host, "10.0.0.2");
        assert_eq!(fc.server.port, 9000);
        assert_eq!(fc.server.service, "work");
        assert_eq!(fc.session.fetch_timeout_secs, 15);
        assert_eq!(fc.session.outbound_capacity, 256);
    }
}
