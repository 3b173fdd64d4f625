//! Update-run configuration.
//!
//! Values are layered: built-in defaults, then a JSON config file, then
//! environment/CLI overrides. Every layer is a [`ConfigLayer`] with optional
//! fields; later layers win field by field.

use crate::error::ConfigError;
use crate::model::{StepKind, StepPolicies, StepPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CSV: &str = "data/nba_stats.csv";
pub const DEFAULT_STATIC: &str = "nba_static_data.tsv";
pub const DEFAULT_APP_ENTRY: &str = "app.py";
pub const DEFAULT_LOG: &str = "logs/nba_update.log";
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_ENDPOINT: &str = "/api/player-stats?sport=nba&realtime=false";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StaticFormat {
    /// Tab-separated table with a comment header
    #[default]
    Table,
    /// JSON document with derived per-game stats
    Json,
}

/// One configuration layer. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub csv: Option<PathBuf>,
    pub static_file: Option<PathBuf>,
    pub static_format: Option<StaticFormat>,
    pub app_entry: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub lock_file: Option<PathBuf>,
    pub data_url: Option<String>,
    pub updater_command: Option<Vec<String>>,
    pub base_url: Option<String>,
    pub endpoints: Option<Vec<String>>,
    #[serde(with = "humantime_serde")]
    pub download_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub smoke_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub reload_grace: Option<Duration>,
    pub verify: Option<bool>,
    pub policies: HashMap<StepKind, StepPolicy>,
    pub min_players: Option<usize>,
}

impl ConfigLayer {
    /// Overlay `other` on top of `self`.
    pub fn merge(mut self, other: ConfigLayer) -> ConfigLayer {
        macro_rules! take {
            ($($field:ident),*) => {
                $( if other.$field.is_some() { self.$field = other.$field; } )*
            };
        }
        take!(
            csv,
            static_file,
            static_format,
            app_entry,
            log_file,
            lock_file,
            data_url,
            updater_command,
            base_url,
            endpoints,
            download_timeout,
            smoke_timeout,
            reload_grace,
            verify,
            min_players
        );
        self.policies.extend(other.policies);
        self
    }

    pub fn load(path: &Path) -> Result<ConfigLayer, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// `<config_dir>/nba-refresh/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nba-refresh").join("config.json"))
}

/// Fully resolved settings for one update run.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshConfig {
    pub project_root: PathBuf,
    pub csv_path: PathBuf,
    pub static_path: PathBuf,
    pub static_format: StaticFormat,
    pub app_entry: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    pub data_url: Option<String>,
    pub updater_command: Option<Vec<String>>,
    pub base_url: String,
    pub endpoints: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub download_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub smoke_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub reload_grace: Duration,
    pub verify: bool,
    pub policies: StepPolicies,
    pub min_players: usize,
    pub user_agent: String,
}

impl RefreshConfig {
    pub fn resolve(project_root: &Path, layer: ConfigLayer) -> RefreshConfig {
        let at = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                project_root.join(p)
            }
        };
        let or_default = |p: Option<PathBuf>, default: &str| at(p.unwrap_or_else(|| default.into()));

        let log_path = or_default(layer.log_file, DEFAULT_LOG);
        let lock_path = layer
            .lock_file
            .map(at)
            .unwrap_or_else(|| log_path.with_extension("lock"));
        let mut policies = StepPolicies::default();
        for (step, policy) in layer.policies {
            policies.set(step, policy);
        }

        RefreshConfig {
            csv_path: or_default(layer.csv, DEFAULT_CSV),
            static_path: or_default(layer.static_file, DEFAULT_STATIC),
            static_format: layer.static_format.unwrap_or_default(),
            app_entry: or_default(layer.app_entry, DEFAULT_APP_ENTRY),
            log_path,
            lock_path,
            data_url: layer.data_url.filter(|u| !u.trim().is_empty()),
            updater_command: layer.updater_command,
            base_url: layer
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            endpoints: layer
                .endpoints
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_ENDPOINT.to_string()]),
            download_timeout: layer.download_timeout.unwrap_or(Duration::from_secs(30)),
            smoke_timeout: layer.smoke_timeout.unwrap_or(Duration::from_secs(10)),
            reload_grace: layer.reload_grace.unwrap_or(Duration::from_secs(5)),
            verify: layer.verify.unwrap_or(true),
            policies,
            min_players: layer.min_players.unwrap_or(1),
            user_agent: format!("nba-refresh/{}", env!("CARGO_PKG_VERSION")),
            project_root: project_root.to_path_buf(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = self.data_url.as_deref() {
            check_http_url("data_url", url)?;
        }
        if self.verify {
            check_http_url("base_url", &self.base_url)?;
            if let Some(bad) = self.endpoints.iter().find(|e| !e.starts_with('/')) {
                return Err(ConfigError::InvalidEndpoint(bad.clone()));
            }
        }
        if let Some(cmd) = &self.updater_command {
            if cmd.first().map_or(true, |c| c.trim().is_empty()) {
                return Err(ConfigError::EmptyCommand);
            }
        }
        if !self.app_entry.is_file() {
            return Err(ConfigError::MissingAppEntry(self.app_entry.clone()));
        }
        Ok(())
    }

    pub fn policy(&self, step: StepKind) -> StepPolicy {
        self.policies.get(step)
    }
}

fn check_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = reqwest::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_under_project_root() {
        let cfg = RefreshConfig::resolve(Path::new("/srv/app"), ConfigLayer::default());
        assert_eq!(cfg.csv_path, Path::new("/srv/app/data/nba_stats.csv"));
        assert_eq!(cfg.static_path, Path::new("/srv/app/nba_static_data.tsv"));
        assert_eq!(cfg.app_entry, Path::new("/srv/app/app.py"));
        assert_eq!(cfg.lock_path, Path::new("/srv/app/logs/nba_update.lock"));
        assert_eq!(cfg.endpoints, vec![DEFAULT_ENDPOINT.to_string()]);
        assert_eq!(cfg.reload_grace, Duration::from_secs(5));
        assert_eq!(cfg.policy(StepKind::Download), StepPolicy::Optional);
    }

    #[test]
    fn later_layers_win() {
        let file: ConfigLayer = serde_json::from_str(
            r#"{
                "csv": "/data/in.csv",
                "base_url": "http://file:1",
                "reload_grace": "2s",
                "policies": { "verify": "optional" }
            }"#,
        )
        .unwrap();
        let cli = ConfigLayer {
            base_url: Some("http://cli:2/".into()),
            policies: HashMap::from([(StepKind::Download, StepPolicy::Critical)]),
            ..Default::default()
        };
        let cfg = RefreshConfig::resolve(Path::new("/root"), file.merge(cli));
        assert_eq!(cfg.csv_path, Path::new("/data/in.csv"));
        assert_eq!(cfg.base_url, "http://cli:2");
        assert_eq!(cfg.reload_grace, Duration::from_secs(2));
        assert_eq!(cfg.policy(StepKind::Verify), StepPolicy::Optional);
        assert_eq!(cfg.policy(StepKind::Download), StepPolicy::Critical);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res = serde_json::from_str::<ConfigLayer>(r#"{ "csv_file": "x" }"#);
        assert!(res.is_err());
    }

    #[test]
    fn validation_catches_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "").unwrap();
        let base = |layer: ConfigLayer| RefreshConfig::resolve(dir.path(), layer);

        assert!(base(ConfigLayer::default()).validate().is_ok());

        let cfg = base(ConfigLayer {
            data_url: Some("ftp://example.com/x.csv".into()),
            ..Default::default()
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidUrl { field: "data_url", .. })));

        let cfg = base(ConfigLayer {
            endpoints: Some(vec!["api/players".into()]),
            ..Default::default()
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidEndpoint(_))));

        let cfg = base(ConfigLayer {
            updater_command: Some(vec![]),
            ..Default::default()
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyCommand)));

        let cfg = base(ConfigLayer {
            app_entry: Some("missing.py".into()),
            ..Default::default()
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingAppEntry(_))));
    }
}
