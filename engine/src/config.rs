// --- Configuration --------------------------------------------------------
//
// Structured settings (mainly the multimedia folder map) come from a JSON
// file. Deployment knobs can be overridden with environment variables, the
// same way the bind address and tool paths always have been:
//
//   PLAYER_REMOTE_CONFIG  path of the JSON file
//   PLAYER_REMOTE_BIND    listen address
//   PLAYER_REMOTE_MPV     mpv executable
//
// Example file:
//
//   {
//     "bind": "0.0.0.0:9090",
//     "multimedia_folders": { "movies": "/data/media", "music": "/srv/music" },
//     "engine": { "kind": "mpv", "args": ["--fs"] }
//   }

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::paths::FolderMap;

const DEFAULT_CONFIG_PATH: &str = "/etc/player-remote/config.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: String,
    pub endpoint: String,
    pub status_interval_ms: u64,
    pub engine_timeout_ms: u64,
    pub multimedia_folders: BTreeMap<String, PathBuf>,
    /// Directory served at `/` for a browser remote, if any.
    pub static_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9090".into(),
            endpoint: "/player".into(),
            status_interval_ms: 2000,
            engine_timeout_ms: 3000,
            multimedia_folders: BTreeMap::new(),
            static_dir: None,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EngineConfig {
    Mpv(MpvConfig),
    DryRun,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Mpv(MpvConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MpvConfig {
    pub program: String,
    pub socket: PathBuf,
    /// Extra mpv arguments, e.g. `--fs` or `--vo=gpu`.
    pub args: Vec<String>,
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            program: "mpv".into(),
            socket: std::env::temp_dir().join("player-remote-mpv.sock"),
            args: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load from `PLAYER_REMOTE_CONFIG` (or the default path) and apply
    /// environment overrides. A missing default file means built-in defaults;
    /// a missing file that was asked for by name is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var("PLAYER_REMOTE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => {
                tracing::warn!("no config file at {DEFAULT_CONFIG_PATH}, using defaults");
                Self::default()
            }
        };

        if let Ok(bind) = std::env::var("PLAYER_REMOTE_BIND") {
            cfg.bind = bind;
        }
        if let (Ok(program), EngineConfig::Mpv(mpv)) = (std::env::var("PLAYER_REMOTE_MPV"), &mut cfg.engine) {
            mpv.program = program;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if !self.endpoint.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.status_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("status_interval_ms"));
        }
        if self.engine_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("engine_timeout_ms"));
        }
        self.folder_map()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|source| ConfigError::Bind {
            value: self.bind.clone(),
            source,
        })
    }

    pub fn folder_map(&self) -> Result<FolderMap, ConfigError> {
        FolderMap::new(self.multimedia_folders.clone())
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg: ServiceConfig = serde_json::from_str("{}").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.bind_addr().unwrap(), "0.0.0.0:9090".parse().unwrap());
        assert_eq!(cfg.endpoint, "/player");
        assert_eq!(cfg.status_interval(), Duration::from_secs(2));
        assert!(matches!(cfg.engine, EngineConfig::Mpv(ref mpv) if mpv.program == "mpv"));
        assert!(cfg.folder_map().unwrap().is_empty());
    }

    #[test]
    fn full_document_parses() {
        let cfg: ServiceConfig = serde_json::from_str(
            r#"{
                "bind": "127.0.0.1:8080",
                "endpoint": "/remote",
                "status_interval_ms": 500,
                "multimedia_folders": {"movies": "/data/media", "music": "/srv/music"},
                "static_dir": "/usr/share/player-remote",
                "engine": {"kind": "mpv", "program": "/usr/bin/mpv", "args": ["--fs"]}
            }"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        let folders = cfg.folder_map().unwrap();
        assert_eq!(folders.root("movies"), Some(Path::new("/data/media")));
        assert_eq!(folders.aliases().collect::<Vec<_>>(), vec!["movies", "music"]);
        let EngineConfig::Mpv(mpv) = cfg.engine else {
            panic!("expected mpv engine");
        };
        assert_eq!(mpv.program, "/usr/bin/mpv");
        assert_eq!(mpv.args, vec!["--fs"]);
    }

    #[test]
    fn dry_run_engine_is_selectable() {
        let cfg: ServiceConfig = serde_json::from_str(r#"{"engine": {"kind": "dry-run"}}"#).unwrap();
        assert!(matches!(cfg.engine, EngineConfig::DryRun));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let bad = [
            r#"{"multimedia_folders": {"movies": "relative/dir"}}"#,
            r#"{"endpoint": "player"}"#,
            r#"{"status_interval_ms": 0}"#,
            r#"{"bind": "not an address"}"#,
        ];
        for doc in bad {
            let cfg: ServiceConfig = serde_json::from_str(doc).unwrap();
            assert!(cfg.validate().is_err(), "{doc}");
        }
    }

    #[test]
    fn from_file_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ broken").unwrap();
        let err = ServiceConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: ref p, .. } if p == &path));

        let err = ServiceConfig::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
