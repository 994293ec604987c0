//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Node configuration. File: ~/.config/depot/config.toml or /etc/depot/config.toml.
/// Env overrides: DEPOT_BIND_HOST, DEPOT_CONNECT_HOST. Log filters come from DEPOT_LOG.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Host the listener binds an ephemeral port on (default localhost).
    #[serde(default = "default_host")]
    pub bind_host: String,
    /// Host dialled by `Connect:<port>` (default localhost).
    #[serde(default = "default_host")]
    pub connect_host: String,
    /// Default tracing filter when DEPOT_LOG and RUST_LOG are unset (default warn).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: default_host(),
            connect_host: default_host(),
            log_level: default_log_level(),
        }
    }
}

/// A config file that exists but could not be used. The defaults apply instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Defaults, then the first config file found, then env vars.
/// A broken file is handed back so it can be logged once tracing is up.
pub fn load() -> (Config, Option<ConfigError>) {
    let (mut c, problem) = match from_first(&search_paths()) {
        Ok(found) => (found.unwrap_or_default(), None),
        Err(e) => (Config::default(), Some(e)),
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    (c, problem)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("DEPOT_BIND_HOST").filter(|h| !h.is_empty()) {
        c.bind_host = host;
    }
    if let Some(host) = var("DEPOT_CONNECT_HOST").filter(|h| !h.is_empty()) {
        c.connect_host = host;
    }
}

/// Per-user file first, then the system-wide one.
fn search_paths() -> Vec<PathBuf> {
    let user = std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config/depot/config.toml"));
    user.into_iter()
        .chain([PathBuf::from("/etc/depot/config.toml")])
        .collect()
}

/// Only the first existing file is consulted, even when it is broken.
fn from_first(paths: &[PathBuf]) -> Result<Option<Config>, ConfigError> {
    let Some(path) = paths.iter().find(|p| p.exists()) else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str::<Config>(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })
}
