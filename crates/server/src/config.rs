use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use catalog::MergePolicy;
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

/// Rewrites an index path prefix to the prefix under which the file is
/// actually served. Identity over the media directories by default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathMapEntry {
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub friendly_name: String,
    /// Host advertised inside generated URIs; the bind address is always
    /// 0.0.0.0.
    pub host: String,
    pub port: u16,
    /// Top-level media directories handed to the indexer. Required.
    pub media_dirs: Vec<String>,
    /// Engine configuration directory (created on first run).
    pub confdir: String,
    pub path_map: Vec<PathMapEntry>,
    /// Disc-merge contiguity policy: "dense" or "strict".
    pub album_merge: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            friendly_name: "madrigal".to_string(),
            host: String::new(),
            port: 9090,
            media_dirs: Vec::new(),
            confdir: "recoll-conf".to_string(),
            path_map: Vec::new(),
            album_merge: "dense".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn merge_policy(&self) -> Result<MergePolicy, ConfigError> {
        self.album_merge.parse().map_err(ConfigError::Invalid)
    }

    /// Advertised `host:port` for generated URIs.
    pub fn advertised_host(&self) -> String {
        let host = self.host.trim();
        let host = if host.is_empty() { "127.0.0.1" } else { host };
        format!("{}:{}", host, self.port)
    }

    /// Path map with the identity default over the media directories.
    pub fn effective_path_map(&self) -> Vec<(String, String)> {
        if self.path_map.is_empty() {
            return self
                .media_dirs
                .iter()
                .map(|dir| (dir.clone(), dir.clone()))
                .collect();
        }
        self.path_map
            .iter()
            .map(|entry| (entry.from.clone(), entry.to.clone()))
            .collect()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("MADRIGAL_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.port == 0 {
            config.port = 9090;
        }
        if config.confdir.trim().is_empty() {
            config.confdir = "recoll-conf".to_string();
        }
        return Ok((config, false));
    }
    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Configuration problems are fatal at startup; there is nothing sensible
/// to serve without media directories.
pub fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.media_dirs.is_empty() {
        return Err(ConfigError::Invalid(
            "media_dirs must name at least one directory".to_string(),
        ));
    }
    for dir in &config.media_dirs {
        if !dir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "media directory must be absolute: {}",
                dir
            )));
        }
    }
    config.merge_policy()?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_default_config_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert!(path.exists());
        assert_eq!(config.port, 9090);
        assert_eq!(config.album_merge, "dense");
        let (_, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
    }

    #[test]
    fn validation_requires_absolute_media_dirs() {
        let mut config = ServerConfig::default();
        assert!(validate(&config).is_err());
        config.media_dirs = vec!["relative/dir".to_string()];
        assert!(validate(&config).is_err());
        config.media_dirs = vec!["/music".to_string()];
        assert!(validate(&config).is_ok());
        config.album_merge = "bogus".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn path_map_defaults_to_identity() {
        let mut config = ServerConfig::default();
        config.media_dirs = vec!["/music".to_string()];
        assert_eq!(
            config.effective_path_map(),
            vec![("/music".to_string(), "/music".to_string())]
        );
        config.path_map = vec![PathMapEntry {
            from: "/music".to_string(),
            to: "/mnt/nas/music".to_string(),
        }];
        assert_eq!(
            config.effective_path_map(),
            vec![("/music".to_string(), "/mnt/nas/music".to_string())]
        );
    }

    #[test]
    fn advertised_host_falls_back_to_loopback() {
        let mut config = ServerConfig::default();
        assert_eq!(config.advertised_host(), "127.0.0.1:9090");
        config.host = "10.0.0.5".to_string();
        config.port = 9999;
        assert_eq!(config.advertised_host(), "10.0.0.5:9999");
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let path = resolve_path(Path::new("/etc/madrigal/config.yaml"), "recoll-conf");
        assert_eq!(path, PathBuf::from("/etc/madrigal/recoll-conf"));
        let path = resolve_path(Path::new("/etc/madrigal/config.yaml"), "/var/cache/conf");
        assert_eq!(path, PathBuf::from("/var/cache/conf"));
    }
}
