//! Settings shared by the elicast command-line tools, stored as TOML at
//! `~/.config/elicast/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONTEXT_LINES: usize = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    Read {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    Parse {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("No sessions directory given and no config file at {0}")]
    MissingSessionsPath(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding recorded session logs and re-record requests.
    pub sessions_path: PathBuf,
    /// Document lines shown above and below a conflict.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

fn default_context_lines() -> usize {
    DEFAULT_CONTEXT_LINES
}

impl Config {
    pub fn new(sessions_path: impl Into<PathBuf>) -> Self {
        Self {
            sessions_path: sessions_path.into(),
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            config_path: config_path.to_path_buf(),
            source,
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            config_path: config_path.to_path_buf(),
            source,
        })?;

        // `~` and `$VAR` are expanded on load, never on save
        if let Some(expanded) = expand_path(&config.sessions_path) {
            config.sessions_path = expanded;
        }

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    /// Use `sessions_dir` when given, else fall back to the config file.
    pub fn resolve(sessions_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::resolve_with(sessions_dir, Self::config_path())
    }

    fn resolve_with(sessions_dir: Option<PathBuf>, config_path: PathBuf) -> Result<Self, ConfigError> {
        let loaded = Self::load_from_path(&config_path)?;
        match (sessions_dir, loaded) {
            (Some(dir), Some(config)) => Ok(Self {
                sessions_path: dir,
                ..config
            }),
            (Some(dir), None) => Ok(Self::new(dir)),
            (None, Some(config)) => Ok(config),
            (None, None) => Err(ConfigError::MissingSessionsPath(config_path)),
        }
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/elicast");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }
}

fn expand_path(path: &Path) -> Option<PathBuf> {
    let path_str = path.to_string_lossy();
    shellexpand::full(&path_str)
        .ok()
        .map(|expanded| PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::env;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_config_path_is_expanded() {
        let path = Config::config_path();
        let path_str = path.to_string_lossy();

        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/elicast/config.toml"));
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load_from_path(temp_dir.path().join("nope.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_context_lines_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "sessions_path = \"/srv/casts\"\n");

        let config = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(config, Config::new("/srv/casts"));
        assert_eq!(config.context_lines, 3);
    }

    #[test]
    fn test_tilde_is_expanded_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "sessions_path = \"~/casts\"\ncontext_lines = 5\n");

        let config = Config::load_from_path(&path).unwrap().unwrap();
        let sessions = config.sessions_path.to_string_lossy();
        assert!(!sessions.starts_with('~'));
        assert!(sessions.ends_with("casts"));
        assert_eq!(config.context_lines, 5);
    }

    #[test]
    fn test_env_var_is_expanded_on_load() {
        unsafe {
            env::set_var("ELICAST_TEST_ROOT", "/data/elicast");
        }

        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "sessions_path = \"$ELICAST_TEST_ROOT/sessions\"\n");
        let config = Config::load_from_path(&path).unwrap().unwrap();

        assert_eq!(config.sessions_path, PathBuf::from("/data/elicast/sessions"));

        unsafe {
            env::remove_var("ELICAST_TEST_ROOT");
        }
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "context_lines = \"many\"\n");

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/elicast/config.toml");
        let config = Config {
            sessions_path: PathBuf::from("/tmp/casts"),
            context_lines: 8,
        };

        config.save_to_path(&path).unwrap();
        assert_eq!(Config::load_from_path(&path).unwrap(), Some(config));
    }

    #[test]
    fn test_resolve_prefers_the_argument() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "sessions_path = \"/from/config\"\ncontext_lines = 1\n");

        let config = Config::resolve_with(Some(PathBuf::from("/from/args")), path).unwrap();
        assert_eq!(config.sessions_path, PathBuf::from("/from/args"));
        assert_eq!(config.context_lines, 1);
    }

    #[test]
    fn test_resolve_without_anything_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("config.toml");

        let err = Config::resolve_with(None, missing).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSessionsPath(_)));

        let config = Config::resolve_with(Some(PathBuf::from("/x")), temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::new("/x"));
    }
}
