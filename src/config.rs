//! Configuration loading for the CLI binary (§12).
//!
//! The library core (`SessionDriver`) needs nothing but a binary path and an
//! argument vector (§6); this module is just one way for a host to produce
//! those two values from a TOML file instead of hardcoding them, following
//! the shape of the teacher's `config::Config`/`config::load`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_multiplexer_binary")]
    pub multiplexer_binary: PathBuf,

    #[serde(default)]
    pub multiplexer_args: Vec<String>,

    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multiplexer_binary: default_multiplexer_binary(),
            multiplexer_args: Vec::new(),
            log_file: None,
        }
    }
}

fn default_multiplexer_binary() -> PathBuf {
    PathBuf::from("tmux")
}

/// The default config file location, `$XDG_CONFIG_HOME/tmuxcc/config.toml`
/// (or the platform equivalent), matching the teacher's `~/.claustre`
/// resolution via `dirs`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("could not determine config directory")?;
    Ok(base.join("tmuxcc").join("config.toml"))
}

/// Parse `path` as TOML, or return defaults if it doesn't exist. Fields
/// absent from the file keep their defaults via `#[serde(default)]`.
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_returns_defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = load(&path).unwrap();
        assert_eq!(config.multiplexer_binary, PathBuf::from("tmux"));
        assert!(config.multiplexer_args.is_empty());
        assert!(config.log_file.is_none());
    }

    #[test]
    fn load_parses_partial_file_keeping_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, r#"multiplexer_args = ["-2"]"#).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.multiplexer_binary, PathBuf::from("tmux"));
        assert_eq!(config.multiplexer_args, vec!["-2".to_string()]);
    }

    #[test]
    fn load_overrides_multiplexer_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, r#"multiplexer_binary = "/opt/bin/tmux""#).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.multiplexer_binary, PathBuf::from("/opt/bin/tmux"));
    }
}
