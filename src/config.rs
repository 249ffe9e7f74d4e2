// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::keys::WriteMode;

/// Runtime settings. Every field has a default, so an empty or partial YAML file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Backing file of the access-key store.
    pub keys_csv: PathBuf,
    /// Semicolon-delimited indicator file.
    pub indicators_csv: PathBuf,
    pub write_mode: WriteMode,
    /// How many rows the "recent keys" listing shows.
    pub recent_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keys_csv: PathBuf::from("access_keys.csv"),
            indicators_csv: PathBuf::from("consulta.csv"),
            write_mode: WriteMode::Rewrite,
            recent_limit: 5,
        }
    }
}

impl Settings {
    /// Defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let s = Settings::from_yaml("write_mode: append\nrecent_limit: 10\n")?;
        assert_eq!(s.write_mode, WriteMode::Append);
        assert_eq!(s.recent_limit, 10);
        assert_eq!(s.keys_csv, PathBuf::from("access_keys.csv"));
        Ok(())
    }

    #[test]
    fn empty_or_missing_config_is_default() -> Result<()> {
        assert_eq!(Settings::from_yaml("")?, Settings::default());
        assert_eq!(Settings::load(None)?, Settings::default());
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::from_yaml("csv_file: x.csv\n").is_err());
        assert!(Settings::from_yaml("write_mode: journal\n").is_err());
    }

    #[test]
    fn loads_from_file() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("fiscal-bi.yaml");
        fs::write(&path, "keys_csv: /data/keys.csv\nindicators_csv: ind.csv\n")?;
        let s = Settings::load(Some(path.as_path()))?;
        assert_eq!(s.keys_csv, PathBuf::from("/data/keys.csv"));
        assert_eq!(s.indicators_csv, PathBuf::from("ind.csv"));

        assert!(Settings::load(Some(tmp.path().join("none.yaml").as_path())).is_err());
        Ok(())
    }
}
