//! Store configuration.
//!
//! Sources, lowest precedence first:
//! 1. Default values
//! 2. A YAML file
//! 3. Environment variables with the `QKIT_` prefix

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings the store needs to place and stamp new files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for generated file paths.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,

    /// Person running the measurement, used by folder structure 2.
    #[serde(default)]
    pub user: Option<String>,

    /// Run identifier, used by folder structure 2.
    #[serde(default)]
    pub run_id: Option<String>,

    /// 1: `YYYYMMDD/HHMMSS_name`, 2: `RUN_ID/user/UUID_name`.
    #[serde(default = "default_datafolder_structure")]
    pub datafolder_structure: u8,

    /// Open files in single-writer/multiple-reader mode.
    #[serde(default)]
    pub swmr: bool,
}

fn default_datadir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qkit_data")
}

fn default_datafolder_structure() -> u8 {
    1
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            user: None,
            run_id: None,
            datafolder_structure: default_datafolder_structure(),
            swmr: false,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl StoreConfig {
    /// Load a YAML file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: StoreConfig = serde_yaml_ng::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `QKIT_DATADIR`, `QKIT_USER`, `QKIT_RUN_ID`,
    /// `QKIT_DATAFOLDER_STRUCTURE` and `QKIT_SWMR`. Unparsable numbers and
    /// booleans are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("QKIT_DATADIR") {
            self.datadir = PathBuf::from(dir);
        }
        if let Some(user) = lookup("QKIT_USER") {
            self.user = Some(user);
        }
        if let Some(run_id) = lookup("QKIT_RUN_ID") {
            self.run_id = Some(run_id);
        }
        if let Some(structure) = lookup("QKIT_DATAFOLDER_STRUCTURE") {
            if let Ok(val) = structure.trim().parse() {
                self.datafolder_structure = val;
            }
        }
        if let Some(swmr) = lookup("QKIT_SWMR") {
            if let Some(val) = parse_bool(&swmr) {
                self.swmr = val;
            }
        }
        self
    }

    /// File (when given), then environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.datafolder_structure, 1 | 2) {
            return Err(Error::Config(format!(
                "datafolder_structure must be 1 or 2, got {}",
                self.datafolder_structure
            )));
        }
        if self.datadir.as_os_str().is_empty() {
            return Err(Error::Config("datadir must not be empty".into()));
        }
        Ok(())
    }
}
