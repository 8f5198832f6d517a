use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "seedlab.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedlabConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub policy: PolicyLimits,
}

/// Limits applied by the acceptance policy and the reference classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyLimits {
    /// Hard ceiling on repetitions per analysis, regardless of validity
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: u32,
    /// CV threshold (percent) for regular seed lots
    #[serde(default = "default_fine_cv")]
    pub fine_cv_threshold: f64,
    /// CV threshold (percent) for coarse (chaffy) seed lots
    #[serde(default = "default_coarse_cv")]
    pub coarse_cv_threshold: f64,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            max_repetitions: default_max_repetitions(),
            fine_cv_threshold: default_fine_cv(),
            coarse_cv_threshold: default_coarse_cv(),
        }
    }
}

impl PolicyLimits {
    pub fn cv_threshold(&self, is_coarse_seed: bool) -> f64 {
        if is_coarse_seed {
            self.coarse_cv_threshold
        } else {
            self.fine_cv_threshold
        }
    }

    /// True once `total` repetitions reach the hard ceiling.
    pub fn ceiling_reached(&self, total: usize) -> bool {
        total >= self.max_repetitions as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_repetitions == 0 {
            bail!("policy.max_repetitions must be at least 1");
        }
        for (name, value) in [
            ("fine_cv_threshold", self.fine_cv_threshold),
            ("coarse_cv_threshold", self.coarse_cv_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("policy.{name} must be a positive number, got {value}");
            }
        }
        Ok(())
    }
}

// Defaults
fn default_max_repetitions() -> u32 {
    16
}
fn default_fine_cv() -> f64 {
    4.0
}
fn default_coarse_cv() -> f64 {
    6.0
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".seedlab"))
        .unwrap_or_else(|| PathBuf::from(".seedlab"))
}

impl SeedlabConfig {
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)?;
            let mut config: SeedlabConfig = serde_json::from_str(&raw)?;
            config.data_dir = data_dir.to_path_buf();
            config.policy.validate()?;
            log::debug!("Loaded configuration from {}", config_path.display());
            return Ok(config);
        }

        Ok(Self::default_with_dir(data_dir))
    }

    pub fn default_with_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            policy: PolicyLimits::default(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    pub fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(self.config_path(), raw)?;
        Ok(())
    }
}

impl Default for SeedlabConfig {
    fn default() -> Self {
        Self::default_with_dir(&default_data_dir())
    }
}
