use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::histogram::aggregator::FrameSelection;
use crate::histogram::inspector::DensityInspectorParams;
use crate::histogram::intensity_correction::CorrectionFactors;

/// User configuration of the histogram pipeline. Passed by reference into every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub alpha: f64,
    pub delta: f64,
    pub last_opened_dir: PathBuf,
    pub frames: FrameSelection,
    pub apply_corrections: bool,
    pub inspector: DensityInspectorParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            delta: 0.0,
            last_opened_dir: PathBuf::from("."),
            frames: FrameSelection::All,
            apply_corrections: true,
            inspector: DensityInspectorParams::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Io { path: path.to_path_buf(), reason: err.to_string() })?;
        let config: AnalysisConfig =
            serde_json::from_str(&text).map_err(|err| ConfigError::Parse { path: path.to_path_buf(), reason: err.to_string() })?;
        config.validate()?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let text = serde_json::to_string_pretty(self)
            .map_err(|err| ConfigError::Parse { path: path.to_path_buf(), reason: err.to_string() })?;
        fs::write(path, text).map_err(|err| ConfigError::Io { path: path.to_path_buf(), reason: err.to_string() })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alpha.is_finite() {
            return Err(ConfigError::InvalidFactor { name: "alpha", value: self.alpha });
        }
        if !self.delta.is_finite() {
            return Err(ConfigError::InvalidFactor { name: "delta", value: self.delta });
        }
        if let FrameSelection::FirstN(0) = self.frames {
            return Err(ConfigError::InvalidFrameSelection);
        }
        Ok(())
    }

    /// User-set leakage and direct excitation, with beta and gamma at identity.
    pub fn correction_factors(&self) -> CorrectionFactors {
        CorrectionFactors::new(self.alpha, self.delta)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("cannot access {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("invalid configuration in {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("correction factor {name} must be finite, got {value}")]
    InvalidFactor { name: &'static str, value: f64 },
    #[error("the number of first frames must be positive")]
    InvalidFrameSelection,
}
