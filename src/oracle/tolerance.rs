//! Tolerance configuration for oracle comparisons.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::window::WindowType;
use crate::error::{OracleError, Result};
use crate::pvoc::analyzer::AnalysisParams;

/// Thresholds a comparison must meet to pass, plus the STFT settings used to
/// measure spectral correlation.
///
/// No threshold is built into the comparator: copy or gain operations warrant
/// the [`strict`](ToleranceConfig::strict) preset, lossy spectral transforms
/// the looser [`spectral`](ToleranceConfig::spectral) one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Largest RMS sample difference that still passes.
    pub max_rms_difference: f64,
    /// Smallest mean spectral-magnitude correlation that still passes.
    pub min_spectral_correlation: f64,
    /// Optional cap on the largest single-sample difference.
    pub max_abs_difference: Option<f64>,
    /// Samples per channel the two lengths may differ by before failing.
    pub length_allowance: usize,
    /// FFT size for the spectral re-analysis.
    pub spectral_fft_size: usize,
    /// Hop size for the spectral re-analysis.
    pub spectral_hop_size: usize,
    /// Window for the spectral re-analysis.
    pub spectral_window: WindowType,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self::strict()
    }
}

impl ToleranceConfig {
    /// Near bit-exact operations: copy, gain, channel routing.
    pub fn strict() -> Self {
        Self {
            max_rms_difference: 1e-4,
            min_spectral_correlation: 0.999,
            max_abs_difference: None,
            length_allowance: 0,
            spectral_fft_size: 2048,
            spectral_hop_size: 512,
            spectral_window: WindowType::Hann,
        }
    }

    /// Lossy spectral transforms (blur, stretch, pitch-shift).
    pub fn spectral() -> Self {
        Self {
            max_rms_difference: 0.1,
            min_spectral_correlation: 0.95,
            max_abs_difference: None,
            length_allowance: 2048,
            spectral_fft_size: 2048,
            spectral_hop_size: 512,
            spectral_window: WindowType::Hann,
        }
    }

    /// Set the RMS difference threshold.
    pub fn with_max_rms_difference(mut self, value: f64) -> Self {
        self.max_rms_difference = value;
        self
    }

    /// Set the spectral correlation threshold.
    pub fn with_min_spectral_correlation(mut self, value: f64) -> Self {
        self.min_spectral_correlation = value;
        self
    }

    /// Cap the largest single-sample difference.
    pub fn with_max_abs_difference(mut self, value: f64) -> Self {
        self.max_abs_difference = Some(value);
        self
    }

    /// Set the length allowance in samples per channel.
    pub fn with_length_allowance(mut self, samples: usize) -> Self {
        self.length_allowance = samples;
        self
    }

    /// Set the STFT used for spectral correlation.
    pub fn with_spectral_analysis(
        mut self,
        fft_size: usize,
        hop_size: usize,
        window: WindowType,
    ) -> Self {
        self.spectral_fft_size = fft_size;
        self.spectral_hop_size = hop_size;
        self.spectral_window = window;
        self
    }

    /// STFT parameters for the spectral re-analysis.
    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams::new(
            self.spectral_fft_size,
            self.spectral_hop_size,
            self.spectral_window,
        )
    }

    /// Validate all thresholds and the spectral analysis settings.
    pub fn validate(&self) -> Result<()> {
        if !self.max_rms_difference.is_finite() || self.max_rms_difference < 0.0 {
            return Err(OracleError::InvalidParameter(format!(
                "max_rms_difference must be finite and non-negative, got {}",
                self.max_rms_difference
            )));
        }
        if !(-1.0..=1.0).contains(&self.min_spectral_correlation) {
            return Err(OracleError::InvalidParameter(format!(
                "min_spectral_correlation must lie in [-1, 1], got {}",
                self.min_spectral_correlation
            )));
        }
        if let Some(max_abs) = self.max_abs_difference {
            if !max_abs.is_finite() || max_abs < 0.0 {
                return Err(OracleError::InvalidParameter(format!(
                    "max_abs_difference must be finite and non-negative, got {}",
                    max_abs
                )));
            }
        }
        self.analysis_params().validate().map_err(|e| match e {
            OracleError::InvalidInput(msg) => OracleError::InvalidParameter(msg),
            other => other,
        })?;
        Ok(())
    }

    /// True when every threshold is at least as tight as `other`'s.
    pub fn is_at_least_as_strict_as(&self, other: &ToleranceConfig) -> bool {
        let abs_ok = match (self.max_abs_difference, other.max_abs_difference) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b,
        };
        self.max_rms_difference <= other.max_rms_difference
            && self.min_spectral_correlation >= other.min_spectral_correlation
            && self.length_allowance <= other.length_allowance
            && abs_ok
    }

    /// Parses a JSON tolerance config; missing fields take strict defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ToleranceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a JSON tolerance config from a file.
    pub fn read_json(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Writes the config as JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
