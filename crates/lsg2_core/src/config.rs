//! Immutable encoder configuration.
//!
//! Everything that steers an encode lives here, including the classifier
//! thresholds: there is no module-level tuning state, so two encodes with the
//! same config and input produce the same bytes.

use serde::{Deserialize, Serialize};

use crate::error::{LsgError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMode {
    Fixed,
    Adaptive,
}

/// Predictor requested by the caller. `Auto` selects per segment by
/// post-decode MSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorChoice {
    Mean,
    Linear,
    Rw,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidualCoding {
    /// Little-endian `i32` per residual.
    Raw,
    /// ZigZag + 7-bit varint per residual.
    Varint,
}

/// Thresholds for the pattern / salience classifier.
///
/// `e_flat`, `e_low` and `e_high` gate on per-point energy (`energy / len`),
/// `s_flat` / `s_trend` on the magnitude of the fitted slope, `c_osc` on the
/// fraction of first-difference sign flips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    pub e_flat: f64,
    pub s_flat: f64,
    pub s_trend: f64,
    pub c_osc: f64,
    pub e_low: f64,
    pub e_high: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            e_flat: 1e-2,
            s_flat: 1e-2,
            s_trend: 5e-2,
            c_osc: 0.5,
            e_low: 5e-2,
            e_high: 1.0,
        }
    }
}

/// Encoder configuration.
///
/// | option | default |
/// |---|---|
/// | `segment_mode` | `fixed` |
/// | `segment_length` | 64 (fixed mode, clamped into `[min, max]`) |
/// | `min_segment_length` | 32 |
/// | `max_segment_length` | 128 |
/// | `mse_threshold` | 0.5 |
/// | `predictor` | `linear` |
/// | `residual_coding` | `raw` |
/// | `q_min` | 1e-6 |
/// | `c_q` | 0.25 |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub segment_mode: SegmentMode,
    /// Window length for `fixed` mode.
    pub segment_length: u32,
    /// Minimum segment length (adaptive seed length; also the fixed-mode
    /// clamp floor).
    pub min_segment_length: u32,
    /// Maximum segment length.
    pub max_segment_length: u32,
    /// Post-decode MSE a candidate window must stay under to keep growing
    /// (adaptive mode only).
    pub mse_threshold: f64,
    pub predictor: PredictorChoice,
    pub residual_coding: ResidualCoding,
    /// Floor on the quantization step.
    pub q_min: f64,
    /// Multiplier on the residual standard deviation when deriving `Q`.
    pub c_q: f64,
    pub classifier: ClassifierThresholds,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            segment_mode: SegmentMode::Fixed,
            segment_length: 64,
            min_segment_length: 32,
            max_segment_length: 128,
            mse_threshold: 0.5,
            predictor: PredictorChoice::Linear,
            residual_coding: ResidualCoding::Raw,
            q_min: 1e-6,
            c_q: 0.25,
            classifier: ClassifierThresholds::default(),
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_segment_length == 0 {
            return Err(LsgError::InvalidInput(String::from(
                "min_segment_length must be >= 1",
            )));
        }
        if self.max_segment_length < self.min_segment_length {
            return Err(LsgError::InvalidInput(format!(
                "max_segment_length {} < min_segment_length {}",
                self.max_segment_length, self.min_segment_length
            )));
        }
        if self.segment_length == 0 {
            return Err(LsgError::InvalidInput(String::from(
                "segment_length must be >= 1",
            )));
        }
        if !(self.mse_threshold.is_finite() && self.mse_threshold > 0.0) {
            return Err(LsgError::InvalidInput(format!(
                "mse_threshold must be positive, got {}",
                self.mse_threshold
            )));
        }
        if !(self.q_min.is_finite() && self.q_min > 0.0) {
            return Err(LsgError::InvalidInput(format!(
                "q_min must be positive, got {}",
                self.q_min
            )));
        }
        if !(self.c_q.is_finite() && self.c_q > 0.0) {
            return Err(LsgError::InvalidInput(format!(
                "c_q must be positive, got {}",
                self.c_q
            )));
        }
        Ok(())
    }

    /// Fixed-mode window length, clamped into `[min, max]`.
    pub fn fixed_window(&self) -> usize {
        self.segment_length
            .clamp(self.min_segment_length, self.max_segment_length) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EncoderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_lengths() {
        let cfg = EncoderConfig {
            min_segment_length: 16,
            max_segment_length: 8,
            ..EncoderConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_thresholds() {
        let cfg = EncoderConfig {
            mse_threshold: 0.0,
            ..EncoderConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = EncoderConfig {
            q_min: -1.0,
            ..EncoderConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_fixed_window_clamps() {
        let cfg = EncoderConfig {
            segment_length: 7,
            min_segment_length: 16,
            max_segment_length: 32,
            ..EncoderConfig::default()
        };
        assert_eq!(cfg.fixed_window(), 16);

        let cfg = EncoderConfig {
            segment_length: 1000,
            min_segment_length: 16,
            max_segment_length: 32,
            ..EncoderConfig::default()
        };
        assert_eq!(cfg.fixed_window(), 32);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            predictor: PredictorChoice::Auto,
            residual_coding: ResidualCoding::Varint,
            ..EncoderConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"adaptive\""));
        assert!(json.contains("\"auto\""));
        let back: EncoderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
