//! Qualitative tags for a segment: pattern class and salience level.
//!
//! Tags are computed at encode time from the actual samples and persisted in
//! the segment table, which keeps containers inspectable without decoding a
//! single residual.

use serde::{Deserialize, Serialize};

use crate::config::ClassifierThresholds;
use crate::predictor::window_stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Flat = 0,
    Trend = 1,
    Oscillation = 2,
    Noisy = 3,
}

impl Pattern {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Pattern::Flat),
            1 => Some(Pattern::Trend),
            2 => Some(Pattern::Oscillation),
            3 => Some(Pattern::Noisy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pattern::Flat => "flat",
            Pattern::Trend => "trend",
            Pattern::Oscillation => "oscillation",
            Pattern::Noisy => "noisy",
        }
    }
}

/// Tag triple for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentClass {
    pub pattern: Pattern,
    /// 0 = negligible, 1 = ordinary, 2 = prominent.
    pub salience: u8,
    /// Sum of squared demeaned samples over the segment.
    pub energy: f64,
}

/// Count sign flips between consecutive non-zero first differences.
/// Zero differences carry the previous sign forward.
fn sign_changes(x: &[f64]) -> usize {
    let mut flips = 0;
    let mut last_sign = 0i8;
    for pair in x.windows(2) {
        let d = pair[1] - pair[0];
        let sign = if d > 0.0 {
            1
        } else if d < 0.0 {
            -1
        } else {
            0
        };
        if sign != 0 {
            if last_sign != 0 && sign != last_sign {
                flips += 1;
            }
            last_sign = sign;
        }
    }
    flips
}

/// Classify a segment from its samples and quantization step.
///
/// `q_step` acts as the noise proxy: frequent sign flips only count as an
/// oscillation while the residual step stays small against the per-point
/// energy, otherwise the segment is just noisy.
pub fn classify(x: &[f64], q_step: f64, thresholds: &ClassifierThresholds) -> SegmentClass {
    let len = x.len();
    if len == 0 {
        return SegmentClass {
            pattern: Pattern::Flat,
            salience: 0,
            energy: 0.0,
        };
    }

    let stats = window_stats(x);
    let energy: f64 = x.iter().map(|v| (v - stats.mean) * (v - stats.mean)).sum();
    let per_point = energy / len as f64;
    let slope_mag = stats.slope.abs();

    let pattern = if per_point < thresholds.e_flat && slope_mag < thresholds.s_flat {
        Pattern::Flat
    } else if slope_mag >= thresholds.s_trend {
        Pattern::Trend
    } else {
        let flips = sign_changes(x) as f64;
        let oscillating = flips > thresholds.c_osc * (len.saturating_sub(1)) as f64;
        if oscillating && q_step * q_step < per_point {
            Pattern::Oscillation
        } else {
            Pattern::Noisy
        }
    };

    let salience = if per_point < thresholds.e_low {
        0
    } else if per_point >= thresholds.e_high {
        2
    } else {
        1
    };

    SegmentClass {
        pattern,
        salience,
        energy,
    }
}
