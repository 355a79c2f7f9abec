//! Per-segment parametric predictors.
//!
//! The set is closed by the container format: `mean`, `linear` and `rw`
//! (random walk). A small sum type rather than a trait object keeps the wire
//! mapping explicit and exhaustive.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorType {
    Mean = 0,
    Linear = 1,
    Rw = 2,
}

impl PredictorType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PredictorType::Mean),
            1 => Some(PredictorType::Linear),
            2 => Some(PredictorType::Rw),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PredictorType::Mean => "mean",
            PredictorType::Linear => "linear",
            PredictorType::Rw => "rw",
        }
    }
}

/// Model parameters as persisted in a segment table entry.
///
/// All four fields are always materialized; which ones drive reconstruction
/// depends on the predictor:
///
/// * `mean`: the prediction for `mean`, reporting-only otherwise
/// * `slope` / `intercept`: the line for `linear` (for `rw` the slope is the
///   endpoint slope `(x_last - x_0) / max(L-1, 1)`)
/// * `seed_value`: first reconstructed sample for `rw`; equals the intercept
///   for `linear`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub mean: f64,
    pub slope: f64,
    pub intercept: f64,
    pub seed_value: f64,
}

/// Single-pass summary of a window: mean plus ordinary-least-squares line
/// over the local index `i = 0..len`.
#[derive(Debug, Clone, Copy)]
pub struct WindowStats {
    pub mean: f64,
    pub slope: f64,
    pub intercept: f64,
}

/// Mean and OLS line of `x` against `t = 0..len`.
///
/// Uses the closed forms for `sum(t)` and `sum(t^2)` so only one pass over
/// the samples is needed.
pub fn window_stats(x: &[f64]) -> WindowStats {
    let n = x.len();
    if n == 0 {
        return WindowStats {
            mean: 0.0,
            slope: 0.0,
            intercept: 0.0,
        };
    }
    let nf = n as f64;
    let sum_x: f64 = x.iter().sum();
    let mean = sum_x / nf;
    if n == 1 {
        return WindowStats {
            mean,
            slope: 0.0,
            intercept: mean,
        };
    }

    let sum_t = (nf - 1.0) * nf / 2.0;
    let sum_t2 = (nf - 1.0) * nf * (2.0 * nf - 1.0) / 6.0;
    let sum_tx: f64 = x
        .iter()
        .enumerate()
        .map(|(i, v)| i as f64 * v)
        .sum();

    let denom = nf * sum_t2 - sum_t * sum_t;
    let slope = if denom == 0.0 {
        0.0
    } else {
        (nf * sum_tx - sum_t * sum_x) / denom
    };
    let intercept = mean - slope * (sum_t / nf);

    WindowStats {
        mean,
        slope,
        intercept,
    }
}

/// Fit `predictor` over the window and materialize the full parameter set.
pub fn fit(predictor: PredictorType, x: &[f64]) -> ModelParams {
    let stats = window_stats(x);
    let first = x.first().copied().unwrap_or(0.0);
    match predictor {
        PredictorType::Mean => ModelParams {
            mean: stats.mean,
            slope: stats.slope,
            intercept: stats.intercept,
            seed_value: first,
        },
        PredictorType::Linear => ModelParams {
            mean: stats.mean,
            slope: stats.slope,
            intercept: stats.intercept,
            seed_value: stats.intercept,
        },
        PredictorType::Rw => {
            let last = x.last().copied().unwrap_or(0.0);
            let span = (x.len().saturating_sub(1)).max(1) as f64;
            ModelParams {
                mean: stats.mean,
                slope: (last - first) / span,
                intercept: stats.intercept,
                seed_value: first,
            }
        }
    }
}

/// Open-loop prediction for index `i`. Only meaningful for `mean` and
/// `linear`; the random walk predicts from the previous *reconstructed*
/// sample and is handled inside [`synthesize`].
#[inline]
pub fn predict_at(predictor: PredictorType, params: &ModelParams, i: usize) -> f64 {
    match predictor {
        PredictorType::Mean => params.mean,
        PredictorType::Linear => params.intercept + params.slope * i as f64,
        PredictorType::Rw => params.seed_value,
    }
}

/// Decode-side reconstruction: predictor output plus dequantized residuals.
///
/// This is the one reconstruction routine in the crate; the encoder estimates
/// post-decode error by calling it too, so what the fitter scores is exactly
/// what a decoder will produce.
pub fn synthesize(
    predictor: PredictorType,
    params: &ModelParams,
    q_step: f64,
    residuals: &[i32],
    out: &mut Vec<f64>,
) {
    out.clear();
    out.reserve(residuals.len());
    match predictor {
        PredictorType::Mean | PredictorType::Linear => {
            for (i, &q) in residuals.iter().enumerate() {
                out.push(predict_at(predictor, params, i) + q as f64 * q_step);
            }
        }
        PredictorType::Rw => {
            let mut prev = params.seed_value;
            for &q in residuals {
                let value = prev + q as f64 * q_step;
                out.push(value);
                prev = value;
            }
        }
    }
}
