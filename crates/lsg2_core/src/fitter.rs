//! Fit one predictor over one window: parameters, quantization step,
//! quantized residuals, and the post-decode error the rest of the pipeline
//! ranks candidates by.

use crate::config::{EncoderConfig, PredictorChoice};
use crate::predictor::{self, ModelParams, PredictorType};

/// Everything the container needs to persist for one segment, plus the
/// post-decode MSE used for predictor selection and adaptive growth.
#[derive(Debug, Clone)]
pub struct SegmentFit {
    pub predictor: PredictorType,
    pub params: ModelParams,
    pub q_step: f64,
    pub residuals: Vec<i32>,
    pub post_mse: f64,
}

/// Auto-selection priority. On an exact post-MSE tie the earlier entry wins:
/// a line explains more than a flat mean, and both beat the stateful walk.
const AUTO_PRIORITY: [PredictorType; 3] = [
    PredictorType::Linear,
    PredictorType::Mean,
    PredictorType::Rw,
];

#[inline]
fn quantize_one(residual: f64, q_step: f64) -> i32 {
    (residual / q_step)
        .round_ties_even()
        .clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Population standard deviation about the sample mean.
fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.sqrt()
}

/// Fit `predictor` over `x` and quantize its residuals.
///
/// The step is `Q = max(c_q * sigma, q_min)` with `sigma` estimated from the
/// raw residuals. For `rw` the quantization pass then runs closed-loop:
/// each residual is taken against the previous *reconstructed* sample, the
/// same recurrence the decoder applies, so quantization error cannot drift
/// across the segment.
pub fn fit_window(x: &[f64], predictor: PredictorType, cfg: &EncoderConfig) -> SegmentFit {
    let params = predictor::fit(predictor, x);
    let len = x.len();

    let raw_residuals: Vec<f64> = match predictor {
        PredictorType::Mean | PredictorType::Linear => (0..len)
            .map(|i| x[i] - predictor::predict_at(predictor, &params, i))
            .collect(),
        PredictorType::Rw => {
            let mut prev = params.seed_value;
            x.iter()
                .map(|&v| {
                    let d = v - prev;
                    prev = v;
                    d
                })
                .collect()
        }
    };

    let q_step = (cfg.c_q * stddev(&raw_residuals)).max(cfg.q_min);

    let residuals: Vec<i32> = match predictor {
        PredictorType::Mean | PredictorType::Linear => raw_residuals
            .iter()
            .map(|&r| quantize_one(r, q_step))
            .collect(),
        PredictorType::Rw => {
            let mut prev = params.seed_value;
            x.iter()
                .map(|&v| {
                    let q = quantize_one(v - prev, q_step);
                    prev += q as f64 * q_step;
                    q
                })
                .collect()
        }
    };

    let mut reconstructed = Vec::new();
    predictor::synthesize(predictor, &params, q_step, &residuals, &mut reconstructed);
    let post_mse = if len == 0 {
        0.0
    } else {
        x.iter()
            .zip(&reconstructed)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            / len as f64
    };

    SegmentFit {
        predictor,
        params,
        q_step,
        residuals,
        post_mse,
    }
}

/// Fit the window under the caller's predictor choice. `Auto` fits all three
/// models and keeps the lowest post-decode MSE.
pub fn fit_choice(x: &[f64], choice: PredictorChoice, cfg: &EncoderConfig) -> SegmentFit {
    match choice {
        PredictorChoice::Mean => fit_window(x, PredictorType::Mean, cfg),
        PredictorChoice::Linear => fit_window(x, PredictorType::Linear, cfg),
        PredictorChoice::Rw => fit_window(x, PredictorType::Rw, cfg),
        PredictorChoice::Auto => {
            let mut best: Option<SegmentFit> = None;
            for predictor in AUTO_PRIORITY {
                let fit = fit_window(x, predictor, cfg);
                let better = match &best {
                    None => true,
                    Some(b) => fit.post_mse < b.post_mse,
                };
                if better {
                    best = Some(fit);
                }
            }
            // AUTO_PRIORITY is non-empty, so a fit is always produced.
            best.unwrap_or_else(|| fit_window(x, PredictorType::Mean, cfg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;

    fn cfg() -> EncoderConfig {
        EncoderConfig::default()
    }

    #[test]
    fn test_constant_window_has_zero_residuals_and_floor_q() {
        let x = vec![7.0; 64];
        for p in [PredictorType::Mean, PredictorType::Linear, PredictorType::Rw] {
            let fit = fit_window(&x, p, &cfg());
            assert_eq!(fit.q_step, cfg().q_min);
            assert!(fit.residuals.iter().all(|&q| q == 0), "{p:?}");
            assert_eq!(fit.post_mse, 0.0, "{p:?}");
        }
    }

    #[test]
    fn test_linear_window_is_near_exact() {
        let x: Vec<f64> = (0..100).map(|i| 1.5 + 0.1 * i as f64).collect();
        let fit = fit_window(&x, PredictorType::Linear, &cfg());
        assert_eq!(fit.q_step, cfg().q_min);
        assert!(fit.post_mse < 1e-12);
    }

    #[test]
    fn test_auto_prefers_linear_on_tie() {
        // Constant data: all three predictors reach MSE 0, the tie-break
        // must keep linear.
        let x = vec![3.0; 40];
        let fit = fit_choice(&x, PredictorChoice::Auto, &cfg());
        assert_eq!(fit.predictor, PredictorType::Linear);
    }

    #[test]
    fn test_auto_picks_minimum_post_mse() {
        // Noisy steps favour the random walk over a single global line.
        let mut x = Vec::new();
        for block in 0..8 {
            let level = if block % 2 == 0 { 0.0 } else { 10.0 };
            x.extend(std::iter::repeat(level).take(8));
        }
        let auto = fit_choice(&x, PredictorChoice::Auto, &cfg());
        for p in [PredictorType::Mean, PredictorType::Linear, PredictorType::Rw] {
            let forced = fit_window(&x, p, &cfg());
            assert!(auto.post_mse <= forced.post_mse + 1e-15);
        }
    }

    #[test]
    fn test_reconstruction_error_bounded_by_half_q() {
        // Deterministic pseudo-noise, no external RNG.
        let mut state = 0x1234_5678_u32;
        let x: Vec<f64> = (0..256)
            .map(|i| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                (i as f64 * 0.05).sin() + ((state >> 16) as f64 / 65536.0 - 0.5)
            })
            .collect();

        for p in [PredictorType::Mean, PredictorType::Linear, PredictorType::Rw] {
            let fit = fit_window(&x, p, &cfg());
            let mut rec = Vec::new();
            crate::predictor::synthesize(p, &fit.params, fit.q_step, &fit.residuals, &mut rec);
            let bound = fit.q_step / 2.0 + 1e-12;
            for (a, b) in x.iter().zip(&rec) {
                assert!((a - b).abs() <= bound, "{p:?}: |{a} - {b}| > {bound}");
            }
        }
    }

    #[test]
    fn test_single_point_window() {
        let fit = fit_window(&[42.0], PredictorType::Mean, &cfg());
        assert_eq!(fit.residuals, vec![0]);
        assert_eq!(fit.q_step, cfg().q_min);
        assert_eq!(fit.post_mse, 0.0);
    }
}
