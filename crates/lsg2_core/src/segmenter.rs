//! Partition a series into contiguous segments.
//!
//! Two strategies: fixed-length windows, and adaptive windows grown one
//! sample at a time while the post-decode MSE of the refit model stays under
//! the configured threshold. Both tile `[0, n)` exactly by construction.

use tracing::trace;

use crate::config::{EncoderConfig, SegmentMode};
use crate::fitter::{fit_choice, SegmentFit};

/// A frozen segment with its fitted model, prior to classification.
#[derive(Debug, Clone)]
pub struct DraftSegment {
    /// Half-open range `[start, end)` into the series.
    pub start: usize,
    pub end: usize,
    pub fit: SegmentFit,
}

impl DraftSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Segment the full series under the configured mode.
pub fn segment_series(values: &[f64], cfg: &EncoderConfig) -> Vec<DraftSegment> {
    match cfg.segment_mode {
        SegmentMode::Fixed => segment_fixed(values, cfg),
        SegmentMode::Adaptive => segment_adaptive(values, cfg),
    }
}

fn segment_fixed(values: &[f64], cfg: &EncoderConfig) -> Vec<DraftSegment> {
    let n = values.len();
    let window = cfg.fixed_window();
    let mut segments = Vec::with_capacity(n.div_ceil(window));
    let mut start = 0;
    while start < n {
        let end = (start + window).min(n);
        let fit = fit_choice(&values[start..end], cfg.predictor, cfg);
        segments.push(DraftSegment { start, end, fit });
        start = end;
    }
    segments
}

/// Grow each candidate from `min_segment_length`, one sample at a time,
/// keeping the last window whose refit model stayed under `mse_threshold`.
/// A candidate whose very first window already exceeds the threshold is
/// frozen at the seed length regardless, so the scan always makes progress.
fn segment_adaptive(values: &[f64], cfg: &EncoderConfig) -> Vec<DraftSegment> {
    let n = values.len();
    let min_len = cfg.min_segment_length as usize;
    let max_len = cfg.max_segment_length as usize;

    let mut segments = Vec::new();
    let mut start = 0;
    while start < n {
        // The tail may be shorter than min_len; it still becomes a segment.
        let mut len = min_len.min(n - start);
        let mut fit = fit_choice(&values[start..start + len], cfg.predictor, cfg);

        while fit.post_mse <= cfg.mse_threshold && len < max_len && start + len + 1 <= n {
            let grown = fit_choice(&values[start..start + len + 1], cfg.predictor, cfg);
            if grown.post_mse > cfg.mse_threshold {
                break;
            }
            len += 1;
            fit = grown;
        }

        trace!(
            start,
            len,
            post_mse = fit.post_mse,
            predictor = fit.predictor.as_str(),
            "froze adaptive segment"
        );
        segments.push(DraftSegment {
            start,
            end: start + len,
            fit,
        });
        start += len;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PredictorChoice, SegmentMode};
    use crate::predictor::PredictorType;

    fn assert_tiles(segments: &[DraftSegment], n: usize) {
        assert!(!segments.is_empty());
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments.last().unwrap().end, n);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for seg in segments {
            assert!(seg.end > seg.start);
            assert_eq!(seg.fit.residuals.len(), seg.len());
        }
    }

    #[test]
    fn test_fixed_tiles_exactly_with_short_tail() {
        let values = vec![0.0; 150];
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Fixed,
            segment_length: 64,
            ..EncoderConfig::default()
        };
        let segments = segment_series(&values, &cfg);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].len(), 22);
        assert_tiles(&segments, 150);
    }

    #[test]
    fn test_adaptive_tiles_exactly() {
        let values: Vec<f64> = (0..500).map(|i| (i as f64 * 0.13).sin()).collect();
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            predictor: PredictorChoice::Auto,
            mse_threshold: 0.05,
            ..EncoderConfig::default()
        };
        let segments = segment_series(&values, &cfg);
        assert_tiles(&segments, 500);
    }

    #[test]
    fn test_adaptive_respects_threshold_or_min_len() {
        let mut state = 0xDEAD_BEEF_u32;
        let values: Vec<f64> = (0..400)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                (state >> 16) as f64 / 6553.6
            })
            .collect();
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            predictor: PredictorChoice::Auto,
            mse_threshold: 0.01,
            min_segment_length: 16,
            ..EncoderConfig::default()
        };
        let segments = segment_series(&values, &cfg);
        assert_tiles(&segments, 400);
        for seg in &segments {
            assert!(
                seg.fit.post_mse <= cfg.mse_threshold || seg.len() <= 16,
                "segment [{}, {}) broke the growth contract: mse={}",
                seg.start,
                seg.end,
                seg.fit.post_mse
            );
        }
    }

    #[test]
    fn test_adaptive_grows_to_max_on_smooth_data() {
        let values: Vec<f64> = (0..300).map(|i| 0.1 * i as f64).collect();
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            predictor: PredictorChoice::Linear,
            min_segment_length: 32,
            max_segment_length: 128,
            ..EncoderConfig::default()
        };
        let segments = segment_series(&values, &cfg);
        assert_tiles(&segments, 300);
        assert_eq!(segments[0].len(), 128);
    }

    #[test]
    fn test_single_point_series() {
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            ..EncoderConfig::default()
        };
        let segments = segment_series(&[5.0], &cfg);
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (0, 1));
    }

    #[test]
    fn test_constant_series_is_one_segment_up_to_max() {
        let values = vec![7.0; 64];
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            predictor: PredictorChoice::Auto,
            ..EncoderConfig::default()
        };
        let segments = segment_series(&values, &cfg);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 64);
        assert_eq!(segments[0].fit.predictor, PredictorType::Linear);
        assert!(segments[0].fit.residuals.iter().all(|&q| q == 0));
    }
}
