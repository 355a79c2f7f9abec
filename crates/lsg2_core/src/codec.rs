//! Top-level encode / decode orchestration.

use tracing::debug;

use crate::classify;
use crate::config::EncoderConfig;
use crate::container::{self, SegmentEntry};
use crate::error::{LsgError, Result};
use crate::predictor;
use crate::segmenter;
use crate::series::TimeSeries;

/// Encode a series into a `.lsg2` container.
///
/// Fails with [`LsgError::InvalidInput`] on an empty series, non-finite
/// samples, non-positive `dt`, or an inconsistent config. There is no
/// partial encode.
pub fn encode(ts: &TimeSeries, cfg: &EncoderConfig) -> Result<Vec<u8>> {
    ts.validate()?;
    cfg.validate()?;

    let drafts = segmenter::segment_series(&ts.values, cfg);

    let mut entries = Vec::with_capacity(drafts.len());
    let mut residuals = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let window = &ts.values[draft.start..draft.end];
        let class = classify::classify(window, draft.fit.q_step, &cfg.classifier);
        entries.push(SegmentEntry {
            start_idx: draft.start as u64,
            end_idx: draft.end as u64,
            predictor: draft.fit.predictor,
            mean: draft.fit.params.mean,
            slope: draft.fit.params.slope,
            intercept: draft.fit.params.intercept,
            q_step: draft.fit.q_step,
            seed_value: draft.fit.params.seed_value,
            pattern: class.pattern,
            salience: class.salience,
        });
        residuals.push(draft.fit.residuals);
    }

    let bytes = container::write_container(
        ts.dt,
        &ts.t0,
        &ts.unit,
        &entries,
        &residuals,
        cfg.residual_coding,
    )?;
    debug!(
        points = ts.len(),
        segments = entries.len(),
        bytes = bytes.len(),
        "encoded series"
    );
    Ok(bytes)
}

/// Decode a `.lsg2` container back into a series.
///
/// Total over well-formed input; anything else fails fast with one of the
/// container error variants, never a panic.
pub fn decode(bytes: &[u8]) -> Result<TimeSeries> {
    let container = container::read_container(bytes)?;
    let table = container.table;

    let n_points = usize::try_from(table.n_points).map_err(|_| {
        LsgError::InconsistentCounts(format!(
            "n_points {} exceeds address space",
            table.n_points
        ))
    })?;

    let mut values = Vec::with_capacity(n_points);
    let mut scratch = Vec::new();
    for (entry, block) in table.entries.iter().zip(&container.residuals) {
        let params = predictor::ModelParams {
            mean: entry.mean,
            slope: entry.slope,
            intercept: entry.intercept,
            seed_value: entry.seed_value,
        };
        predictor::synthesize(entry.predictor, &params, entry.q_step, block, &mut scratch);
        values.extend_from_slice(&scratch);
    }
    debug!(
        points = values.len(),
        segments = table.entries.len(),
        "decoded container"
    );

    Ok(TimeSeries {
        values,
        dt: table.dt,
        t0: table.t0,
        unit: table.unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PredictorChoice, ResidualCoding, SegmentMode};
    use crate::series::Timestamp;

    fn sine(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (i as f64 * core::f64::consts::TAU / 40.0).sin())
            .collect()
    }

    #[test]
    fn test_roundtrip_preserves_length_and_metadata() {
        let ts = TimeSeries::new(sine(300), 0.25, Timestamp::from("2020-05-01T12:00:00Z"), "mV");
        for coding in [ResidualCoding::Raw, ResidualCoding::Varint] {
            let cfg = EncoderConfig {
                residual_coding: coding,
                ..EncoderConfig::default()
            };
            let decoded = decode(&encode(&ts, &cfg).unwrap()).unwrap();
            assert_eq!(decoded.len(), 300);
            assert_eq!(decoded.dt, 0.25);
            assert_eq!(decoded.t0, ts.t0);
            assert_eq!(decoded.unit, "mV");
        }
    }

    #[test]
    fn test_roundtrip_numeric_t0() {
        let ts = TimeSeries::new(vec![1.0, 2.0, 1.0], 1.0, Timestamp::Numeric(1234.5), "");
        let cfg = EncoderConfig {
            min_segment_length: 1,
            ..EncoderConfig::default()
        };
        let decoded = decode(&encode(&ts, &cfg).unwrap()).unwrap();
        assert_eq!(decoded.t0, Timestamp::Numeric(1234.5));
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        let cfg = EncoderConfig::default();
        let empty = TimeSeries::new(vec![], 1.0, Timestamp::default(), "V");
        assert!(matches!(encode(&empty, &cfg), Err(LsgError::InvalidInput(_))));

        let nan = TimeSeries::new(vec![1.0, f64::NAN], 1.0, Timestamp::default(), "V");
        assert!(matches!(encode(&nan, &cfg), Err(LsgError::InvalidInput(_))));
    }

    #[test]
    fn test_single_sample_series() {
        let ts = TimeSeries::new(vec![9.5], 1.0, Timestamp::default(), "V");
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            predictor: PredictorChoice::Auto,
            ..EncoderConfig::default()
        };
        let decoded = decode(&encode(&ts, &cfg).unwrap()).unwrap();
        assert_eq!(decoded.values, vec![9.5]);
    }

    #[test]
    fn test_reconstruction_error_within_q() {
        let mut state = 0xCAFE_F00D_u32;
        let values: Vec<f64> = sine(400)
            .into_iter()
            .map(|v| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                v + ((state >> 16) as f64 / 65536.0 - 0.5) * 0.2
            })
            .collect();
        let ts = TimeSeries::new(values, 1.0, Timestamp::default(), "V");
        let cfg = EncoderConfig {
            segment_mode: SegmentMode::Adaptive,
            predictor: PredictorChoice::Auto,
            mse_threshold: 0.05,
            ..EncoderConfig::default()
        };
        let bytes = encode(&ts, &cfg).unwrap();
        let decoded = decode(&bytes).unwrap();

        let table = crate::container::read_table(&bytes).unwrap();
        for entry in &table.entries {
            let (s, e) = (entry.start_idx as usize, entry.end_idx as usize);
            for (a, b) in ts.values[s..e].iter().zip(&decoded.values[s..e]) {
                assert!(
                    (a - b).abs() <= entry.q_step,
                    "sample error {} exceeds Q {}",
                    (a - b).abs(),
                    entry.q_step
                );
            }
        }
    }
}
