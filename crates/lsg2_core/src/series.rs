//! The in-memory representation of a univariate, uniformly-sampled series.

use serde::{Deserialize, Serialize};

use crate::error::{LsgError, Result};

/// Series origin timestamp.
///
/// Sources hand us either an ISO-like string or a numeric epoch; the codec
/// never interprets the value, it only round-trips it through the context
/// block verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Text(String),
    Numeric(f64),
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Text(String::from("1970-01-01T00:00:00Z"))
    }
}

impl From<&str> for Timestamp {
    fn from(s: &str) -> Self {
        Timestamp::Text(String::from(s))
    }
}

impl From<f64> for Timestamp {
    fn from(v: f64) -> Self {
        Timestamp::Numeric(v)
    }
}

/// A uniformly-sampled series of `f64` values plus its sampling metadata.
///
/// `dt` is the sample period, `t0` the opaque origin, `unit` a short symbolic
/// label. Values are owned; an encode never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub values: Vec<f64>,
    pub dt: f64,
    pub t0: Timestamp,
    pub unit: String,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>, dt: f64, t0: Timestamp, unit: impl Into<String>) -> Self {
        Self {
            values,
            dt,
            t0,
            unit: unit.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the series is encodable: at least one sample, every sample
    /// finite, and a strictly positive sample period.
    pub fn validate(&self) -> Result<()> {
        if self.values.is_empty() {
            return Err(LsgError::InvalidInput(String::from("series is empty")));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(LsgError::InvalidInput(format!(
                "dt must be a positive finite number, got {}",
                self.dt
            )));
        }
        if let Some(idx) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(LsgError::InvalidInput(format!(
                "non-finite sample at index {idx}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_plain_series() {
        let ts = TimeSeries::new(vec![1.0, 2.0, 3.0], 0.5, Timestamp::default(), "V");
        assert!(ts.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty() {
        let ts = TimeSeries::new(vec![], 1.0, Timestamp::default(), "V");
        assert!(matches!(ts.validate(), Err(LsgError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_nan_and_inf() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let ts = TimeSeries::new(vec![0.0, bad], 1.0, Timestamp::default(), "V");
            assert!(matches!(ts.validate(), Err(LsgError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_validate_rejects_bad_dt() {
        for dt in [0.0, -1.0, f64::NAN] {
            let ts = TimeSeries::new(vec![1.0], dt, Timestamp::default(), "V");
            assert!(matches!(ts.validate(), Err(LsgError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_timestamp_json_shapes() {
        let text: Timestamp = serde_json::from_str("\"2021-01-01T00:00:00Z\"").unwrap();
        assert_eq!(text, Timestamp::Text(String::from("2021-01-01T00:00:00Z")));

        let num: Timestamp = serde_json::from_str("42.5").unwrap();
        assert_eq!(num, Timestamp::Numeric(42.5));

        assert_eq!(serde_json::to_string(&num).unwrap(), "42.5");
    }
}
