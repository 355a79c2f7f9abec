//! Core codec for the LSG2 container: a lossy, semantic compressor for
//! univariate, uniformly-sampled time series.
//!
//! Each contiguous run of samples is modeled by a small parametric predictor
//! (`mean`, `linear` or random walk); only quantized prediction residuals are
//! stored, alongside qualitative tags (pattern class, salience) that make a
//! container inspectable without decoding a single residual.
//!
//! # Pipeline
//!
//! ```text
//! samples -> segmenter -> fitter (+ auto selection) -> classifier
//!         -> varint / raw residual coding -> .lsg2 container
//! ```
//!
//! Decoding reverses the pipeline: per segment, predictor reconstruction plus
//! dequantized residuals, concatenated in segment order. Reconstruction error
//! is bounded per sample by the segment's quantization step.
//!
//! # Example
//!
//! ```
//! use lsg2_core::{decode, encode, EncoderConfig, TimeSeries, Timestamp};
//!
//! let ts = TimeSeries::new(
//!     (0..200).map(|i| 0.1 * i as f64).collect(),
//!     1.0,
//!     Timestamp::from("2024-01-01T00:00:00Z"),
//!     "step",
//! );
//! let bytes = encode(&ts, &EncoderConfig::default()).unwrap();
//! let back = decode(&bytes).unwrap();
//! assert_eq!(back.len(), 200);
//! ```
//!
//! Encode and decode are pure, synchronous functions; parallelism across
//! independent series is the caller's business. Decoding never trusts the
//! input: every declared count is checked against the buffer before use and
//! adversarial bytes fail with a typed [`LsgError`], never a panic.

pub mod classify;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod fitter;
pub mod predictor;
pub mod report;
pub mod segmenter;
pub mod series;
pub mod varint;

pub use classify::Pattern;
pub use codec::{decode, encode};
pub use config::{
    ClassifierThresholds, EncoderConfig, PredictorChoice, ResidualCoding, SegmentMode,
};
pub use container::{Container, SegmentEntry, TableView};
pub use error::{LsgError, Result};
pub use predictor::PredictorType;
pub use report::{
    export_profile, export_tags, read_info, ContainerInfo, Motif, SegmentTag, SeriesProfile,
};
pub use series::{TimeSeries, Timestamp};
