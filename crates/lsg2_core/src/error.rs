use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = core::result::Result<T, LsgError>;

/// Every way an encode or decode can fail.
///
/// The set is closed: decoding adversarial bytes always lands on one of the
/// container variants below, never on a panic or an out-of-bounds read.
#[derive(Debug, Error)]
pub enum LsgError {
    /// Encode-side rejection: empty series, non-finite sample, `dt <= 0`,
    /// or an inconsistent encoder configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The buffer does not start with the `LSG2` magic.
    #[error("bad magic, not an LSG2 container")]
    BadMagic,

    /// Unknown format version.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    /// The fixed header is incomplete, or reserved header bits are set.
    #[error("container header truncated or malformed")]
    TruncatedHeader,

    /// The context JSON block is oversized, truncated, not strict
    /// `{dt, t0, unit}` JSON, or carries a non-positive `dt`.
    #[error("malformed context block: {0}")]
    MalformedContext(String),

    /// The segment table runs past the buffer or an entry carries
    /// out-of-range field values.
    #[error("segment table truncated or malformed: {0}")]
    TruncatedSegmentTable(String),

    /// A residual block is truncated, its coding disagrees with the header
    /// flags, or a varint stream is corrupt.
    #[error("malformed residual block: {0}")]
    MalformedResidualBlock(String),

    /// Segment entries do not tile `[0, n_points)` exactly.
    #[error("segments do not tile the series: {0}")]
    CoverageMismatch(String),

    /// Declared counts contradict each other.
    #[error("inconsistent counts in container: {0}")]
    InconsistentCounts(String),
}
