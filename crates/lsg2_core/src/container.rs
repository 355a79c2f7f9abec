//! The `.lsg2` on-disk container.
//!
//! ```text
//! [FixedHeader: 32 B]  magic "LSG2", version, flags, n_points, n_segments,
//!                      context_len, reserved
//! [ContextJSON]        strict {"dt", "t0", "unit"} object, <= 1 MiB
//! [SegmentTable]       n_segments entries, 64 B each
//! [ResidualSection]    coding byte, then per segment: block_len u32 + payload
//! ```
//!
//! All integers are little-endian. The reader treats the buffer as hostile:
//! every count is checked against the remaining length before it is used and
//! before anything is allocated, and every field with a closed value set is
//! validated on read.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::classify::Pattern;
use crate::config::ResidualCoding;
use crate::error::{LsgError, Result};
use crate::predictor::PredictorType;
use crate::series::Timestamp;
use crate::varint;

pub const MAGIC: [u8; 4] = *b"LSG2";
pub const VERSION: u16 = 1;
pub const FIXED_HEADER_SIZE: usize = 32;
pub const SEGMENT_ENTRY_SIZE: usize = 64;
/// Upper bound on the context JSON block (1 MiB).
pub const MAX_CONTEXT_LEN: u32 = 1 << 20;

const FLAG_VARINT: u16 = 0x0001;
const FLAG_RESERVED_MASK: u16 = !FLAG_VARINT;

// ---------------------------------------------------------------------------
// Wire structures
// ---------------------------------------------------------------------------

/// One segment table entry, exactly as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    pub start_idx: u64,
    pub end_idx: u64,
    pub predictor: PredictorType,
    pub mean: f64,
    pub slope: f64,
    pub intercept: f64,
    pub q_step: f64,
    pub seed_value: f64,
    pub pattern: Pattern,
    pub salience: u8,
}

impl SegmentEntry {
    pub fn len(&self) -> u64 {
        self.end_idx - self.start_idx
    }

    pub fn is_empty(&self) -> bool {
        self.end_idx == self.start_idx
    }
}

/// Header, context and segment table of a container; everything needed for
/// inspection, with the residual section left untouched.
#[derive(Debug, Clone)]
pub struct TableView {
    pub n_points: u64,
    pub coding: ResidualCoding,
    pub dt: f64,
    pub t0: Timestamp,
    pub unit: String,
    pub entries: Vec<SegmentEntry>,
    /// Total container size in bytes, for ratio reporting.
    pub container_len: usize,
}

/// A fully parsed container: table plus one residual vector per segment.
#[derive(Debug, Clone)]
pub struct Container {
    pub table: TableView,
    pub residuals: Vec<Vec<i32>>,
}

/// Strict schema of the context block. Unknown keys are a decode error, as
/// is any deviation from the three expected value types.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContextJson {
    dt: f64,
    t0: Timestamp,
    unit: String,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serialize a container from its parts.
///
/// `residuals` must hold one vector per entry with exactly `len` values;
/// mismatches are an encoder bug surfaced as `InvalidInput`.
pub fn write_container(
    dt: f64,
    t0: &Timestamp,
    unit: &str,
    entries: &[SegmentEntry],
    residuals: &[Vec<i32>],
    coding: ResidualCoding,
) -> Result<Vec<u8>> {
    if entries.is_empty() {
        return Err(LsgError::InvalidInput(String::from(
            "cannot write a container without segments",
        )));
    }
    if entries.len() != residuals.len() {
        return Err(LsgError::InvalidInput(format!(
            "{} segment entries but {} residual blocks",
            entries.len(),
            residuals.len()
        )));
    }
    for (entry, block) in entries.iter().zip(residuals) {
        if entry.len() != block.len() as u64 {
            return Err(LsgError::InvalidInput(format!(
                "segment [{}, {}) carries {} residuals",
                entry.start_idx,
                entry.end_idx,
                block.len()
            )));
        }
    }
    let n_segments = u32::try_from(entries.len())
        .map_err(|_| LsgError::InvalidInput(String::from("too many segments")))?;
    let n_points = entries[entries.len() - 1].end_idx;

    let context = ContextJson {
        dt,
        t0: t0.clone(),
        unit: String::from(unit),
    };
    let context_bytes = serde_json::to_vec(&context)
        .map_err(|e| LsgError::InvalidInput(format!("context serialization failed: {e}")))?;
    if context_bytes.len() > MAX_CONTEXT_LEN as usize {
        return Err(LsgError::InvalidInput(format!(
            "context block is {} bytes, limit is {MAX_CONTEXT_LEN}",
            context_bytes.len()
        )));
    }

    let flags = match coding {
        ResidualCoding::Raw => 0u16,
        ResidualCoding::Varint => FLAG_VARINT,
    };

    let mut buf = Vec::with_capacity(
        FIXED_HEADER_SIZE
            + context_bytes.len()
            + entries.len() * SEGMENT_ENTRY_SIZE
            + residuals.iter().map(|r| 4 + r.len() * 4).sum::<usize>()
            + 1,
    );

    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&n_points.to_le_bytes());
    buf.extend_from_slice(&n_segments.to_le_bytes());
    buf.extend_from_slice(&(context_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&[0u8; 8]);
    buf.extend_from_slice(&context_bytes);

    for entry in entries {
        buf.extend_from_slice(&entry.start_idx.to_le_bytes());
        buf.extend_from_slice(&entry.end_idx.to_le_bytes());
        buf.push(entry.predictor.as_u8());
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&entry.mean.to_le_bytes());
        buf.extend_from_slice(&entry.slope.to_le_bytes());
        buf.extend_from_slice(&entry.intercept.to_le_bytes());
        buf.extend_from_slice(&entry.q_step.to_le_bytes());
        buf.extend_from_slice(&entry.seed_value.to_le_bytes());
        buf.push(entry.pattern.as_u8());
        buf.push(entry.salience);
        buf.extend_from_slice(&[0u8; 2]);
    }

    buf.push(match coding {
        ResidualCoding::Raw => 0,
        ResidualCoding::Varint => 1,
    });
    let mut block = Vec::new();
    for values in residuals {
        block.clear();
        match coding {
            ResidualCoding::Raw => {
                block.reserve(values.len() * 4);
                for &v in values {
                    block.extend_from_slice(&v.to_le_bytes());
                }
            }
            ResidualCoding::Varint => varint::write_residuals(values, &mut block),
        }
        buf.extend_from_slice(&(block.len() as u32).to_le_bytes());
        buf.extend_from_slice(&block);
    }

    Ok(buf)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Bounds-checked cursor over an untrusted buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|s| s[0])
    }

    fn read_u16(&mut self) -> Option<u16> {
        self.take(2).map(LittleEndian::read_u16)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take(4).map(LittleEndian::read_u32)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take(8).map(LittleEndian::read_u64)
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.take(4).map(LittleEndian::read_i32)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.take(8).map(LittleEndian::read_f64)
    }
}

struct RawHeader {
    coding: ResidualCoding,
    n_points: u64,
    n_segments: u32,
    context_len: u32,
}

fn read_header(r: &mut Reader) -> Result<RawHeader> {
    let magic = r.take(4).ok_or(LsgError::TruncatedHeader)?;
    if magic != MAGIC.as_slice() {
        return Err(LsgError::BadMagic);
    }
    let version = r.read_u16().ok_or(LsgError::TruncatedHeader)?;
    if version != VERSION {
        return Err(LsgError::UnsupportedVersion(version));
    }
    let flags = r.read_u16().ok_or(LsgError::TruncatedHeader)?;
    if flags & FLAG_RESERVED_MASK != 0 {
        return Err(LsgError::TruncatedHeader);
    }
    let n_points = r.read_u64().ok_or(LsgError::TruncatedHeader)?;
    let n_segments = r.read_u32().ok_or(LsgError::TruncatedHeader)?;
    let context_len = r.read_u32().ok_or(LsgError::TruncatedHeader)?;
    let reserved = r.take(8).ok_or(LsgError::TruncatedHeader)?;
    if reserved.iter().any(|&b| b != 0) {
        return Err(LsgError::TruncatedHeader);
    }
    Ok(RawHeader {
        coding: if flags & FLAG_VARINT != 0 {
            ResidualCoding::Varint
        } else {
            ResidualCoding::Raw
        },
        n_points,
        n_segments,
        context_len,
    })
}

/// Size the context block and segment table against the remaining buffer
/// before anything is parsed or allocated; both counts are
/// attacker-controlled.
fn check_section_sizes(r: &Reader, header: &RawHeader) -> Result<()> {
    if header.context_len > MAX_CONTEXT_LEN {
        return Err(LsgError::MalformedContext(format!(
            "context_len {} exceeds limit {MAX_CONTEXT_LEN}",
            header.context_len
        )));
    }
    let remaining = r.remaining() as u64;
    if u64::from(header.context_len) > remaining {
        return Err(LsgError::MalformedContext(format!(
            "context_len {} runs past end of buffer",
            header.context_len
        )));
    }
    let table_bytes = u64::from(header.n_segments) * SEGMENT_ENTRY_SIZE as u64;
    if table_bytes > remaining - u64::from(header.context_len) {
        return Err(LsgError::TruncatedSegmentTable(format!(
            "table needs {table_bytes} bytes, {} remain after context",
            remaining - u64::from(header.context_len)
        )));
    }
    Ok(())
}

fn read_context(r: &mut Reader, context_len: u32) -> Result<ContextJson> {
    let bytes = r.take(context_len as usize).ok_or_else(|| {
        LsgError::MalformedContext(format!(
            "context_len {context_len} runs past end of buffer"
        ))
    })?;
    let context: ContextJson = serde_json::from_slice(bytes)
        .map_err(|e| LsgError::MalformedContext(e.to_string()))?;
    if !(context.dt.is_finite() && context.dt > 0.0) {
        return Err(LsgError::MalformedContext(format!(
            "dt must be a positive number, got {}",
            context.dt
        )));
    }
    Ok(context)
}

fn read_segment_table(r: &mut Reader, header: &RawHeader) -> Result<Vec<SegmentEntry>> {
    let table_bytes = u64::from(header.n_segments) * SEGMENT_ENTRY_SIZE as u64;
    if table_bytes > r.remaining() as u64 {
        return Err(LsgError::TruncatedSegmentTable(format!(
            "table needs {table_bytes} bytes, {} remain",
            r.remaining()
        )));
    }
    if header.n_segments == 0 || header.n_points == 0 {
        return Err(LsgError::InconsistentCounts(format!(
            "n_points={} n_segments={}",
            header.n_points, header.n_segments
        )));
    }

    let mut entries = Vec::with_capacity(header.n_segments as usize);
    for idx in 0..header.n_segments {
        let truncated =
            || LsgError::TruncatedSegmentTable(format!("entry {idx} incomplete"));
        let start_idx = r.read_u64().ok_or_else(truncated)?;
        let end_idx = r.read_u64().ok_or_else(truncated)?;
        let predictor_byte = r.read_u8().ok_or_else(truncated)?;
        let pad = r.take(3).ok_or_else(truncated)?;
        let mean = r.read_f64().ok_or_else(truncated)?;
        let slope = r.read_f64().ok_or_else(truncated)?;
        let intercept = r.read_f64().ok_or_else(truncated)?;
        let q_step = r.read_f64().ok_or_else(truncated)?;
        let seed_value = r.read_f64().ok_or_else(truncated)?;
        let pattern_byte = r.read_u8().ok_or_else(truncated)?;
        let salience = r.read_u8().ok_or_else(truncated)?;
        let pad2 = r.take(2).ok_or_else(truncated)?;

        if pad.iter().chain(pad2).any(|&b| b != 0) {
            return Err(LsgError::TruncatedSegmentTable(format!(
                "entry {idx} has nonzero reserved bytes"
            )));
        }
        let predictor = PredictorType::from_u8(predictor_byte).ok_or_else(|| {
            LsgError::TruncatedSegmentTable(format!(
                "entry {idx} has unknown predictor {predictor_byte}"
            ))
        })?;
        let pattern = Pattern::from_u8(pattern_byte).ok_or_else(|| {
            LsgError::TruncatedSegmentTable(format!(
                "entry {idx} has unknown pattern {pattern_byte}"
            ))
        })?;
        if salience > 2 {
            return Err(LsgError::TruncatedSegmentTable(format!(
                "entry {idx} has salience {salience}"
            )));
        }
        if !(q_step.is_finite() && q_step > 0.0) {
            return Err(LsgError::TruncatedSegmentTable(format!(
                "entry {idx} has invalid Q {q_step}"
            )));
        }
        if ![mean, slope, intercept, seed_value]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(LsgError::TruncatedSegmentTable(format!(
                "entry {idx} has non-finite model parameters"
            )));
        }

        entries.push(SegmentEntry {
            start_idx,
            end_idx,
            predictor,
            mean,
            slope,
            intercept,
            q_step,
            seed_value,
            pattern,
            salience,
        });
    }

    validate_coverage(&entries, header.n_points)?;
    Ok(entries)
}

/// Segments must tile `[0, n_points)` exactly, in order, each non-empty.
fn validate_coverage(entries: &[SegmentEntry], n_points: u64) -> Result<()> {
    let mut expected_start = 0u64;
    for (idx, entry) in entries.iter().enumerate() {
        if entry.start_idx != expected_start {
            return Err(LsgError::CoverageMismatch(format!(
                "entry {idx} starts at {} instead of {expected_start}",
                entry.start_idx
            )));
        }
        if entry.end_idx <= entry.start_idx {
            return Err(LsgError::CoverageMismatch(format!(
                "entry {idx} is empty or reversed: [{}, {})",
                entry.start_idx, entry.end_idx
            )));
        }
        if entry.end_idx > n_points {
            return Err(LsgError::CoverageMismatch(format!(
                "entry {idx} ends at {} past n_points {n_points}",
                entry.end_idx
            )));
        }
        expected_start = entry.end_idx;
    }
    if expected_start != n_points {
        return Err(LsgError::CoverageMismatch(format!(
            "segments cover [0, {expected_start}) of [0, {n_points})"
        )));
    }
    Ok(())
}

fn read_residual_section(
    r: &mut Reader,
    coding: ResidualCoding,
    entries: &[SegmentEntry],
) -> Result<Vec<Vec<i32>>> {
    let coding_byte = r.read_u8().ok_or_else(|| {
        LsgError::MalformedResidualBlock(String::from("missing residual section"))
    })?;
    let declared = match coding_byte {
        0 => ResidualCoding::Raw,
        1 => ResidualCoding::Varint,
        other => {
            return Err(LsgError::MalformedResidualBlock(format!(
                "unknown coding byte {other}"
            )))
        }
    };
    if declared != coding {
        return Err(LsgError::MalformedResidualBlock(String::from(
            "coding byte disagrees with header flags",
        )));
    }

    let mut residuals = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let block_len = r.read_u32().ok_or_else(|| {
            LsgError::MalformedResidualBlock(format!("block {idx} header truncated"))
        })? as usize;
        let block = r.take(block_len).ok_or_else(|| {
            LsgError::MalformedResidualBlock(format!(
                "block {idx} declares {block_len} bytes, {} remain",
                r.remaining()
            ))
        })?;

        let count = usize::try_from(entry.len()).map_err(|_| {
            LsgError::InconsistentCounts(format!("segment {idx} length exceeds address space"))
        })?;

        let values = match coding {
            ResidualCoding::Raw => {
                // Checked u64 math: the declared length is attacker-controlled
                // and `count * 4` may not fit anywhere.
                if entry.len().checked_mul(4) != Some(block_len as u64) {
                    return Err(LsgError::InconsistentCounts(format!(
                        "raw block {idx} is {block_len} bytes for {count} residuals"
                    )));
                }
                let mut br = Reader::new(block);
                let mut values = Vec::with_capacity(count);
                while let Some(v) = br.read_i32() {
                    values.push(v);
                }
                values
            }
            ResidualCoding::Varint => varint::read_residuals(block, count)
                .map_err(|e| match e {
                    LsgError::MalformedResidualBlock(msg) => {
                        LsgError::MalformedResidualBlock(format!("block {idx}: {msg}"))
                    }
                    other => other,
                })?,
        };
        residuals.push(values);
    }

    if r.remaining() != 0 {
        return Err(LsgError::MalformedResidualBlock(format!(
            "{} trailing bytes after last block",
            r.remaining()
        )));
    }
    Ok(residuals)
}

/// Parse header, context and segment table; skip residuals entirely.
pub fn read_table(bytes: &[u8]) -> Result<TableView> {
    let mut r = Reader::new(bytes);
    let header = read_header(&mut r)?;
    check_section_sizes(&r, &header)?;
    let context = read_context(&mut r, header.context_len)?;
    let entries = read_segment_table(&mut r, &header)?;
    Ok(TableView {
        n_points: header.n_points,
        coding: header.coding,
        dt: context.dt,
        t0: context.t0,
        unit: context.unit,
        entries,
        container_len: bytes.len(),
    })
}

/// Parse a complete container including every residual block.
pub fn read_container(bytes: &[u8]) -> Result<Container> {
    let mut r = Reader::new(bytes);
    let header = read_header(&mut r)?;
    check_section_sizes(&r, &header)?;
    let context = read_context(&mut r, header.context_len)?;
    let entries = read_segment_table(&mut r, &header)?;
    let residuals = read_residual_section(&mut r, header.coding, &entries)?;
    Ok(Container {
        table: TableView {
            n_points: header.n_points,
            coding: header.coding,
            dt: context.dt,
            t0: context.t0,
            unit: context.unit,
            entries,
            container_len: bytes.len(),
        },
        residuals,
    })
}
