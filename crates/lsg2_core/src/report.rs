//! Read-only projections over a container: per-segment tags, a file-level
//! info summary, and an aggregate profile.
//!
//! Everything here works from the segment table alone; residual blocks are
//! never decoded. The energy column is therefore the energy implied by the
//! stored model (slope over the segment span plus the quantization floor),
//! not a recomputation from samples.

use serde::Serialize;

use crate::classify::Pattern;
use crate::container::{self, SegmentEntry, TableView};
use crate::error::Result;
use crate::predictor::PredictorType;
use crate::series::Timestamp;

/// One row of the human-facing segment view.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentTag {
    pub seg_id: u32,
    pub start: u64,
    pub end: u64,
    pub len: u64,
    pub predictor: PredictorType,
    pub pattern: Pattern,
    pub salience: u8,
    pub energy: f64,
    pub mean: f64,
    pub slope: f64,
    pub q_step: f64,
}

/// Container summary without residual decoding.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub points: u64,
    pub n_segments: u32,
    pub dt: f64,
    pub t0: Timestamp,
    pub unit: String,
    pub container_bytes: usize,
    /// Raw `f64` storage divided by container size.
    pub compression_ratio: f64,
    pub seg_len_min: u64,
    pub seg_len_max: u64,
    pub seg_len_mean: f64,
    pub q_min: f64,
    pub q_max: f64,
    pub segments: Vec<SegmentTag>,
}

/// A maximal run of consecutive segments sharing one pattern tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Motif {
    pub start_seg: u32,
    pub end_seg: u32,
    pub pattern: Pattern,
    pub total_len: u64,
    pub total_energy: f64,
}

/// Aggregate profile of a container, derived from the segment table only.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesProfile {
    pub frac_flat: f64,
    pub frac_trend: f64,
    pub frac_oscillation: f64,
    pub frac_noisy: f64,
    pub sal_min: u8,
    pub sal_max: u8,
    pub sal_mean: f64,
    pub energy_min: f64,
    pub energy_max: f64,
    pub energy_mean: f64,
    pub motifs_flat: u32,
    pub motifs_trend: u32,
    pub motifs_oscillation: u32,
    pub motifs_noisy: u32,
}

/// Energy implied by the persisted model: the demeaned power of the fitted
/// line over the segment plus the quantization step's own power.
fn model_energy(entry: &SegmentEntry) -> f64 {
    let len = entry.len() as f64;
    let line = entry.slope * entry.slope * len * (len * len - 1.0) / 12.0;
    line + entry.q_step * entry.q_step * len
}

fn tag_from_entry(seg_id: u32, entry: &SegmentEntry) -> SegmentTag {
    SegmentTag {
        seg_id,
        start: entry.start_idx,
        end: entry.end_idx,
        len: entry.len(),
        predictor: entry.predictor,
        pattern: entry.pattern,
        salience: entry.salience,
        energy: model_energy(entry),
        mean: entry.mean,
        slope: entry.slope,
        q_step: entry.q_step,
    }
}

fn tags_from_table(table: &TableView) -> Vec<SegmentTag> {
    table
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| tag_from_entry(i as u32, e))
        .collect()
}

/// Per-segment tags of a container.
pub fn export_tags(bytes: &[u8]) -> Result<Vec<SegmentTag>> {
    let table = container::read_table(bytes)?;
    Ok(tags_from_table(&table))
}

/// Container summary: metadata, compression ratio, segment view.
pub fn read_info(bytes: &[u8]) -> Result<ContainerInfo> {
    let table = container::read_table(bytes)?;
    let segments = tags_from_table(&table);

    let raw_bytes = table.n_points.saturating_mul(8);
    let compression_ratio = if table.container_len > 0 {
        raw_bytes as f64 / table.container_len as f64
    } else {
        0.0
    };

    let lens: Vec<u64> = segments.iter().map(|t| t.len).collect();
    let qs: Vec<f64> = segments.iter().map(|t| t.q_step).collect();
    let count = segments.len() as f64;

    Ok(ContainerInfo {
        points: table.n_points,
        n_segments: table.entries.len() as u32,
        dt: table.dt,
        t0: table.t0.clone(),
        unit: table.unit.clone(),
        container_bytes: table.container_len,
        compression_ratio,
        seg_len_min: lens.iter().copied().min().unwrap_or(0),
        seg_len_max: lens.iter().copied().max().unwrap_or(0),
        seg_len_mean: lens.iter().sum::<u64>() as f64 / count,
        q_min: qs.iter().copied().fold(f64::INFINITY, f64::min),
        q_max: qs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        segments,
    })
}

/// Group consecutive same-pattern tags into maximal runs.
pub fn motifs(tags: &[SegmentTag]) -> Vec<Motif> {
    let mut out: Vec<Motif> = Vec::new();
    for tag in tags {
        match out.last_mut() {
            Some(m) if m.pattern == tag.pattern && m.end_seg + 1 == tag.seg_id => {
                m.end_seg = tag.seg_id;
                m.total_len += tag.len;
                m.total_energy += tag.energy;
            }
            _ => out.push(Motif {
                start_seg: tag.seg_id,
                end_seg: tag.seg_id,
                pattern: tag.pattern,
                total_len: tag.len,
                total_energy: tag.energy,
            }),
        }
    }
    out
}

/// Aggregate profile of one container.
pub fn export_profile(bytes: &[u8]) -> Result<SeriesProfile> {
    let table = container::read_table(bytes)?;
    let tags = tags_from_table(&table);

    let total_points = table.n_points.max(1) as f64;
    let mut points_by_pattern = [0u64; 4];
    for tag in &tags {
        points_by_pattern[tag.pattern.as_u8() as usize] += tag.len;
    }

    let count = tags.len() as f64;
    let sal_mean = tags.iter().map(|t| f64::from(t.salience)).sum::<f64>() / count;
    let energy_mean = tags.iter().map(|t| t.energy).sum::<f64>() / count;

    let runs = motifs(&tags);
    let mut motifs_by_pattern = [0u32; 4];
    for m in &runs {
        motifs_by_pattern[m.pattern.as_u8() as usize] += 1;
    }

    Ok(SeriesProfile {
        frac_flat: points_by_pattern[0] as f64 / total_points,
        frac_trend: points_by_pattern[1] as f64 / total_points,
        frac_oscillation: points_by_pattern[2] as f64 / total_points,
        frac_noisy: points_by_pattern[3] as f64 / total_points,
        sal_min: tags.iter().map(|t| t.salience).min().unwrap_or(0),
        sal_max: tags.iter().map(|t| t.salience).max().unwrap_or(0),
        sal_mean,
        energy_min: tags.iter().map(|t| t.energy).fold(f64::INFINITY, f64::min),
        energy_max: tags
            .iter()
            .map(|t| t.energy)
            .fold(f64::NEG_INFINITY, f64::max),
        energy_mean,
        motifs_flat: motifs_by_pattern[0],
        motifs_trend: motifs_by_pattern[1],
        motifs_oscillation: motifs_by_pattern[2],
        motifs_noisy: motifs_by_pattern[3],
    })
}
