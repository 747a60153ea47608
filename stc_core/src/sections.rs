//! Per-section medians (HB) from the kept part of a thermal log.
//!
//! Readings are binned by position under a versioned contract: bin `k` spans
//! `round(n * cum[k-1] / total)..round(n * cum[k] / total)` where `cum` is the
//! running sum of the configured weights. Version 1 weights (5, then 6 per bin)
//! follow the fixed probe layout of 5 preheat rows and 6 rows per section.

use chrono::{DateTime, Utc};

use crate::config::BinningCfg;
use crate::error::{Result, StcError};
use crate::types::{BIN_COUNT, LogEntry, SECTION_COUNT, Section};
use crate::util::median;

const MEDIAN_MIN_C: f64 = 1.0;
const MEDIAN_MAX_C: f64 = 99.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SectionMedians {
    pub version: u32,
    pub preheat: f64,
    hb: [f64; SECTION_COUNT],
    /// Absent when the postheat bin is empty.
    pub postheat: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SectionMedians {
    /// section_1..section_8 medians.
    pub fn hb_values(&self) -> [f64; SECTION_COUNT] {
        self.hb
    }

    pub fn get(&self, section: Section) -> Option<f64> {
        match section {
            Section::Preheat => Some(self.preheat),
            Section::Postheat => self.postheat,
            s => self.hb.get(s.index() - 1).copied(),
        }
    }

    pub fn values(&self) -> [Option<f64>; BIN_COUNT] {
        Section::ALL.map(|s| self.get(s))
    }
}

/// Bin boundaries for `n` readings: `bounds[k]..bounds[k + 1]` is bin `k`.
pub fn bin_bounds(n: usize, weights: &[u32; BIN_COUNT]) -> [usize; BIN_COUNT + 1] {
    let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    let mut bounds = [0usize; BIN_COUNT + 1];
    if total == 0 {
        return bounds;
    }
    let mut cum = 0u64;
    for (k, w) in weights.iter().enumerate() {
        cum += u64::from(*w);
        let b = (n as f64 * cum as f64 / total as f64).round() as usize;
        bounds[k + 1] = b.clamp(bounds[k], n);
    }
    bounds
}

fn in_range(v: f64) -> bool {
    (MEDIAN_MIN_C..=MEDIAN_MAX_C).contains(&v)
}

pub fn compute_section_medians(filtered: &[LogEntry], cfg: &BinningCfg) -> Result<SectionMedians> {
    let (Some(first), Some(last)) = (filtered.first(), filtered.last()) else {
        return Err(StcError::validation("no readings to bin"));
    };
    if last.taken_at <= first.taken_at {
        return Err(StcError::validation(
            "kept readings do not span any time (ended_at <= started_at)",
        ));
    }

    let temps: Vec<f64> = filtered.iter().map(|e| e.temp).collect();
    let bounds = bin_bounds(temps.len(), &cfg.weights);
    let medians: [Option<f64>; BIN_COUNT] =
        std::array::from_fn(|k| median(&temps[bounds[k]..bounds[k + 1]]));

    let required = |section: Section| -> Result<f64> {
        match medians[section.index()] {
            Some(v) if in_range(v) => Ok(v),
            Some(v) => Err(StcError::Validation(format!(
                "{section} median {v} outside [{MEDIAN_MIN_C}, {MEDIAN_MAX_C}]"
            ))),
            None => Err(StcError::Validation(format!(
                "{section} has no readings ({} kept rows)",
                temps.len()
            ))),
        }
    };

    let preheat = required(Section::Preheat)?;
    let mut hb = [0.0; SECTION_COUNT];
    for (i, slot) in hb.iter_mut().enumerate() {
        *slot = required(Section::ALL[i + 1])?;
    }
    let postheat = match medians[Section::Postheat.index()] {
        Some(v) if !in_range(v) => {
            return Err(StcError::Validation(format!(
                "postheat median {v} outside [{MEDIAN_MIN_C}, {MEDIAN_MAX_C}]"
            )));
        }
        other => other,
    };

    Ok(SectionMedians {
        version: cfg.version,
        preheat,
        hb,
        postheat,
        started_at: first.taken_at,
        ended_at: last.taken_at,
    })
}
