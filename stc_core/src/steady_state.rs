//! Steady-state detection on a cleaned thermal log.
//!
//! The second half of a probe run cools toward the chamber exit. The detector
//! estimates the temperature the tail settles at (the endpoint threshold) and
//! drops tail readings at or below it, keeping the whole first half. The first
//! dropped readings are appended after the kept ones, so they close the
//! series and feed the postheat bin and `ended_at`.

use crate::config::DetectorCfg;
use crate::error::{Result, StcError};
use crate::types::LogEntry;
use crate::util::population_stddev;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorWarning {
    /// Fewer rows than `min_kept` survived filtering; processing continues.
    TooFewRows { kept: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SteadyState {
    pub threshold_c: f64,
    /// Readings above the threshold (or in the first half) in chronological
    /// order, followed by the re-admitted ones.
    pub kept: Vec<LogEntry>,
    /// Readings finally dropped.
    pub rejected: Vec<LogEntry>,
    /// The first rejected readings, appended to `kept`.
    pub readmitted: Vec<LogEntry>,
    pub warning: Option<DetectorWarning>,
}

/// Endpoint candidate for one window: the ceiling of its maximum when the
/// window is settled, otherwise the lower bound.
fn candidate(window: &[f64], cfg: &DetectorCfg) -> Option<f64> {
    let sd = population_stddev(window)?;
    let raw = if sd < cfg.stddev_threshold_c {
        window.iter().copied().fold(f64::MIN, f64::max).ceil()
    } else {
        cfg.min_endpoint_c
    };
    Some(raw.clamp(cfg.min_endpoint_c, cfg.max_endpoint_c))
}

/// Endpoint threshold over every tail window of both strategies.
pub fn endpoint_threshold(temps: &[f64], cfg: &DetectorCfg) -> f64 {
    let n = temps.len();
    let half = n / 2;
    let mut best: Option<f64> = None;
    let mut consider = |c: Option<f64>| {
        if let Some(c) = c {
            best = Some(best.map_or(c, |b| b.max(c)));
        }
    };

    // shrinking tail windows: last `half` readings down to the last two
    for w in (2..=half).rev() {
        consider(candidate(&temps[n - w..], cfg));
    }

    // fixed windows sliding over the second half
    let slide = cfg.slide_window;
    if slide > 0 && n >= half + slide {
        for start in half..=n - slide {
            consider(candidate(&temps[start..start + slide], cfg));
        }
    }

    best.unwrap_or(cfg.min_endpoint_c)
}

pub fn detect_steady_state(log: &[LogEntry], cfg: &DetectorCfg) -> Result<SteadyState> {
    if log.is_empty() {
        return Err(StcError::InsufficientData {
            found: 0,
            required: 1,
        });
    }
    let temps: Vec<f64> = log.iter().map(|e| e.temp).collect();
    let half = log.len() / 2;
    let threshold_c = endpoint_threshold(&temps, cfg);

    let mut kept = Vec::with_capacity(log.len());
    let mut rejected = Vec::new();
    for (i, e) in log.iter().enumerate() {
        if i < half || e.temp > threshold_c {
            kept.push(*e);
        } else {
            rejected.push(*e);
        }
    }

    let n_readmit = cfg.readmit_rejected.min(rejected.len());
    let readmitted: Vec<LogEntry> = rejected.drain(..n_readmit).collect();
    kept.extend_from_slice(&readmitted);

    let warning = (kept.len() < cfg.min_kept).then(|| {
        tracing::warn!(
            kept = kept.len(),
            min = cfg.min_kept,
            "too few rows after steady-state filtering"
        );
        DetectorWarning::TooFewRows { kept: kept.len() }
    });

    tracing::debug!(
        threshold_c,
        kept = kept.len(),
        rejected = rejected.len(),
        "steady state detected"
    );

    Ok(SteadyState {
        threshold_c,
        kept,
        rejected,
        readmitted,
        warning,
    })
}
