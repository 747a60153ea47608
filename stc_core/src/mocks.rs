//! Test and helper mocks for stc_core

use chrono::{DateTime, Utc};

use crate::ambient::{AmbientReading, AmbientSource};
use crate::error::{Result, StcError};
use crate::store::RecordStore;
use crate::types::{Position, PredictionRecord};

/// Header rows a probe export starts with.
pub const HEADER_ROWS: usize = 3;

/// Raw probe export: three header rows, then one row per temperature,
/// `step_minutes` apart starting at Excel serial `start_serial`.
pub fn thermal_rows(start_serial: f64, step_minutes: f64, temps: &[f64]) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec!["Probe export".to_string()],
        vec!["Device".to_string(), "TC-0042".to_string()],
        vec![
            "Label".to_string(),
            "Serial".to_string(),
            "Channel".to_string(),
            "Temp".to_string(),
        ],
    ];
    for (i, t) in temps.iter().enumerate() {
        let serial = start_serial + (i as f64) * step_minutes / 1440.0;
        rows.push(vec![
            format!("P{}", i + 1),
            format!("{serial:.6}"),
            "CH1".to_string(),
            format!("{t:.2}"),
        ]);
    }
    rows
}

/// `n` temperatures falling (or rising) linearly from `from` to `to`.
pub fn linear_ramp(n: usize, from: f64, to: f64) -> Vec<f64> {
    if n < 2 {
        return vec![from; n];
    }
    let step = (to - from) / (n - 1) as f64;
    (0..n).map(|i| from + step * i as f64).collect()
}

/// Store whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStore;

impl RecordStore for FailingStore {
    fn latest_before(
        &self,
        _machine_id: u32,
        _position: Position,
        _before: DateTime<Utc>,
        _not_before: Option<DateTime<Utc>>,
    ) -> Result<Option<PredictionRecord>> {
        Err(StcError::Persistence("store offline".into()))
    }

    fn save(&self, _record: &PredictionRecord) -> Result<()> {
        Err(StcError::Persistence("store offline".into()))
    }
}

/// Ambient sensor that always errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingAmbient;

impl AmbientSource for FailingAmbient {
    fn latest_since(
        &self,
        _since: DateTime<Utc>,
    ) -> std::result::Result<Option<AmbientReading>, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("ambient sensor offline")))
    }
}
