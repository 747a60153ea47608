//! Runtime configuration for the calibration engine.
//!
//! These are the structs the stages actually consume. They are separate from
//! the TOML-deserialized config in `stc_config`; see `conversions` for the mapping.

use std::time::Duration;

use chrono::TimeDelta;

use crate::types::{BIN_COUNT, FormulaId};

pub use stc_config::RegisterMap;

/// Controller addressing and I/O timeouts.
#[derive(Debug, Clone)]
pub struct ControllerCfg {
    pub port: u16,
    pub unit_id: u8,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            port: 503,
            unit_id: 1,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestCfg {
    pub skip_rows: usize,
    pub max_logs: usize,
    pub min_logs: usize,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
}

impl Default for IngestCfg {
    fn default() -> Self {
        Self {
            skip_rows: 3,
            max_logs: 100,
            min_logs: 20,
            min_temp_c: 0.0,
            max_temp_c: 99.0,
        }
    }
}

/// Steady-state detector tuning.
#[derive(Debug, Clone)]
pub struct DetectorCfg {
    /// Population stddev below which a window counts as settled.
    pub stddev_threshold_c: f64,
    /// Every candidate endpoint is clamped to `[min_endpoint_c, max_endpoint_c]`.
    pub min_endpoint_c: f64,
    pub max_endpoint_c: f64,
    /// Fixed window length for the sliding strategy.
    pub slide_window: usize,
    pub readmit_rejected: usize,
    pub min_kept: usize,
}

impl Default for DetectorCfg {
    fn default() -> Self {
        Self {
            stddev_threshold_c: 2.0,
            min_endpoint_c: 32.0,
            max_endpoint_c: 42.0,
            slide_window: 10,
            readmit_rejected: 2,
            min_kept: 20,
        }
    }
}

/// Versioned positional binning contract.
#[derive(Debug, Clone)]
pub struct BinningCfg {
    pub version: u32,
    pub weights: [u32; BIN_COUNT],
}

impl Default for BinningCfg {
    fn default() -> Self {
        Self {
            version: 1,
            weights: [5, 6, 6, 6, 6, 6, 6, 6, 6, 6],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictionCfg {
    pub default_formula: FormulaId,
    pub aggressive_gain: f64,
    pub delicate_gain: f64,
    pub ratio_gain: f64,
    pub min_sv_c: f64,
    pub max_sv_c: f64,
}

impl Default for PredictionCfg {
    fn default() -> Self {
        Self {
            default_formula: FormulaId::Delicate,
            aggressive_gain: 1.0,
            delicate_gain: 0.5,
            ratio_gain: 1.0,
            min_sv_c: 30.0,
            max_sv_c: 99.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmbientCfg {
    pub lookback: TimeDelta,
    pub max_abs_delta_c: f64,
    pub adjust_skip: TimeDelta,
}

impl Default for AmbientCfg {
    fn default() -> Self {
        Self {
            lookback: TimeDelta::hours(1),
            max_abs_delta_c: 10.0,
            adjust_skip: TimeDelta::minutes(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityCfg {
    pub window: TimeDelta,
    pub tolerance_c: f64,
}

impl Default for IntegrityCfg {
    fn default() -> Self {
        Self {
            window: TimeDelta::hours(6),
            tolerance_c: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushCfg {
    pub chart_points: usize,
    pub operator_words: usize,
    pub plant_utc_offset_minutes: i32,
    pub recent_window: TimeDelta,
}

impl Default for PushCfg {
    fn default() -> Self {
        Self {
            chart_points: 60,
            operator_words: 6,
            plant_utc_offset_minutes: 7 * 60,
            recent_window: TimeDelta::hours(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMaps {
    pub upper: RegisterMap,
    pub lower: RegisterMap,
}

impl RegisterMaps {
    pub fn for_position(&self, position: crate::types::Position) -> &RegisterMap {
        match position {
            crate::types::Position::Upper => &self.upper,
            crate::types::Position::Lower => &self.lower,
        }
    }
}

impl Default for RegisterMaps {
    fn default() -> Self {
        let r = stc_config::Registers::default();
        Self {
            upper: r.upper,
            lower: r.lower,
        }
    }
}

/// Everything the calibrator needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct CalibratorCfg {
    pub controller: ControllerCfg,
    pub ingest: IngestCfg,
    pub detector: DetectorCfg,
    pub binning: BinningCfg,
    pub prediction: PredictionCfg,
    pub ambient: AmbientCfg,
    pub integrity: IntegrityCfg,
    pub push: PushCfg,
    pub registers: RegisterMaps,
}
