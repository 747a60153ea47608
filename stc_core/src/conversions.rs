//! `From`/`TryFrom` implementations bridging `stc_config` types to `stc_core` types.

use std::time::Duration;

use chrono::TimeDelta;

use crate::config::{
    AmbientCfg, BinningCfg, CalibratorCfg, ControllerCfg, DetectorCfg, IngestCfg, IntegrityCfg,
    PredictionCfg, PushCfg, RegisterMaps,
};
use crate::error::StcError;
use crate::types::{FormulaId, MachineProfile, SectionLimits};

// ── ControllerCfg ────────────────────────────────────────────────────────────

impl From<&stc_config::ControllerCfg> for ControllerCfg {
    fn from(c: &stc_config::ControllerCfg) -> Self {
        Self {
            port: c.port,
            unit_id: c.unit_id,
            read_timeout: Duration::from_millis(c.read_timeout_ms),
            write_timeout: Duration::from_millis(c.write_timeout_ms),
            connect_timeout: Duration::from_millis(c.connect_timeout_ms),
        }
    }
}

// ── IngestCfg / DetectorCfg / BinningCfg ─────────────────────────────────────

impl From<&stc_config::IngestCfg> for IngestCfg {
    fn from(c: &stc_config::IngestCfg) -> Self {
        Self {
            skip_rows: c.skip_rows,
            max_logs: c.max_logs,
            min_logs: c.min_logs,
            min_temp_c: c.min_temp_c,
            max_temp_c: c.max_temp_c,
        }
    }
}

impl From<&stc_config::DetectorCfg> for DetectorCfg {
    fn from(c: &stc_config::DetectorCfg) -> Self {
        Self {
            stddev_threshold_c: c.stddev_threshold_c,
            min_endpoint_c: c.min_endpoint_c,
            max_endpoint_c: c.max_endpoint_c,
            slide_window: c.slide_window,
            readmit_rejected: c.readmit_rejected,
            min_kept: c.min_kept,
        }
    }
}

impl From<&stc_config::BinningCfg> for BinningCfg {
    fn from(c: &stc_config::BinningCfg) -> Self {
        Self {
            version: c.version,
            weights: c.weights,
        }
    }
}

// ── PredictionCfg ────────────────────────────────────────────────────────────

impl TryFrom<&stc_config::PredictionCfg> for PredictionCfg {
    type Error = StcError;

    fn try_from(c: &stc_config::PredictionCfg) -> Result<Self, Self::Error> {
        Ok(Self {
            default_formula: FormulaId::try_from(c.default_formula)?,
            aggressive_gain: c.aggressive_gain,
            delicate_gain: c.delicate_gain,
            ratio_gain: c.ratio_gain,
            min_sv_c: c.min_sv_c,
            max_sv_c: c.max_sv_c,
        })
    }
}

// ── Ambient / integrity / push ───────────────────────────────────────────────

impl From<&stc_config::AmbientCfg> for AmbientCfg {
    fn from(c: &stc_config::AmbientCfg) -> Self {
        Self {
            lookback: TimeDelta::minutes(i64::from(c.lookback_minutes)),
            max_abs_delta_c: c.max_abs_delta_c,
            adjust_skip: TimeDelta::minutes(i64::from(c.adjust_skip_minutes)),
        }
    }
}

impl From<&stc_config::IntegrityCfg> for IntegrityCfg {
    fn from(c: &stc_config::IntegrityCfg) -> Self {
        Self {
            window: TimeDelta::hours(i64::from(c.window_hours)),
            tolerance_c: c.tolerance_c,
        }
    }
}

impl From<&stc_config::PushCfg> for PushCfg {
    fn from(c: &stc_config::PushCfg) -> Self {
        Self {
            chart_points: c.chart_points,
            operator_words: c.operator_words,
            plant_utc_offset_minutes: c.plant_utc_offset_minutes,
            recent_window: TimeDelta::minutes(i64::from(c.recent_window_minutes)),
        }
    }
}

impl From<&stc_config::Registers> for RegisterMaps {
    fn from(c: &stc_config::Registers) -> Self {
        Self {
            upper: c.upper,
            lower: c.lower,
        }
    }
}

// ── Whole config ─────────────────────────────────────────────────────────────

impl TryFrom<&stc_config::Config> for CalibratorCfg {
    type Error = StcError;

    fn try_from(c: &stc_config::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            controller: (&c.controller).into(),
            ingest: (&c.ingest).into(),
            detector: (&c.detector).into(),
            binning: (&c.binning).into(),
            prediction: PredictionCfg::try_from(&c.prediction)?,
            ambient: (&c.ambient).into(),
            integrity: (&c.integrity).into(),
            push: (&c.push).into(),
            registers: (&c.registers).into(),
        })
    }
}

// ── MachineProfile ───────────────────────────────────────────────────────────

impl TryFrom<&stc_config::MachineCfg> for MachineProfile {
    type Error = StcError;

    fn try_from(m: &stc_config::MachineCfg) -> Result<Self, Self::Error> {
        let limits = match (m.section_limits_low, m.section_limits_high) {
            (Some(low), Some(high)) => Some(SectionLimits::new(low, high)?),
            (None, None) => None,
            _ => {
                return Err(StcError::Validation(format!(
                    "machine {}: limits need both low and high",
                    m.id
                )));
            }
        };
        Ok(Self {
            id: m.id,
            line: m.line,
            ip_address: m.ip_address.trim().to_string(),
            limits,
        })
    }
}
