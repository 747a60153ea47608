//! End-to-end calibration run for one machine and position.
//!
//! ingest -> detect steady state -> section medians -> resolve SV ->
//! predict -> integrity + AT -> push -> persist. Validation and data
//! errors stop the run before anything is written; a failed push still
//! persists the record with `is_applied = false`.

use chrono::TimeDelta;
use serde::Serialize;
use stc_traits::Clock;

use crate::ambient::{AmbientSource, compute_ambient_delta};
use crate::builder::CalibratorBuilder;
use crate::config::CalibratorCfg;
use crate::error::{Result, StcError};
use crate::ingest::{CleanedLog, ingest};
use crate::integrity::classify_integrity;
use crate::lock::RunLocks;
use crate::prediction::{SvpResult, predict, validate_series};
use crate::push::{LiveSv, PushBundle, PushReport, RegisterPushClient, parse_device_code};
use crate::sections::{SectionMedians, compute_section_medians};
use crate::steady_state::{DetectorWarning, SteadyState, detect_steady_state};
use crate::store::RecordStore;
use crate::types::{
    FormulaId, MachineProfile, Position, PredictionRecord, SECTION_COUNT, SvSource,
};

/// Inputs of a full calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub machine_id: u32,
    pub position: Position,
    /// Raw thermal log rows as read from the CSV.
    pub rows: Vec<Vec<String>>,
    /// Conveyor speed, 0.1..=0.9.
    pub speed: f64,
    /// 1 or 2.
    pub sequence: u8,
    pub device_code: String,
    pub operator: String,
    /// Used when the controller's live SV cannot be read.
    pub manual_sv: Option<Vec<f64>>,
    /// Defaults to the configured formula.
    pub formula_id: Option<u16>,
}

/// Result of the data half of a run: cleaned log, steady state and medians.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub log: CleanedLog,
    pub steady: SteadyState,
    pub medians: SectionMedians,
}

impl Analysis {
    /// Whole minutes between the first and last kept entry, each truncated
    /// to its minute first.
    pub fn duration_minutes(&self) -> u16 {
        let start = self.medians.started_at.timestamp().div_euclid(60);
        let end = self.medians.ended_at.timestamp().div_euclid(60);
        u16::try_from((end - start).max(0)).unwrap_or(u16::MAX)
    }
}

/// Recoverable problems noticed during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    TooFewRows { kept: usize },
    LiveSvUnavailable { reason: String },
    LiveSvRejected { words: Vec<u16> },
    PushFailed { reason: String },
}

impl std::fmt::Display for RunWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunWarning::TooFewRows { kept } => {
                write!(f, "only {kept} rows kept after steady-state filtering")
            }
            RunWarning::LiveSvUnavailable { reason } => {
                write!(f, "live SV unavailable ({reason}); manual SV used")
            }
            RunWarning::LiveSvRejected { words } => {
                write!(f, "live SV rejected {words:?}; manual SV used")
            }
            RunWarning::PushFailed { reason } => write!(f, "push not applied: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub record: PredictionRecord,
    pub push_report: PushReport,
    pub warnings: Vec<RunWarning>,
}

/// Whether each position of a machine had a run in the recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecentUpload {
    pub machine_id: u32,
    pub line: u32,
    pub upper: bool,
    pub lower: bool,
}

/// Ingest a raw log, filter it to steady state and bin it into sections.
pub fn analyze_log<R, S>(rows: &[R], cfg: &CalibratorCfg) -> Result<Analysis>
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    let log = ingest(rows, &cfg.ingest)?;
    let steady = detect_steady_state(&log.entries, &cfg.detector)?;
    let medians = compute_section_medians(&steady.kept, &cfg.binning)?;
    tracing::debug!(
        rows = log.entries.len(),
        kept = steady.kept.len(),
        threshold_c = steady.threshold_c,
        "log analyzed"
    );
    Ok(Analysis {
        log,
        steady,
        medians,
    })
}

pub struct Calibrator {
    pub(crate) cfg: CalibratorCfg,
    pub(crate) machines: Vec<MachineProfile>,
    pub(crate) store: Box<dyn RecordStore>,
    pub(crate) ambient: Box<dyn AmbientSource>,
    pub(crate) client: RegisterPushClient,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) locks: RunLocks,
}

impl std::fmt::Debug for Calibrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calibrator")
            .field("cfg", &self.cfg)
            .field("machines", &self.machines)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl Calibrator {
    pub fn builder() -> CalibratorBuilder {
        CalibratorBuilder::default()
    }

    pub fn config(&self) -> &CalibratorCfg {
        &self.cfg
    }

    pub fn machines(&self) -> &[MachineProfile] {
        &self.machines
    }

    pub fn locks(&self) -> &RunLocks {
        &self.locks
    }

    pub fn machine(&self, machine_id: u32) -> Result<&MachineProfile> {
        self.machines
            .iter()
            .find(|m| m.id == machine_id)
            .ok_or(StcError::MachineNotFound(machine_id))
    }

    pub fn analyze<R, S>(&self, rows: &[R]) -> Result<Analysis>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        analyze_log(rows, &self.cfg)
    }

    /// Standalone prediction, clamped to the machine's limits when one is named.
    pub fn predict(
        &self,
        hb: &[f64],
        sv: &[f64],
        formula_id: Option<u16>,
        machine_id: Option<u32>,
    ) -> Result<SvpResult> {
        let limits = match machine_id {
            Some(id) => self.machine(id)?.limits,
            None => None,
        };
        let formula = formula_id.unwrap_or_else(|| self.cfg.prediction.default_formula.code());
        predict(hb, sv, formula, limits.as_ref(), &self.cfg.prediction)
    }

    /// Live SV from the controller, falling back to the manual values.
    fn resolve_sv(
        &mut self,
        machine: &MachineProfile,
        position: Position,
        manual: Option<&[f64]>,
        warnings: &mut Vec<RunWarning>,
    ) -> Result<([f64; SECTION_COUNT], SvSource)> {
        match self.client.read_live_sv(machine, position) {
            Ok(LiveSv::Values(values)) => {
                match validate_series("live sv", &values, &self.cfg.prediction) {
                    Ok(v) => return Ok((v, SvSource::Live)),
                    Err(e) => warnings.push(RunWarning::LiveSvUnavailable {
                        reason: e.to_string(),
                    }),
                }
            }
            Ok(LiveSv::Skipped) => {}
            Ok(LiveSv::Rejected(words)) => warnings.push(RunWarning::LiveSvRejected { words }),
            Err(e) => {
                tracing::warn!(machine_id = machine.id, %position, error = %e, "live SV read failed");
                warnings.push(RunWarning::LiveSvUnavailable {
                    reason: e.to_string(),
                });
            }
        }
        let manual = manual.ok_or_else(|| {
            StcError::validation("no live SV from the controller and no manual SV given")
        })?;
        let sv = validate_series("sv", manual, &self.cfg.prediction)?;
        Ok((sv, SvSource::Manual))
    }

    /// Full calibration run. The record is persisted whether or not the
    /// push was applied.
    pub fn submit(&mut self, req: &RunRequest) -> Result<RunOutcome> {
        let _guard = self.locks.try_acquire(req.machine_id, req.position)?;
        let machine = self.machine(req.machine_id)?.clone();
        let position = req.position;

        if !(0.1..=0.9).contains(&req.speed) {
            return Err(StcError::Validation(format!(
                "speed {} outside [0.1, 0.9]",
                req.speed
            )));
        }
        if !matches!(req.sequence, 1 | 2) {
            return Err(StcError::Validation(format!(
                "sequence {} must be 1 or 2",
                req.sequence
            )));
        }
        let device_code = parse_device_code(&req.device_code)?;
        let operator = req.operator.trim();
        if operator.is_empty() {
            return Err(StcError::validation("operator name is empty"));
        }
        let formula = FormulaId::try_from(
            req.formula_id
                .unwrap_or_else(|| self.cfg.prediction.default_formula.code()),
        )?;

        let analysis = self.analyze(&req.rows)?;
        let mut warnings = Vec::new();
        if let Some(DetectorWarning::TooFewRows { kept }) = analysis.steady.warning {
            warnings.push(RunWarning::TooFewRows { kept });
        }

        let (sv, sv_source) =
            self.resolve_sv(&machine, position, req.manual_sv.as_deref(), &mut warnings)?;
        let hb = analysis.medians.hb_values();
        let svp = predict(
            &hb,
            &sv,
            formula.code(),
            machine.limits.as_ref(),
            &self.cfg.prediction,
        )?;
        validate_series("svp", &svp.absolute, &self.cfg.prediction)?;

        let integrity = classify_integrity(
            machine.id,
            position,
            &sv,
            self.store.as_ref(),
            self.clock.as_ref(),
            &self.cfg.integrity,
        );
        let at_values = compute_ambient_delta(
            machine.id,
            position,
            self.store.as_ref(),
            self.ambient.as_ref(),
            self.clock.as_ref(),
            &self.cfg.ambient,
        );

        let now = self.clock.now();
        let bundle = PushBundle {
            hb,
            svp: svp.absolute,
            chart: analysis.steady.kept.iter().map(|e| e.temp).collect(),
            duration_minutes: analysis.duration_minutes(),
            speed: req.speed,
            device_code,
            operator: operator.to_string(),
            timestamp: now,
        };
        let push_report = self.client.push(&machine, position, &bundle);
        if let Some(e) = &push_report.error {
            warnings.push(RunWarning::PushFailed {
                reason: e.to_string(),
            });
        }

        let record = PredictionRecord {
            machine_id: machine.id,
            position,
            created_at: now,
            started_at: analysis.medians.started_at,
            ended_at: analysis.medians.ended_at,
            speed: req.speed,
            sequence: req.sequence,
            sv_values: sv,
            sv_source,
            formula_id: formula,
            hb_values: hb,
            svp_values: svp.absolute,
            svp_values_rel: svp.relative,
            at_values,
            integrity,
            is_applied: push_report.applied,
            device_code: req.device_code.clone(),
            operator: operator.to_string(),
            binning_version: analysis.medians.version,
            threshold_c: analysis.steady.threshold_c,
            push_log: push_report.steps.clone(),
            logs: analysis.steady.kept,
        };
        self.store.save(&record)?;

        tracing::info!(
            machine_id = machine.id,
            %position,
            %formula,
            %integrity,
            applied = record.is_applied,
            warnings = warnings.len(),
            "calibration run recorded"
        );
        Ok(RunOutcome {
            record,
            push_report,
            warnings,
        })
    }

    /// Which configured machines had an upper/lower run inside the recent window.
    pub fn recent_uploads(&self) -> Result<Vec<RecentUpload>> {
        let now = self.clock.now();
        let since = now - self.cfg.push.recent_window;
        // include runs recorded in the current second
        let before = now + TimeDelta::seconds(1);
        self.machines
            .iter()
            .map(|m| {
                let upper = self
                    .store
                    .latest_before(m.id, Position::Upper, before, Some(since))?
                    .is_some();
                let lower = self
                    .store
                    .latest_before(m.id, Position::Lower, before, Some(since))?
                    .is_some();
                Ok(RecentUpload {
                    machine_id: m.id,
                    line: m.line,
                    upper,
                    lower,
                })
            })
            .collect()
    }
}
