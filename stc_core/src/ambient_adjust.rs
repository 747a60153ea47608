//! Shift live setpoints to compensate for a change in plant ambient temperature.
//!
//! For each machine and position the live SV is read, moved by `-change_c`,
//! rounded to whole degrees, clamped per section, and written back as
//! `section_svp` followed by `apply_svw`. Positions calibrated within the
//! skip window are left alone.

use serde::Serialize;

use crate::calibrator::Calibrator;
use crate::push::{LiveSv, Payload, PushStep};
use crate::types::{Position, SECTION_COUNT, SectionLimits};
use crate::util::to_word;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdjustOutcome {
    /// A calibration run was recorded inside the skip window.
    SkippedRecentRun,
    SkippedBusy,
    SkippedNoLiveSv { reason: String },
    SkippedStoreError { reason: String },
    /// Dry run: computed, not written.
    Planned {
        from: [f64; SECTION_COUNT],
        to: [f64; SECTION_COUNT],
    },
    Applied {
        from: [f64; SECTION_COUNT],
        to: [f64; SECTION_COUNT],
    },
    Failed {
        from: [f64; SECTION_COUNT],
        to: [f64; SECTION_COUNT],
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbientAdjustment {
    pub machine_id: u32,
    pub position: Position,
    #[serde(flatten)]
    pub outcome: AdjustOutcome,
}

/// `round(sv - change_c)` per section, clamped to the machine limits or,
/// without limits, to `[min_c, max_c]`.
pub fn shift_setpoints(
    sv: &[f64; SECTION_COUNT],
    change_c: f64,
    limits: Option<&SectionLimits>,
    min_c: f64,
    max_c: f64,
) -> [f64; SECTION_COUNT] {
    std::array::from_fn(|i| {
        let v = (sv[i] - change_c).round();
        match limits {
            Some(l) => l.clamp(i, v),
            None => v.clamp(min_c, max_c),
        }
    })
}

impl Calibrator {
    /// Run the ambient routine over every configured machine and position.
    pub fn adjust_for_ambient(&mut self, change_c: f64, dry_run: bool) -> Vec<AmbientAdjustment> {
        let machines = self.machines.clone();
        let mut out = Vec::with_capacity(machines.len() * Position::ALL.len());
        for machine in &machines {
            for position in Position::ALL {
                let outcome = self.adjust_one(machine, position, change_c, dry_run);
                tracing::info!(
                    machine_id = machine.id,
                    %position,
                    change_c,
                    dry_run,
                    ?outcome,
                    "ambient adjustment"
                );
                out.push(AmbientAdjustment {
                    machine_id: machine.id,
                    position,
                    outcome,
                });
            }
        }
        out
    }

    fn adjust_one(
        &mut self,
        machine: &crate::types::MachineProfile,
        position: Position,
        change_c: f64,
        dry_run: bool,
    ) -> AdjustOutcome {
        let now = self.clock.now();
        match self.store.latest_before(
            machine.id,
            position,
            now,
            Some(now - self.cfg.ambient.adjust_skip),
        ) {
            Ok(Some(_)) => return AdjustOutcome::SkippedRecentRun,
            Ok(None) => {}
            Err(e) => {
                return AdjustOutcome::SkippedStoreError {
                    reason: e.to_string(),
                };
            }
        }

        let Ok(_guard) = self.locks.try_acquire(machine.id, position) else {
            return AdjustOutcome::SkippedBusy;
        };

        let from = match self.client.read_live_sv(machine, position) {
            Ok(LiveSv::Values(v)) => v,
            Ok(LiveSv::Skipped) => {
                return AdjustOutcome::SkippedNoLiveSv {
                    reason: "loopback controller".into(),
                };
            }
            Ok(LiveSv::Rejected(words)) => {
                return AdjustOutcome::SkippedNoLiveSv {
                    reason: format!("non-positive setpoints {words:?}"),
                };
            }
            Err(e) => {
                return AdjustOutcome::SkippedNoLiveSv {
                    reason: e.to_string(),
                };
            }
        };

        let to = shift_setpoints(
            &from,
            change_c,
            machine.limits.as_ref(),
            self.cfg.prediction.min_sv_c,
            self.cfg.prediction.max_sv_c,
        );
        if dry_run {
            return AdjustOutcome::Planned { from, to };
        }

        let steps = vec![
            (
                PushStep::SectionSvp,
                Payload::Words(to.iter().map(|v| to_word(*v)).collect()),
            ),
            (PushStep::ApplySvw, Payload::Coil(true)),
        ];
        let report = self.client.execute(machine, position, steps);
        match report.error {
            None if report.applied => AdjustOutcome::Applied { from, to },
            Some(e) => AdjustOutcome::Failed {
                from,
                to,
                error: e.to_string(),
            },
            None => AdjustOutcome::Failed {
                from,
                to,
                error: "push not applied".into(),
            },
        }
    }
}
