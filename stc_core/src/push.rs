//! Register push to the chamber controller, and the live SV read.
//!
//! A push is a fixed, ordered, single-pass sequence of named writes. The
//! first failing step stops the sequence; writes already sent stay on the
//! controller. Every step's outcome is logged in order so a partial push
//! can be reconstructed later.

use std::net::IpAddr;

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use stc_traits::{Connector, RegisterBus};

use crate::config::{ControllerCfg, PushCfg, RegisterMap, RegisterMaps};
use crate::error::{Result, StcError};
use crate::hw_error::map_bus_error;
use crate::types::{MachineProfile, Position, SECTION_COUNT};
use crate::util::to_word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStep {
    SectionHb,
    ZoneHb,
    SectionSvp,
    ApplySvw,
    ChartHb,
    InfoDuration,
    InfoSpeed,
    InfoDeviceCode,
    InfoOperator,
    InfoYear,
    InfoMonthDate,
    InfoTime,
}

impl PushStep {
    /// Order in which a full push writes to the controller.
    pub const SEQUENCE: [PushStep; 12] = [
        PushStep::SectionHb,
        PushStep::ZoneHb,
        PushStep::SectionSvp,
        PushStep::ApplySvw,
        PushStep::ChartHb,
        PushStep::InfoDuration,
        PushStep::InfoSpeed,
        PushStep::InfoDeviceCode,
        PushStep::InfoOperator,
        PushStep::InfoYear,
        PushStep::InfoMonthDate,
        PushStep::InfoTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PushStep::SectionHb => "section_hb",
            PushStep::ZoneHb => "zone_hb",
            PushStep::SectionSvp => "section_svp",
            PushStep::ApplySvw => "apply_svw",
            PushStep::ChartHb => "chart_hb",
            PushStep::InfoDuration => "info_duration",
            PushStep::InfoSpeed => "info_speed",
            PushStep::InfoDeviceCode => "info_device_code",
            PushStep::InfoOperator => "info_operator",
            PushStep::InfoYear => "info_year",
            PushStep::InfoMonthDate => "info_month_date",
            PushStep::InfoTime => "info_time",
        }
    }

    pub fn address(self, map: &RegisterMap) -> u16 {
        match self {
            PushStep::SectionHb => map.section_hb,
            PushStep::ZoneHb => map.zone_hb,
            PushStep::SectionSvp => map.section_svp,
            PushStep::ApplySvw => map.apply_svw,
            PushStep::ChartHb => map.chart_hb,
            PushStep::InfoDuration => map.info_duration,
            PushStep::InfoSpeed => map.info_speed,
            PushStep::InfoDeviceCode => map.info_device_code,
            PushStep::InfoOperator => map.info_operator,
            PushStep::InfoYear => map.info_year,
            PushStep::InfoMonthDate => map.info_month_date,
            PushStep::InfoTime => map.info_time,
        }
    }
}

impl std::fmt::Display for PushStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Words(Vec<u16>),
    Coil(bool),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Words(w) => w.len(),
            Payload::Coil(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Sent,
    Failed { error: String },
    NotAttempted,
}

/// One line of the push diagnostics log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    pub index: usize,
    pub step: PushStep,
    pub words: usize,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushReport {
    /// True only when every step was sent.
    pub applied: bool,
    pub steps: Vec<StepLog>,
    /// Connection or step failure that stopped the push.
    pub error: Option<StcError>,
}

impl PushReport {
    pub fn failed_step(&self) -> Option<&StepLog> {
        self.steps
            .iter()
            .find(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
    }

    pub fn sent_steps(&self) -> impl Iterator<Item = &StepLog> {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Sent)
    }
}

/// Everything a full push writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PushBundle {
    pub hb: [f64; SECTION_COUNT],
    pub svp: [f64; SECTION_COUNT],
    /// Kept probe temperatures in steady-state order.
    pub chart: Vec<f64>,
    pub duration_minutes: u16,
    pub speed: f64,
    pub device_code: u16,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

/// Numeric device code from its digits, e.g. `"TC-0042"` is 42.
pub fn parse_device_code(code: &str) -> Result<u16> {
    let digits: String = code.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(StcError::Validation(format!(
            "device code {code:?} contains no digits"
        )));
    }
    digits.parse::<u16>().map_err(|_| {
        StcError::Validation(format!("device code {code:?} does not fit a 16-bit register"))
    })
}

/// Operator name packed two bytes per word, low byte first, zero padded.
/// Non-ASCII characters are sent as `?`.
pub fn encode_operator(name: &str, words: usize) -> Vec<u16> {
    let bytes: Vec<u8> = name
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(words * 2)
        .collect();
    (0..words)
        .map(|i| {
            let lo = bytes.get(2 * i).copied().unwrap_or(0);
            let hi = bytes.get(2 * i + 1).copied().unwrap_or(0);
            u16::from_le_bytes([lo, hi])
        })
        .collect()
}

fn plant_offset(cfg: &PushCfg) -> FixedOffset {
    FixedOffset::east_opt(cfg.plant_utc_offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix())
}

/// Build the full ordered write plan for a bundle.
pub fn plan(bundle: &PushBundle, cfg: &PushCfg) -> Vec<(PushStep, Payload)> {
    let local = bundle.timestamp.with_timezone(&plant_offset(cfg));
    let hb = &bundle.hb;

    PushStep::SEQUENCE
        .iter()
        .map(|&step| {
            let payload = match step {
                PushStep::SectionHb => Payload::Words(hb.iter().map(|v| to_word(*v)).collect()),
                PushStep::ZoneHb => Payload::Words(
                    hb.chunks_exact(2)
                        .map(|p| to_word((p[0] + p[1]) / 2.0))
                        .collect(),
                ),
                PushStep::SectionSvp => {
                    Payload::Words(bundle.svp.iter().map(|v| to_word(*v)).collect())
                }
                PushStep::ApplySvw => Payload::Coil(true),
                PushStep::ChartHb => Payload::Words(
                    bundle
                        .chart
                        .iter()
                        .map(|t| to_word(*t))
                        .chain(std::iter::repeat(0))
                        .take(cfg.chart_points)
                        .collect(),
                ),
                PushStep::InfoDuration => Payload::Words(vec![bundle.duration_minutes]),
                // tenths of the speed, truncated
                PushStep::InfoSpeed => {
                    Payload::Words(vec![to_word((bundle.speed * 10.0).trunc())])
                }
                PushStep::InfoDeviceCode => Payload::Words(vec![bundle.device_code]),
                PushStep::InfoOperator => {
                    Payload::Words(encode_operator(&bundle.operator, cfg.operator_words))
                }
                PushStep::InfoYear => {
                    Payload::Words(vec![u16::try_from(local.year()).unwrap_or(0)])
                }
                PushStep::InfoMonthDate => {
                    Payload::Words(vec![(local.month() * 100 + local.day()) as u16])
                }
                PushStep::InfoTime => {
                    Payload::Words(vec![(local.hour() * 100 + local.minute()) as u16])
                }
            };
            (step, payload)
        })
        .collect()
}

/// Result of trying to read the controller's current setpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveSv {
    /// Loopback controller address; there is no device to ask.
    Skipped,
    /// The controller answered, but with non-positive values.
    Rejected(Vec<u16>),
    Values([f64; SECTION_COUNT]),
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Talks to chamber controllers through a [`Connector`].
pub struct RegisterPushClient {
    connector: Box<dyn Connector>,
    controller: ControllerCfg,
    registers: RegisterMaps,
    push_cfg: PushCfg,
}

impl RegisterPushClient {
    pub fn new(
        connector: Box<dyn Connector>,
        controller: ControllerCfg,
        registers: RegisterMaps,
        push_cfg: PushCfg,
    ) -> Self {
        Self {
            connector,
            controller,
            registers,
            push_cfg,
        }
    }

    pub fn registers(&self, position: Position) -> &RegisterMap {
        self.registers.for_position(position)
    }

    fn open(&mut self, machine: &MachineProfile) -> Result<Box<dyn RegisterBus>> {
        self.connector
            .connect(
                &machine.ip_address,
                self.controller.port,
                self.controller.connect_timeout,
            )
            .map_err(|e| map_bus_error(&*e))
    }

    /// Read the eight section setpoints currently on the controller.
    pub fn read_live_sv(&mut self, machine: &MachineProfile, position: Position) -> Result<LiveSv> {
        if is_loopback(&machine.ip_address) {
            tracing::debug!(
                machine_id = machine.id,
                ip = %machine.ip_address,
                "loopback controller; live SV skipped"
            );
            return Ok(LiveSv::Skipped);
        }
        let address = self.registers(position).sv_r;
        let mut bus = self.open(machine)?;
        let words = bus
            .read_holding(
                self.controller.unit_id,
                address,
                SECTION_COUNT as u16,
                self.controller.read_timeout,
            )
            .map_err(|e| map_bus_error(&*e))?;
        // words are signed; a non-positive setpoint makes the whole read unusable
        if words.len() != SECTION_COUNT || words.iter().any(|&w| (w as i16) <= 0) {
            tracing::warn!(machine_id = machine.id, %position, ?words, "live SV rejected");
            return Ok(LiveSv::Rejected(words));
        }
        let values = std::array::from_fn(|i| f64::from(words[i] as i16));
        tracing::debug!(machine_id = machine.id, %position, ?values, "live SV read");
        Ok(LiveSv::Values(values))
    }

    /// Full push of a calibration result.
    pub fn push(
        &mut self,
        machine: &MachineProfile,
        position: Position,
        bundle: &PushBundle,
    ) -> PushReport {
        let steps = plan(bundle, &self.push_cfg);
        self.execute(machine, position, steps)
    }

    /// Send `steps` in order, stopping at the first failure.
    pub fn execute(
        &mut self,
        machine: &MachineProfile,
        position: Position,
        steps: Vec<(PushStep, Payload)>,
    ) -> PushReport {
        let mut log: Vec<StepLog> = steps
            .iter()
            .enumerate()
            .map(|(index, (step, payload))| StepLog {
                index,
                step: *step,
                words: payload.len(),
                outcome: StepOutcome::NotAttempted,
            })
            .collect();

        let mut bus = match self.open(machine) {
            Ok(bus) => bus,
            Err(e) => {
                tracing::warn!(
                    machine_id = machine.id,
                    %position,
                    error = %e,
                    "push aborted: controller unreachable"
                );
                return PushReport {
                    applied: false,
                    steps: log,
                    error: Some(e),
                };
            }
        };

        let map = *self.registers(position);
        let unit = self.controller.unit_id;
        let timeout = self.controller.write_timeout;

        for (index, (step, payload)) in steps.iter().enumerate() {
            let address = step.address(&map);
            let sent = match payload {
                Payload::Words(words) => bus.write_registers(unit, address, words, timeout),
                Payload::Coil(value) => bus.write_coil(unit, address, *value, timeout),
            };
            match sent {
                Ok(()) => {
                    tracing::debug!(index, step = %step, address, "push step sent");
                    log[index].outcome = StepOutcome::Sent;
                }
                Err(e) => {
                    let err = map_bus_error(&*e);
                    tracing::warn!(
                        machine_id = machine.id,
                        %position,
                        index,
                        step = %step,
                        error = %err,
                        "push stopped; earlier writes stay on the controller"
                    );
                    log[index].outcome = StepOutcome::Failed {
                        error: err.to_string(),
                    };
                    return PushReport {
                        applied: false,
                        steps: log,
                        error: Some(err),
                    };
                }
            }
        }

        tracing::info!(machine_id = machine.id, %position, steps = log.len(), "push applied");
        PushReport {
            applied: true,
            steps: log,
            error: None,
        }
    }
}
