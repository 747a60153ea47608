//! Domain types shared by every calibration stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StcError;
use crate::push::StepLog;

pub use stc_config::{BIN_COUNT, SECTION_COUNT};

/// Chamber half a probe log was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Upper,
    Lower,
}

impl Position {
    pub const ALL: [Position; 2] = [Position::Upper, Position::Lower];

    pub fn as_str(self) -> &'static str {
        match self {
            Position::Upper => "upper",
            Position::Lower => "lower",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = StcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upper" => Ok(Position::Upper),
            "lower" => Ok(Position::Lower),
            other => Err(StcError::Validation(format!(
                "position must be upper or lower, got {other:?}"
            ))),
        }
    }
}

/// Positional bins along the chamber, in travel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Preheat,
    Section1,
    Section2,
    Section3,
    Section4,
    Section5,
    Section6,
    Section7,
    Section8,
    Postheat,
}

impl Section {
    pub const ALL: [Section; BIN_COUNT] = [
        Section::Preheat,
        Section::Section1,
        Section::Section2,
        Section::Section3,
        Section::Section4,
        Section::Section5,
        Section::Section6,
        Section::Section7,
        Section::Section8,
        Section::Postheat,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Section::Preheat => "preheat",
            Section::Section1 => "section_1",
            Section::Section2 => "section_2",
            Section::Section3 => "section_3",
            Section::Section4 => "section_4",
            Section::Section5 => "section_5",
            Section::Section6 => "section_6",
            Section::Section7 => "section_7",
            Section::Section8 => "section_8",
            Section::Postheat => "postheat",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One probe reading after cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub taken_at: DateTime<Utc>,
    /// Degrees Celsius, clamped to the ingest range.
    pub temp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvSource {
    Live,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrity {
    #[default]
    None,
    Stable,
    Modified,
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Integrity::None => "none",
            Integrity::Stable => "stable",
            Integrity::Modified => "modified",
        })
    }
}

/// Setpoint correction formula, identified on the wire and in records by its numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum FormulaId {
    /// 411: full differential correction.
    Aggressive,
    /// 412: half differential correction.
    Delicate,
    /// 421: correction proportional to the relative error.
    Ratio,
}

impl FormulaId {
    pub fn code(self) -> u16 {
        match self {
            FormulaId::Aggressive => 411,
            FormulaId::Delicate => 412,
            FormulaId::Ratio => 421,
        }
    }
}

impl TryFrom<u16> for FormulaId {
    type Error = StcError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            411 => Ok(FormulaId::Aggressive),
            412 => Ok(FormulaId::Delicate),
            421 => Ok(FormulaId::Ratio),
            other => Err(StcError::Validation(format!(
                "unknown formula id {other} (expected 411, 412 or 421)"
            ))),
        }
    }
}

impl From<FormulaId> for u16 {
    fn from(f: FormulaId) -> Self {
        f.code()
    }
}

impl fmt::Display for FormulaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Per-section setpoint bounds. Every `low[i] <= high[i]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionLimits {
    low: [f64; SECTION_COUNT],
    high: [f64; SECTION_COUNT],
}

impl SectionLimits {
    pub fn new(low: [f64; SECTION_COUNT], high: [f64; SECTION_COUNT]) -> Result<Self, StcError> {
        for (i, (lo, hi)) in low.iter().zip(&high).enumerate() {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                return Err(StcError::Validation(format!(
                    "section {} limits invalid: low {lo}, high {hi}",
                    i + 1
                )));
            }
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> &[f64; SECTION_COUNT] {
        &self.low
    }

    pub fn high(&self) -> &[f64; SECTION_COUNT] {
        &self.high
    }

    pub fn clamp(&self, section: usize, value: f64) -> f64 {
        value.clamp(self.low[section], self.high[section])
    }
}

/// Externally managed machine profile. Read-only to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineProfile {
    pub id: u32,
    pub line: u32,
    pub ip_address: String,
    pub limits: Option<SectionLimits>,
}

/// Ambient temperature bookkeeping: `[previous, current, delta]`.
/// Persisted as a plain three-element array.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct AtValues {
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
}

impl AtValues {
    pub fn to_array(self) -> [f64; 3] {
        self.into()
    }
}

impl From<AtValues> for [f64; 3] {
    fn from(at: AtValues) -> Self {
        [at.previous, at.current, at.delta]
    }
}

impl From<[f64; 3]> for AtValues {
    fn from([previous, current, delta]: [f64; 3]) -> Self {
        Self {
            previous,
            current,
            delta,
        }
    }
}

/// Outcome of one calibration run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub machine_id: u32,
    pub position: Position,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub speed: f64,
    pub sequence: u8,
    pub sv_values: [f64; SECTION_COUNT],
    pub sv_source: SvSource,
    pub formula_id: FormulaId,
    pub hb_values: [f64; SECTION_COUNT],
    pub svp_values: [f64; SECTION_COUNT],
    pub svp_values_rel: [String; SECTION_COUNT],
    pub at_values: AtValues,
    #[serde(default)]
    pub integrity: Integrity,
    pub is_applied: bool,
    pub device_code: String,
    pub operator: String,
    pub binning_version: u32,
    pub threshold_c: f64,
    #[serde(default)]
    pub push_log: Vec<StepLog>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}
