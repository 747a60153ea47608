#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Steam-chamber calibration engine (hardware-agnostic).
//!
//! Turns a probe's thermal log into corrected chamber setpoints and pushes
//! them to the chamber controller. Controller I/O goes through
//! `stc_traits::Connector`/`RegisterBus`; time comes from `stc_traits::Clock`.
//!
//! ## Pipeline
//!
//! - **Ingest**: raw CSV cells to cleaned, de-duplicated readings (`ingest`)
//! - **Steady state**: endpoint threshold and row filtering (`steady_state`)
//! - **Sections**: proportional binning into ten sections, medians (`sections`)
//! - **Prediction**: formulas 411/412/421 with limit clamping (`prediction`)
//! - **Bookkeeping**: ambient delta and integrity against prior runs
//! - **Push**: ordered register writes with a per-step log (`push`)
//!
//! `Calibrator` runs the whole pipeline for one machine and position and
//! persists the result through a `RecordStore`.

pub mod ambient;
pub mod ambient_adjust;
pub mod builder;
pub mod calibrator;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod ingest;
pub mod integrity;
pub mod lock;
pub mod mocks;
pub mod prediction;
pub mod push;
pub mod sections;
pub mod steady_state;
pub mod store;
pub mod types;
pub mod util;

pub use ambient::{AmbientReading, AmbientSource, FixedAmbient, NoAmbient, compute_ambient_delta};
pub use ambient_adjust::{AdjustOutcome, AmbientAdjustment, shift_setpoints};
pub use builder::CalibratorBuilder;
pub use calibrator::{
    Analysis, Calibrator, RecentUpload, RunOutcome, RunRequest, RunWarning, analyze_log,
};
pub use config::CalibratorCfg;
pub use error::{BuildError, Result, StcError};
pub use ingest::{CleanedLog, ingest};
pub use integrity::classify_integrity;
pub use lock::{RunGuard, RunLocks};
pub use prediction::{SvpResult, predict};
pub use push::{LiveSv, PushBundle, PushReport, PushStep, RegisterPushClient, StepLog, StepOutcome};
pub use sections::{SectionMedians, compute_section_medians};
pub use steady_state::{DetectorWarning, SteadyState, detect_steady_state};
pub use store::{JsonlStore, MemoryStore, RecordStore};
pub use types::{
    AtValues, FormulaId, Integrity, LogEntry, MachineProfile, Position, PredictionRecord, Section,
    SectionLimits, SvSource,
};
