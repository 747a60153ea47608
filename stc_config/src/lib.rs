#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and raw thermal-log loading for the steam-chamber calibrator.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Thermal logs are headerless, ragged CSV exports of a handheld probe;
//!   the loader only splits cells, interpretation happens in the core.
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

/// Number of heated sections on a chamber (section_1..section_8).
pub const SECTION_COUNT: usize = 8;
/// Bins in the positional layout: preheat, eight sections, postheat.
pub const BIN_COUNT: usize = SECTION_COUNT + 2;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControllerCfg {
    pub port: u16,
    pub unit_id: u8,
    /// Live SV read timeout.
    pub read_timeout_ms: u64,
    /// Per-write timeout during a push.
    pub write_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            port: 503,
            unit_id: 1,
            read_timeout_ms: 2000,
            write_timeout_ms: 3000,
            connect_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestCfg {
    /// Fixed header rows at the top of every probe export.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectorCfg {
    /// A window whose population stddev is below this counts as settled.
    pub stddev_threshold_c: f64,
    pub min_endpoint_c: f64,
    pub max_endpoint_c: f64,
    pub slide_window: usize,
    /// How many rejected rows are re-admitted after filtering.
    pub readmit_rejected: usize,
    /// Below this many kept rows a warning is raised.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BinningCfg {
    pub version: u32,
    /// Relative bin sizes: preheat, section_1..section_8, postheat.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PredictionCfg {
    /// Formula used when a run does not name one (411, 412 or 421).
    pub default_formula: u16,
    pub aggressive_gain: f64,
    pub delicate_gain: f64,
    pub ratio_gain: f64,
    /// Accepted range for HB, SV and the resulting SVP.
    pub min_sv_c: f64,
    pub max_sv_c: f64,
}

impl Default for PredictionCfg {
    fn default() -> Self {
        Self {
            default_formula: 412,
            aggressive_gain: 1.0,
            delicate_gain: 0.5,
            ratio_gain: 1.0,
            min_sv_c: 30.0,
            max_sv_c: 99.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AmbientCfg {
    pub lookback_minutes: u32,
    /// Deltas larger than this (absolute) are treated as sensor noise.
    pub max_abs_delta_c: f64,
    /// Ambient adjustment skips positions calibrated more recently than this.
    pub adjust_skip_minutes: u32,
}

impl Default for AmbientCfg {
    fn default() -> Self {
        Self {
            lookback_minutes: 60,
            max_abs_delta_c: 10.0,
            adjust_skip_minutes: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IntegrityCfg {
    pub window_hours: u32,
    pub tolerance_c: f64,
}

impl Default for IntegrityCfg {
    fn default() -> Self {
        Self {
            window_hours: 6,
            tolerance_c: 2.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PushCfg {
    pub chart_points: usize,
    pub operator_words: usize,
    /// Offset of plant-local time from UTC for the info date/time words.
    pub plant_utc_offset_minutes: i32,
    /// Window for the "recent uploads" overview.
    pub recent_window_minutes: u32,
}

impl Default for PushCfg {
    fn default() -> Self {
        Self {
            chart_points: 60,
            operator_words: 6,
            plant_utc_offset_minutes: 7 * 60,
            recent_window_minutes: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreCfg {
    /// JSON-lines file holding one prediction record per line.
    pub path: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: "var/stc_records.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Controller register addresses for one chamber position. Firmware-owned.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub sv_r: u16,
    /// Coil that makes the controller adopt the written SVP.
    pub apply_svw: u16,
    pub section_hb: u16,
    pub zone_hb: u16,
    pub section_svp: u16,
    pub chart_hb: u16,
    pub info_duration: u16,
    pub info_speed: u16,
    pub info_device_code: u16,
    pub info_operator: u16,
    pub info_year: u16,
    pub info_month_date: u16,
    pub info_time: u16,
}

impl RegisterMap {
    fn with_base(base: u16) -> Self {
        Self {
            sv_r: base + 100,
            apply_svw: base + 10,
            section_hb: base + 200,
            zone_hb: base + 210,
            section_svp: base + 220,
            chart_hb: base + 300,
            info_duration: base + 400,
            info_speed: base + 401,
            info_device_code: base + 402,
            info_operator: base + 403,
            info_year: base + 410,
            info_month_date: base + 411,
            info_time: base + 412,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Registers {
    pub upper: RegisterMap,
    pub lower: RegisterMap,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            upper: RegisterMap::with_base(0),
            lower: RegisterMap::with_base(1000),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MachineCfg {
    pub id: u32,
    pub line: u32,
    pub ip_address: String,
    #[serde(default)]
    pub section_limits_high: Option<[f64; SECTION_COUNT]>,
    #[serde(default)]
    pub section_limits_low: Option<[f64; SECTION_COUNT]>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerCfg,
    #[serde(default)]
    pub ingest: IngestCfg,
    #[serde(default)]
    pub detector: DetectorCfg,
    #[serde(default)]
    pub binning: BinningCfg,
    #[serde(default)]
    pub prediction: PredictionCfg,
    #[serde(default)]
    pub ambient: AmbientCfg,
    #[serde(default)]
    pub integrity: IntegrityCfg,
    #[serde(default)]
    pub push: PushCfg,
    #[serde(default)]
    pub store: StoreCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub registers: Registers,
    /// Machine profiles; managed outside this tool.
    pub machines: Vec<MachineCfg>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read a probe export into raw string cells, one `Vec` per row.
///
/// The file has no header row and rows may have differing widths.
pub fn load_thermal_log_csv(path: &Path) -> eyre::Result<Vec<Vec<String>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open thermal log {:?}: {}", path, e))?;
    read_thermal_log(file).map_err(|e| eyre::eyre!("read thermal log {:?}: {}", path, e))
}

pub fn read_thermal_log<R: std::io::Read>(reader: R) -> eyre::Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (idx, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 1, e))?;
        rows.push(rec.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

impl Config {
    pub fn machine(&self, id: u32) -> Option<&MachineCfg> {
        self.machines.iter().find(|m| m.id == id)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Controller
        if self.controller.port == 0 {
            eyre::bail!("controller.port must be > 0");
        }
        if self.controller.read_timeout_ms == 0 {
            eyre::bail!("controller.read_timeout_ms must be >= 1");
        }
        if self.controller.write_timeout_ms == 0 {
            eyre::bail!("controller.write_timeout_ms must be >= 1");
        }
        if self.controller.connect_timeout_ms == 0 {
            eyre::bail!("controller.connect_timeout_ms must be >= 1");
        }

        // Ingest
        if self.ingest.min_logs == 0 {
            eyre::bail!("ingest.min_logs must be >= 1");
        }
        if self.ingest.min_logs > self.ingest.max_logs {
            eyre::bail!("ingest.min_logs must be <= ingest.max_logs");
        }
        if self.ingest.min_temp_c >= self.ingest.max_temp_c {
            eyre::bail!("ingest.min_temp_c must be < ingest.max_temp_c");
        }

        // Detector
        if self.detector.stddev_threshold_c <= 0.0 {
            eyre::bail!("detector.stddev_threshold_c must be > 0");
        }
        if self.detector.min_endpoint_c >= self.detector.max_endpoint_c {
            eyre::bail!("detector.min_endpoint_c must be < detector.max_endpoint_c");
        }
        if self.detector.slide_window < 2 {
            eyre::bail!("detector.slide_window must be >= 2");
        }

        // Binning
        if self.binning.version == 0 {
            eyre::bail!("binning.version must be >= 1");
        }
        if self.binning.weights.contains(&0) {
            eyre::bail!("binning.weights must all be >= 1");
        }

        // Prediction
        if !matches!(self.prediction.default_formula, 411 | 412 | 421) {
            eyre::bail!(
                "prediction.default_formula must be one of 411, 412, 421 (got {})",
                self.prediction.default_formula
            );
        }
        for (name, gain) in [
            ("aggressive_gain", self.prediction.aggressive_gain),
            ("delicate_gain", self.prediction.delicate_gain),
            ("ratio_gain", self.prediction.ratio_gain),
        ] {
            if !(gain.is_finite() && gain > 0.0) {
                eyre::bail!("prediction.{name} must be > 0");
            }
        }
        if self.prediction.min_sv_c >= self.prediction.max_sv_c {
            eyre::bail!("prediction.min_sv_c must be < prediction.max_sv_c");
        }

        // Ambient / integrity
        if self.ambient.lookback_minutes == 0 {
            eyre::bail!("ambient.lookback_minutes must be >= 1");
        }
        if self.ambient.max_abs_delta_c <= 0.0 {
            eyre::bail!("ambient.max_abs_delta_c must be > 0");
        }
        if self.integrity.window_hours == 0 {
            eyre::bail!("integrity.window_hours must be >= 1");
        }
        if self.integrity.tolerance_c < 0.0 {
            eyre::bail!("integrity.tolerance_c must be >= 0");
        }

        // Push
        if self.push.chart_points == 0 || self.push.chart_points > 123 {
            eyre::bail!("push.chart_points must be in 1..=123");
        }
        if self.push.operator_words == 0 {
            eyre::bail!("push.operator_words must be >= 1");
        }
        if self.push.plant_utc_offset_minutes.abs() > 14 * 60 {
            eyre::bail!("push.plant_utc_offset_minutes must be within +/-14h");
        }

        if self.store.path.trim().is_empty() {
            eyre::bail!("store.path must not be empty");
        }
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {r:?}");
        }

        // Machines
        let mut seen = HashSet::new();
        for m in &self.machines {
            if !seen.insert(m.id) {
                eyre::bail!("duplicate machine id {}", m.id);
            }
            if m.ip_address.trim().is_empty() {
                eyre::bail!("machine {}: ip_address must not be empty", m.id);
            }
            match (&m.section_limits_low, &m.section_limits_high) {
                (None, None) => {}
                (Some(low), Some(high)) => {
                    for (i, (lo, hi)) in low.iter().zip(high).enumerate() {
                        if lo > hi {
                            eyre::bail!(
                                "machine {}: section {} limit low {} > high {}",
                                m.id,
                                i + 1,
                                lo,
                                hi
                            );
                        }
                    }
                }
                _ => eyre::bail!(
                    "machine {}: section_limits_low and section_limits_high must be set together",
                    m.id
                ),
            }
        }

        Ok(())
    }
}
