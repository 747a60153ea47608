//! Builder for [`Calibrator`].
//!
//! A record store and a controller connector are required; everything else
//! has a default. `try_build()` validates the runtime config and converts
//! machine profiles, reporting problems as typed [`BuildError`]s inside an
//! `eyre::Report`.

use stc_traits::{Clock, Connector, SystemClock};

use crate::ambient::{AmbientSource, NoAmbient};
use crate::calibrator::Calibrator;
use crate::config::CalibratorCfg;
use crate::error::BuildError;
use crate::lock::RunLocks;
use crate::push::RegisterPushClient;
use crate::store::RecordStore;
use crate::types::MachineProfile;

#[derive(Default)]
pub struct CalibratorBuilder {
    cfg: Option<CalibratorCfg>,
    machines: Vec<MachineProfile>,
    machine_cfgs: Vec<stc_config::MachineCfg>,
    store: Option<Box<dyn RecordStore>>,
    ambient: Option<Box<dyn AmbientSource>>,
    connector: Option<Box<dyn Connector>>,
    clock: Option<Box<dyn Clock>>,
    locks: Option<RunLocks>,
    config_error: Option<String>,
}

impl CalibratorBuilder {
    /// Runtime settings and machine profiles from a loaded TOML config.
    pub fn with_config(mut self, config: &stc_config::Config) -> Self {
        match CalibratorCfg::try_from(config) {
            Ok(cfg) => self.cfg = Some(cfg),
            Err(e) => self.config_error = Some(e.to_string()),
        }
        self.machine_cfgs = config.machines.clone();
        self
    }
    /// Override runtime settings directly.
    pub fn with_settings(mut self, cfg: CalibratorCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }
    pub fn with_machines(mut self, machines: Vec<MachineProfile>) -> Self {
        self.machines = machines;
        self
    }
    pub fn with_store(mut self, store: impl RecordStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }
    pub fn with_ambient(mut self, ambient: impl AmbientSource + 'static) -> Self {
        self.ambient = Some(Box::new(ambient));
        self
    }
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }
    /// Provide a custom clock; defaults to `SystemClock`.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }
    /// Share run locks with other calibrators in the same process.
    pub fn with_locks(mut self, locks: RunLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn try_build(self) -> eyre::Result<Calibrator> {
        if let Some(msg) = self.config_error {
            return Err(eyre::Report::new(BuildError::InvalidConfig(msg)));
        }
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg)?;

        let mut machines = self.machines;
        for m in &self.machine_cfgs {
            let profile = MachineProfile::try_from(m)
                .map_err(|e| eyre::Report::new(BuildError::InvalidConfig(e.to_string())))?;
            machines.push(profile);
        }
        let mut ids: Vec<u32> = machines.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "duplicate machine id".into(),
            )));
        }

        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let connector = self
            .connector
            .ok_or_else(|| eyre::Report::new(BuildError::MissingConnector))?;

        let client = RegisterPushClient::new(
            connector,
            cfg.controller.clone(),
            cfg.registers,
            cfg.push.clone(),
        );

        Ok(Calibrator {
            cfg,
            machines,
            store,
            ambient: self.ambient.unwrap_or_else(|| Box::new(NoAmbient)),
            client,
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock::new())),
            locks: self.locks.unwrap_or_default(),
        })
    }
}

fn invalid(msg: &str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg.to_string()))
}

fn validate(cfg: &CalibratorCfg) -> eyre::Result<()> {
    if cfg.ingest.min_logs == 0 || cfg.ingest.min_logs > cfg.ingest.max_logs {
        return Err(invalid("ingest.min_logs must be in 1..=max_logs"));
    }
    if cfg.ingest.min_temp_c >= cfg.ingest.max_temp_c {
        return Err(invalid("ingest temperature range is empty"));
    }
    if cfg.detector.min_endpoint_c >= cfg.detector.max_endpoint_c {
        return Err(invalid("detector endpoint range is empty"));
    }
    if cfg.detector.slide_window < 2 {
        return Err(invalid("detector.slide_window must be >= 2"));
    }
    if cfg.binning.weights.contains(&0) {
        return Err(invalid("binning weights must be >= 1"));
    }
    if cfg.prediction.min_sv_c >= cfg.prediction.max_sv_c {
        return Err(invalid("prediction SV range is empty"));
    }
    if cfg.push.chart_points == 0 || cfg.push.chart_points > 123 {
        return Err(invalid("push.chart_points must be in 1..=123"));
    }
    if cfg.controller.write_timeout.is_zero() || cfg.controller.read_timeout.is_zero() {
        return Err(invalid("controller timeouts must be > 0"));
    }
    Ok(())
}
