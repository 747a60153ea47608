//! Ambient temperature (AT) bookkeeping for a calibration run.

use chrono::{DateTime, Utc};
use stc_traits::Clock;

use crate::config::AmbientCfg;
use crate::store::RecordStore;
use crate::types::{AtValues, Position};
use crate::util::round1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientReading {
    pub taken_at: DateTime<Utc>,
    pub temp_c: f64,
}

/// Source of plant ambient temperature readings.
pub trait AmbientSource {
    /// Most recent reading taken at or after `since`.
    fn latest_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Option<AmbientReading>, Box<dyn std::error::Error + Send + Sync>>;
}

/// No ambient sensor available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAmbient;

impl AmbientSource for NoAmbient {
    fn latest_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Option<AmbientReading>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(None)
    }
}

/// A single known reading, e.g. typed in by the operator.
#[derive(Debug, Clone, Copy)]
pub struct FixedAmbient(pub AmbientReading);

impl AmbientSource for FixedAmbient {
    fn latest_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Option<AmbientReading>, Box<dyn std::error::Error + Send + Sync>> {
        Ok((self.0.taken_at >= since).then_some(self.0))
    }
}

/// `[previous, current, delta]` for one machine/position.
///
/// Each slot degrades to 0 on its own when its input is missing or failing.
pub fn compute_ambient_delta(
    machine_id: u32,
    position: Position,
    store: &dyn RecordStore,
    ambient: &dyn AmbientSource,
    clock: &dyn Clock,
    cfg: &AmbientCfg,
) -> AtValues {
    let now = clock.now();

    let previous = match store.latest_before(machine_id, position, now, None) {
        Ok(Some(r)) => r.at_values.current,
        Ok(None) => 0.0,
        Err(e) => {
            tracing::info!(machine_id, %position, error = %e, "previous AT unavailable");
            0.0
        }
    };

    let current = match ambient.latest_since(now - cfg.lookback) {
        Ok(Some(r)) if r.temp_c > 0.0 => r.temp_c,
        Ok(_) => 0.0,
        Err(e) => {
            tracing::info!(machine_id, %position, error = %e, "current AT unavailable");
            0.0
        }
    };

    let previous = round1(previous);
    let current = round1(current);
    let delta = if previous > 0.0 && current > 0.0 {
        let d = round1(current - previous);
        if d.abs() > cfg.max_abs_delta_c { 0.0 } else { d }
    } else {
        0.0
    };

    AtValues {
        previous,
        current,
        delta,
    }
}
