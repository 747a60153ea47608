//! Integrity classification: did the operator keep the last predicted setpoints?

use stc_traits::Clock;

use crate::config::IntegrityCfg;
use crate::store::RecordStore;
use crate::types::{Integrity, Position, SECTION_COUNT};

/// Compare the SV used now against the SVP a prior run predicted.
pub fn classify_against(prior_svp: &[f64], sv: &[f64], tolerance_c: f64) -> Integrity {
    if prior_svp.len() != SECTION_COUNT || sv.len() != SECTION_COUNT {
        return Integrity::None;
    }
    if prior_svp
        .iter()
        .zip(sv)
        .all(|(p, s)| (s - p).abs() <= tolerance_c)
    {
        Integrity::Stable
    } else {
        Integrity::Modified
    }
}

pub fn classify_integrity(
    machine_id: u32,
    position: Position,
    sv: &[f64],
    store: &dyn RecordStore,
    clock: &dyn Clock,
    cfg: &IntegrityCfg,
) -> Integrity {
    let now = clock.now();
    match store.latest_before(machine_id, position, now, Some(now - cfg.window)) {
        Ok(Some(prior)) => classify_against(&prior.svp_values, sv, cfg.tolerance_c),
        Ok(None) => Integrity::None,
        Err(e) => {
            tracing::info!(machine_id, %position, error = %e, "integrity lookup failed");
            Integrity::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVP: [f64; 8] = [80.0, 75.0, 70.0, 65.0, 60.0, 55.0, 50.0, 45.0];

    #[test]
    fn within_tolerance_is_stable() {
        let sv = SVP.map(|v| v + 2.0);
        assert_eq!(classify_against(&SVP, &sv, 2.0), Integrity::Stable);
    }

    #[test]
    fn one_slot_off_is_modified() {
        let mut sv = SVP;
        sv[5] -= 3.0;
        assert_eq!(classify_against(&SVP, &sv, 2.0), Integrity::Modified);
    }

    #[test]
    fn wrong_length_is_none() {
        assert_eq!(classify_against(&SVP, &SVP[..7], 2.0), Integrity::None);
    }
}
