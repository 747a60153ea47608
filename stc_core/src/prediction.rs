//! Corrected setpoint (SVP) prediction from measured medians (HB) and the
//! controller's reference setpoints (SV).

use crate::config::PredictionCfg;
use crate::error::{Result, StcError};
use crate::types::{FormulaId, SECTION_COUNT, SectionLimits};
use crate::util::round1;

#[derive(Debug, Clone, PartialEq)]
pub struct SvpResult {
    /// Whole-degree setpoints, clamped to the machine limits when given.
    pub absolute: [f64; SECTION_COUNT],
    /// `absolute - sv` rendered for operators, e.g. `"+3"`, `"-1.5"`, `"0"`.
    pub relative: [String; SECTION_COUNT],
}

/// Exactly eight finite values inside the configured SV range.
pub fn validate_series(name: &str, values: &[f64], cfg: &PredictionCfg) -> Result<[f64; SECTION_COUNT]> {
    let arr: [f64; SECTION_COUNT] = values.try_into().map_err(|_| {
        StcError::Validation(format!(
            "{name} needs exactly {SECTION_COUNT} values, got {}",
            values.len()
        ))
    })?;
    for (i, v) in arr.iter().enumerate() {
        if !v.is_finite() || *v < cfg.min_sv_c || *v > cfg.max_sv_c {
            return Err(StcError::Validation(format!(
                "{name}[{}] = {v} outside [{}, {}]",
                i + 1,
                cfg.min_sv_c,
                cfg.max_sv_c
            )));
        }
    }
    Ok(arr)
}

fn formula_value(formula: FormulaId, sv: f64, hb: f64, cfg: &PredictionCfg) -> f64 {
    match formula {
        FormulaId::Aggressive => sv + cfg.aggressive_gain * (sv - hb),
        FormulaId::Delicate => sv + cfg.delicate_gain * (sv - hb),
        FormulaId::Ratio => sv * (1.0 + cfg.ratio_gain * (sv - hb) / hb),
    }
}

/// Human-readable signed delta: `"+3"`, `"-1.5"`, `"0"`.
pub fn format_relative(delta: f64) -> String {
    let d = round1(delta);
    if d == 0.0 {
        "0".to_string()
    } else if d > 0.0 {
        format!("+{d}")
    } else {
        format!("{d}")
    }
}

pub fn predict(
    hb: &[f64],
    sv: &[f64],
    formula_id: u16,
    limits: Option<&SectionLimits>,
    cfg: &PredictionCfg,
) -> Result<SvpResult> {
    let hb = validate_series("hb", hb, cfg)?;
    let sv = validate_series("sv", sv, cfg)?;
    let formula = FormulaId::try_from(formula_id)?;

    let absolute: [f64; SECTION_COUNT] = std::array::from_fn(|i| {
        let v = formula_value(formula, sv[i], hb[i], cfg).round();
        match limits {
            Some(l) => l.clamp(i, v),
            None => v,
        }
    });
    let relative = std::array::from_fn(|i| format_relative(absolute[i] - sv[i]));

    tracing::debug!(%formula, ?absolute, "setpoints predicted");
    Ok(SvpResult { absolute, relative })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_formatting() {
        assert_eq!(format_relative(3.0), "+3");
        assert_eq!(format_relative(-1.5), "-1.5");
        assert_eq!(format_relative(0.0), "0");
        assert_eq!(format_relative(-0.04), "0");
        assert_eq!(format_relative(0.26), "+0.3");
    }

    #[test]
    fn ratio_formula_scales_with_relative_error() {
        let cfg = PredictionCfg::default();
        let v = formula_value(FormulaId::Ratio, 66.0, 60.0, &cfg);
        assert!((v - 72.6).abs() < 1e-9);
    }
}
