//! Small numeric helpers.

/// Median of `values`; mean of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation (divides by n).
pub fn population_stddev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Round half away from zero to one decimal.
#[inline]
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Nearest register word for a temperature-like value.
#[inline]
pub fn to_word(x: f64) -> u16 {
    if !x.is_finite() {
        return 0;
    }
    x.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn stddev_is_population() {
        let sd = population_stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn round1_half_away_from_zero() {
        assert_eq!(round1(1.25), 1.3);
        assert_eq!(round1(-1.25), -1.3);
        assert_eq!(round1(0.04), 0.0);
    }

    #[test]
    fn word_saturates() {
        assert_eq!(to_word(72.5), 73);
        assert_eq!(to_word(-4.0), 0);
        assert_eq!(to_word(f64::NAN), 0);
        assert_eq!(to_word(1e9), u16::MAX);
    }
}
