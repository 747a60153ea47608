use rstest::rstest;
use stc_core::config::{BinningCfg, DetectorCfg, IngestCfg, PredictionCfg};
use stc_core::mocks::{HEADER_ROWS, linear_ramp, thermal_rows};
use stc_core::sections::bin_bounds;
use stc_core::steady_state::endpoint_threshold;
use stc_core::{
    CalibratorCfg, DetectorWarning, Section, StcError, analyze_log, compute_section_medians,
    detect_steady_state, ingest, predict,
};

const SERIAL_2025_03_01: f64 = 45_717.0;

fn rows(temps: &[f64]) -> Vec<Vec<String>> {
    thermal_rows(SERIAL_2025_03_01, 1.0, temps)
}

#[test]
fn cooling_ramp_runs_through_every_stage() {
    let log = ingest(&rows(&linear_ramp(40, 90.0, 30.0)), &IngestCfg::default()).unwrap();
    assert_eq!(log.entries.len(), 40);
    assert_eq!(log.skipped_rows, 0);
    assert_eq!(log.duplicate_rows, 0);

    let steady = detect_steady_state(&log.entries, &DetectorCfg::default()).unwrap();
    assert_eq!(steady.threshold_c, 35.0);
    assert!(steady.kept.len() >= 20);
    assert_eq!(steady.kept.len(), 38);
    assert_eq!(steady.readmitted.len(), 2);
    assert_eq!(steady.rejected.len(), 2);
    assert!(steady.warning.is_none());
    assert!(steady.kept.windows(2).all(|w| w[0].taken_at < w[1].taken_at));

    let medians = compute_section_medians(&steady.kept, &BinningCfg::default()).unwrap();
    assert_eq!(medians.version, 1);
    let hb = medians.hb_values();
    assert!(hb.windows(2).all(|w| w[0] > w[1]), "{hb:?}");
    assert!(medians.preheat > hb[0]);
    assert!(medians.postheat.is_some());
    assert_eq!(medians.get(Section::Section1), Some(hb[0]));
    assert_eq!(medians.started_at, steady.kept[0].taken_at);
}

#[test]
fn delicate_formula_reference_case() {
    let hb = [70.0, 70.0, 60.0, 60.0, 50.0, 50.0, 40.0, 40.0];
    let sv = [72.0, 72.0, 62.0, 62.0, 52.0, 52.0, 42.0, 42.0];
    let svp = predict(&hb, &sv, 412, None, &PredictionCfg::default()).unwrap();
    assert_eq!(svp.absolute, [73.0, 73.0, 63.0, 63.0, 53.0, 53.0, 43.0, 43.0]);
    assert!(svp.relative.iter().all(|r| r == "+1"));
}

#[rstest]
#[case(411, [74.0, 74.0, 64.0, 64.0, 54.0, 54.0, 44.0, 44.0])]
#[case(421, [74.0, 74.0, 64.0, 64.0, 54.0, 54.0, 44.0, 44.0])]
fn other_formulas(#[case] formula: u16, #[case] expected: [f64; 8]) {
    let hb = [70.0, 70.0, 60.0, 60.0, 50.0, 50.0, 40.0, 40.0];
    let sv = [72.0, 72.0, 62.0, 62.0, 52.0, 52.0, 42.0, 42.0];
    let svp = predict(&hb, &sv, formula, None, &PredictionCfg::default()).unwrap();
    assert_eq!(svp.absolute, expected);
}

#[rstest]
#[case::short_hb(&[70.0; 7], &[70.0; 8], 412)]
#[case::hb_too_hot(&[100.0; 8], &[70.0; 8], 412)]
#[case::sv_too_cold(&[70.0; 8], &[29.0; 8], 412)]
#[case::unknown_formula(&[70.0; 8], &[70.0; 8], 413)]
fn prediction_rejects_bad_inputs(#[case] hb: &[f64], #[case] sv: &[f64], #[case] formula: u16) {
    let err = predict(hb, sv, formula, None, &PredictionCfg::default()).unwrap_err();
    assert!(matches!(err, StcError::Validation(_)));
}

#[test]
fn ingest_skips_headers_bad_rows_and_duplicates() {
    let mut raw = rows(&linear_ramp(25, 80.0, 40.0));
    // ragged, unparsable and duplicate rows after the headers
    raw.push(vec!["P99".into(), "45717.5".into()]);
    raw.push(vec!["P98".into(), "soon".into(), "CH1".into(), "70".into()]);
    raw.push(vec!["".into(), "45717.6".into(), "CH1".into(), "70".into()]);
    let dup = raw[HEADER_ROWS + 4].clone();
    raw.push(dup);

    let log = ingest(&raw, &IngestCfg::default()).unwrap();
    assert_eq!(log.entries.len(), 25);
    assert_eq!(log.skipped_rows, 3);
    assert_eq!(log.duplicate_rows, 1);
}

#[test]
fn ingest_sorts_clamps_and_truncates() {
    let mut temps = linear_ramp(120, 60.0, 40.0);
    temps[0] = 150.0;
    temps[1] = -5.0;
    let mut raw = rows(&temps);
    raw[HEADER_ROWS..].reverse();

    let log = ingest(&raw, &IngestCfg::default()).unwrap();
    assert_eq!(log.entries.len(), 100);
    assert!(log.entries.windows(2).all(|w| w[0].taken_at < w[1].taken_at));
    assert_eq!(log.entries[0].temp, 99.0);
    assert_eq!(log.entries[1].temp, 0.0);
}

#[test]
fn serial_is_decoded_to_utc() {
    // 2025-03-01 12:00 UTC
    let raw = thermal_rows(45_717.5, 1.0, &[70.0; 20]);
    let log = ingest(&raw, &IngestCfg::default()).unwrap();
    assert_eq!(
        log.entries[0].taken_at.to_rfc3339(),
        "2025-03-01T12:00:00+00:00"
    );
}

#[test]
fn too_few_rows_after_filtering_warns_but_continues() {
    // 20 rows, the second half flat at 33: threshold 33 drops the flat tail
    let mut temps = linear_ramp(10, 80.0, 60.0);
    temps.extend([33.0; 10]);
    let log = ingest(&rows(&temps), &IngestCfg::default()).unwrap();
    let steady = detect_steady_state(&log.entries, &DetectorCfg::default()).unwrap();
    assert_eq!(steady.threshold_c, 33.0);
    assert_eq!(steady.kept.len(), 12);
    assert_eq!(steady.warning, Some(DetectorWarning::TooFewRows { kept: 12 }));
}

#[test]
fn readmitted_rows_close_the_kept_series() {
    // settled first half, a dip to 31/30, then a noisy tail above the threshold
    let mut temps = vec![80.0; 20];
    temps.extend([31.0, 30.0]);
    temps.extend((0..18).map(|i| if i % 2 == 0 { 50.0 } else { 40.0 }));
    let log = ingest(&rows(&temps), &IngestCfg::default()).unwrap();
    let steady = detect_steady_state(&log.entries, &DetectorCfg::default()).unwrap();

    assert_eq!(steady.threshold_c, 32.0);
    assert_eq!(steady.kept.len(), 40);
    assert!(steady.rejected.is_empty());
    let readmitted: Vec<f64> = steady.readmitted.iter().map(|e| e.temp).collect();
    assert_eq!(readmitted, [31.0, 30.0]);
    let tail: Vec<f64> = steady.kept[38..].iter().map(|e| e.temp).collect();
    assert_eq!(tail, [31.0, 30.0]);

    let medians = compute_section_medians(&steady.kept, &BinningCfg::default()).unwrap();
    // postheat bin holds the last two noisy readings and both re-admitted ones
    assert_eq!(medians.postheat, Some(35.5));
    assert_eq!(medians.ended_at, log.entries[21].taken_at);
}

#[rstest]
// one reading per minute from 00:00:51: 37 minutes either way
#[case(1.0, 37)]
// 58.8 s apart: 36.3 minutes elapsed, but 00:00 to 00:37 on the clock
#[case(0.98, 37)]
fn duration_counts_clock_minutes(#[case] step_minutes: f64, #[case] expected: u16) {
    // serial .0006 is 00:00:51.84
    let raw = thermal_rows(
        SERIAL_2025_03_01 + 0.0006,
        step_minutes,
        &linear_ramp(40, 90.0, 30.0),
    );
    let analysis = analyze_log(&raw, &CalibratorCfg::default()).unwrap();
    assert_eq!(analysis.steady.kept.len(), 38);
    assert_eq!(analysis.duration_minutes(), expected);
}

#[test]
fn noisy_tail_falls_back_to_lower_endpoint() {
    let temps: Vec<f64> = (0..40)
        .map(|i| if i % 2 == 0 { 45.0 } else { 60.0 })
        .collect();
    assert_eq!(endpoint_threshold(&temps, &DetectorCfg::default()), 32.0);
}

#[test]
fn empty_log_is_insufficient() {
    let err = detect_steady_state(&[], &DetectorCfg::default()).unwrap_err();
    assert_eq!(
        err,
        StcError::InsufficientData {
            found: 0,
            required: 1
        }
    );
}

#[test]
fn too_few_rows_leave_a_section_empty() {
    let log = ingest(&rows(&linear_ramp(20, 80.0, 60.0)), &IngestCfg::default()).unwrap();
    let err = compute_section_medians(&log.entries[..8], &BinningCfg::default()).unwrap_err();
    assert!(matches!(err, StcError::Validation(_)));
}

#[test]
fn section_bins_for_a_full_log() {
    let weights = BinningCfg::default().weights;
    assert_eq!(
        bin_bounds(59, &weights),
        [0, 5, 11, 17, 23, 29, 35, 41, 47, 53, 59]
    );
    assert_eq!(
        bin_bounds(38, &weights),
        [0, 3, 7, 11, 15, 19, 23, 26, 30, 34, 38]
    );
}
