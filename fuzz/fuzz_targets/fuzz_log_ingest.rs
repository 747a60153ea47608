#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes as a probe export: CSV reading, ingest and the analysis
// pipeline may reject the input but never panic.
fuzz_target!(|data: &[u8]| {
    let Ok(rows) = stc_config::read_thermal_log(data) else {
        return;
    };
    let cfg = stc_core::CalibratorCfg::default();
    if let Ok(analysis) = stc_core::analyze_log(&rows, &cfg) {
        assert!(analysis.steady.kept.len() <= cfg.ingest.max_logs);
        let _ = analysis.duration_minutes();
    }
});
