#![no_main]
use libfuzzer_sys::fuzz_target;

// Config text must either fail to parse, fail validation, or convert into
// calibrator settings; none of it may panic.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = stc_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let _ = stc_core::CalibratorCfg::try_from(&cfg);
            for m in &cfg.machines {
                let _ = stc_core::MachineProfile::try_from(m);
            }
        }
    }
});
