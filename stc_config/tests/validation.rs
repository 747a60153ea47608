use rstest::rstest;
use stc_config::load_toml;

const MACHINES: &str = r#"
[[machines]]
id = 1
line = 1
ip_address = "172.70.66.101"
section_limits_high = [83, 78, 73, 68, 63, 58, 53, 48]
section_limits_low = [73, 68, 63, 58, 53, 48, 43, 38]

[[machines]]
id = 2
line = 2
ip_address = "172.70.66.102"
"#;

#[test]
fn defaults_fill_every_section() {
    let cfg = load_toml(MACHINES).expect("parse TOML");
    cfg.validate().expect("defaults should be valid");
    assert_eq!(cfg.controller.port, 503);
    assert_eq!(cfg.controller.unit_id, 1);
    assert_eq!(cfg.ingest.skip_rows, 3);
    assert_eq!(cfg.ingest.max_logs, 100);
    assert_eq!(cfg.detector.readmit_rejected, 2);
    assert_eq!(cfg.binning.weights.iter().sum::<u32>(), 59);
    assert_eq!(cfg.registers.lower.sv_r, cfg.registers.upper.sv_r + 1000);
    assert_eq!(cfg.machines.len(), 2);
    assert!(cfg.machine(2).unwrap().section_limits_high.is_none());
    assert!(cfg.machine(3).is_none());
}

#[test]
fn machines_table_is_required() {
    assert!(load_toml("[controller]\nport = 503\n").is_err());
}

#[rstest]
#[case("[controller]\nport = 0\n", "controller.port must be > 0")]
#[case("[controller]\nwrite_timeout_ms = 0\n", "write_timeout_ms must be >= 1")]
#[case("[ingest]\nmin_logs = 200\n", "min_logs must be <= ingest.max_logs")]
#[case("[ingest]\nmin_temp_c = 99.0\n", "min_temp_c must be < ingest.max_temp_c")]
#[case("[detector]\nmin_endpoint_c = 50.0\n", "min_endpoint_c must be <")]
#[case("[detector]\nslide_window = 1\n", "slide_window must be >= 2")]
#[case("[binning]\nweights = [5, 6, 6, 0, 6, 6, 6, 6, 6, 6]\n", "weights must all be >= 1")]
#[case("[prediction]\ndefault_formula = 413\n", "default_formula must be one of")]
#[case("[prediction]\ndelicate_gain = 0.0\n", "delicate_gain must be > 0")]
#[case("[integrity]\nwindow_hours = 0\n", "window_hours must be >= 1")]
#[case("[push]\nchart_points = 200\n", "chart_points must be in 1..=123")]
#[case("[store]\npath = \"  \"\n", "store.path must not be empty")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
fn rejects_invalid_sections(#[case] section: &str, #[case] msg: &str) {
    let toml = format!("{section}{MACHINES}");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(msg), "got: {err}");
}

#[test]
fn rejects_duplicate_machine_ids() {
    let toml = r#"
[[machines]]
id = 4
line = 4
ip_address = "10.0.0.4"

[[machines]]
id = 4
line = 5
ip_address = "10.0.0.5"
"#;
    let err = load_toml(toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("duplicate machine id 4"));
}

#[test]
fn rejects_inverted_limits() {
    let toml = r#"
[[machines]]
id = 1
line = 1
ip_address = "10.0.0.1"
section_limits_high = [83, 78, 73, 68, 63, 58, 53, 48]
section_limits_low = [73, 68, 63, 58, 53, 48, 60, 38]
"#;
    let err = load_toml(toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("section 7 limit low 60 > high 53"), "got: {err}");
}

#[test]
fn rejects_half_specified_limits() {
    let toml = r#"
[[machines]]
id = 1
line = 1
ip_address = "10.0.0.1"
section_limits_high = [83, 78, 73, 68, 63, 58, 53, 48]
"#;
    let err = load_toml(toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("must be set together"));
}

#[test]
fn rejects_empty_ip() {
    let toml = "[[machines]]\nid = 1\nline = 1\nip_address = \"\"\n";
    let err = load_toml(toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("ip_address must not be empty"));
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../etc/stc_config.toml");
    let text = std::fs::read_to_string(path).expect("read sample config");
    let cfg = load_toml(&text).expect("parse sample config");
    cfg.validate().expect("sample config should validate");
}
