use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

const SV: &str = "85,80,75,70,62,56,50,45";

// Minimal config: one loopback machine so live SV is never read
fn write_valid_config(dir: &TempDir) -> PathBuf {
    let store = dir.path().join("var").join("records.jsonl");
    let toml = format!(
        r#"
[store]
path = {store:?}

[[machines]]
id = 1
line = 4
ip_address = "127.0.0.1"
"#,
        store = store.display().to_string()
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

// Probe export: three header rows, then one reading per minute from 2025-03-01
fn write_log(dir: &TempDir, name: &str, n: usize, from: f64, to: f64) -> PathBuf {
    let mut text = String::from("Probe export\nDevice,TC-0042\nLabel,Serial,Channel,Temp\n");
    let step = if n > 1 { (to - from) / (n - 1) as f64 } else { 0.0 };
    for i in 0..n {
        let serial = 45717.0 + i as f64 / 1440.0;
        let temp = from + step * i as f64;
        text.push_str(&format!("P{},{serial:.6},CH1,{temp:.2}\n", i + 1));
    }
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

fn stc(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("stc_cli").unwrap();
    cmd.arg("--config").arg(cfg).env_remove("RUST_LOG");
    cmd
}

fn run_args(log: &PathBuf, machine: &str) -> Vec<String> {
    [
        "run",
        "--log",
        log.to_str().unwrap(),
        "--machine",
        machine,
        "--position",
        "upper",
        "--speed",
        "0.5",
        "--sequence",
        "1",
        "--device-code",
        "42",
        "--operator",
        "Budi",
        "--sv",
        SV,
        "--sim",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("stc_cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("ambient-adjust"));
}

#[test]
fn analyze_reports_steady_state_as_json() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = write_log(&dir, "probe.csv", 40, 90.0, 30.0);

    let out = stc(&cfg)
        .args(["--json", "analyze", "--log"])
        .arg(&log)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["rows"], 40);
    assert_eq!(v["threshold_c"], 35.0);
    assert_eq!(v["kept"], 38);
    assert_eq!(v["duration_minutes"], 37);
    assert!(v["medians"]["section_1"].as_f64().unwrap() > 80.0);
}

#[test]
fn analyze_text_lists_sections() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = write_log(&dir, "probe.csv", 40, 90.0, 30.0);

    stc(&cfg)
        .args(["analyze", "--log"])
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("kept 38 of 40"))
        .stdout(predicate::str::contains("postheat"));
}

#[test]
fn predict_prints_setpoints() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = stc(&cfg)
        .args([
            "--json",
            "predict",
            "--hb",
            "80,75,70,65,60,55,50,45",
            "--sv",
            "80,75,70,65,60,55,50,45",
            "--formula",
            "411",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["formula_id"], 411);
    assert_eq!(
        v["svp"],
        serde_json::json!([80.0, 75.0, 70.0, 65.0, 60.0, 55.0, 50.0, 45.0])
    );
}

#[test]
fn run_persists_record_and_shows_in_recents() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = write_log(&dir, "probe.csv", 40, 90.0, 30.0);

    let out = stc(&cfg)
        .arg("--json")
        .args(run_args(&log, "1"))
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let rec = &v["record"];
    assert_eq!(rec["machine_id"], 1);
    assert_eq!(rec["position"], "upper");
    assert_eq!(rec["formula_id"], 412);
    assert_eq!(rec["sv_source"], "manual");
    assert_eq!(rec["is_applied"], true);
    assert_eq!(
        rec["svp_values"],
        serde_json::json!([86.0, 82.0, 77.0, 73.0, 64.0, 57.0, 51.0, 47.0])
    );

    let stored = fs::read_to_string(dir.path().join("var").join("records.jsonl")).unwrap();
    assert_eq!(stored.lines().count(), 1);

    let out = stc(&cfg).args(["--json", "recents"]).output().unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(
        v,
        serde_json::json!([{ "machine_id": 1, "line": 4, "upper": true, "lower": false }])
    );
}

#[test]
fn self_check_reports_ok() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    stc(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 1 machines"));
}

#[test]
fn ambient_adjust_skips_loopback_machine() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = stc(&cfg)
        .args(["--json", "ambient-adjust", "--change", "-2", "--sim"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let results = v.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(
        results
            .iter()
            .all(|r| r["outcome"] == "skipped_no_live_sv")
    );
}

#[rstest]
#[case("1", 10, 3, "at least 20 are needed")]
#[case("99", 40, 5, "Machine 99 is not configured")]
fn run_failures_map_to_exit_codes(
    #[case] machine: &str,
    #[case] rows: usize,
    #[case] exit_code: i32,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = write_log(&dir, "probe.csv", rows, 90.0, 30.0);

    stc(&cfg)
        .args(run_args(&log, machine))
        .assert()
        .code(exit_code)
        .stderr(predicate::str::contains(needle));

    // nothing recorded on a rejected run
    assert!(!dir.path().join("var").join("records.jsonl").exists());
}

#[test]
fn invalid_sv_is_a_validation_error_in_json() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = write_log(&dir, "probe.csv", 40, 90.0, 30.0);

    let mut args = run_args(&log, "1");
    let idx = args.iter().position(|a| a == SV).unwrap();
    args[idx] = "85,80,75".to_string();

    let out = stc(&cfg).arg("--json").args(args).output().unwrap();
    assert_eq!(out.status.code(), Some(4));
    // the error object is the last stderr line, after any log lines
    let stderr = String::from_utf8_lossy(&out.stderr);
    let last = stderr.lines().last().unwrap();
    let err: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(err["reason"], "Validation");
}

#[rstest]
#[case("[controller]\nport = 0\n[[machines]]\nid = 1\nline = 1\nip_address = \"127.0.0.1\"\n")]
#[case("[store]\npath = \"x\"\n")]
fn invalid_config_is_reported(#[case] toml: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, toml).unwrap();

    stc(&path)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"));
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.toml");

    stc(&path)
        .arg("recents")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not read the config file"));
}
