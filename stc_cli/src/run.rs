//! Command execution: config loading, calibrator assembly, and output.

use std::path::Path;

use chrono::Utc;
use eyre::WrapErr;
use serde_json::json;
use stc_core::{
    AdjustOutcome, AmbientReading, Analysis, Calibrator, CalibratorBuilder, CalibratorCfg,
    FixedAmbient, JsonlStore, MachineProfile, RunOutcome, RunRequest, Section, StepOutcome,
    analyze_log,
};
use stc_hardware::{SimConnector, SimulatedController, TcpConnector};

use crate::cli::Commands;

/// Read, parse and validate the TOML config.
pub fn load_config(path: &Path) -> eyre::Result<stc_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = stc_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

pub fn dispatch(cfg: &stc_config::Config, cmd: Commands, json: bool) -> eyre::Result<()> {
    match cmd {
        Commands::Analyze { log } => analyze(cfg, &log, json),
        Commands::Predict {
            hb,
            sv,
            formula,
            machine,
        } => predict(cfg, &hb, &sv, formula, machine, json),
        Commands::Run {
            log,
            machine,
            position,
            speed,
            sequence,
            device_code,
            operator,
            sv,
            formula,
            ambient_c,
            sim,
        } => {
            let rows = stc_config::load_thermal_log_csv(&log)?;
            let req = RunRequest {
                machine_id: machine,
                position: position.into(),
                rows,
                speed,
                sequence,
                device_code,
                operator,
                manual_sv: sv,
                formula_id: formula,
            };
            let mut cal = calibrator(cfg, sim, ambient_c)?;
            let outcome = cal.submit(&req)?;
            print_run(&outcome, json);
            Ok(())
        }
        Commands::Recents => recents(cfg, json),
        Commands::AmbientAdjust {
            change,
            dry_run,
            sim,
        } => ambient_adjust(cfg, change, dry_run, sim, json),
        Commands::SelfCheck => self_check(cfg, json),
    }
}

fn calibrator(
    cfg: &stc_config::Config,
    sim: bool,
    ambient_c: Option<f64>,
) -> eyre::Result<Calibrator> {
    let store = JsonlStore::open(&cfg.store.path)?;
    let builder: CalibratorBuilder = Calibrator::builder().with_config(cfg).with_store(store);
    let builder = if sim {
        tracing::info!("using simulated controller");
        builder.with_connector(SimConnector::new(SimulatedController::new()))
    } else {
        builder.with_connector(TcpConnector)
    };
    let builder = match ambient_c {
        Some(temp_c) => builder.with_ambient(FixedAmbient(AmbientReading {
            taken_at: Utc::now(),
            temp_c,
        })),
        None => builder,
    };
    builder.try_build()
}

fn analyze(cfg: &stc_config::Config, log: &Path, json: bool) -> eyre::Result<()> {
    let settings = CalibratorCfg::try_from(cfg)?;
    let rows = stc_config::load_thermal_log_csv(log)?;
    let analysis = analyze_log(&rows, &settings)?;
    print_analysis(&analysis, json);
    Ok(())
}

fn print_analysis(a: &Analysis, json: bool) {
    let medians = a.medians.values();
    if json {
        let sections: serde_json::Map<String, serde_json::Value> = Section::ALL
            .iter()
            .map(|s| (s.name().to_string(), json!(medians[s.index()])))
            .collect();
        println!(
            "{}",
            json!({
                "rows": a.log.entries.len(),
                "skipped_rows": a.log.skipped_rows,
                "duplicate_rows": a.log.duplicate_rows,
                "threshold_c": a.steady.threshold_c,
                "kept": a.steady.kept.len(),
                "rejected": a.steady.rejected.len(),
                "readmitted": a.steady.readmitted.len(),
                "started_at": a.medians.started_at,
                "ended_at": a.medians.ended_at,
                "duration_minutes": a.duration_minutes(),
                "binning_version": a.medians.version,
                "medians": sections,
            })
        );
        return;
    }
    println!(
        "rows: {} (skipped {}, duplicates {})",
        a.log.entries.len(),
        a.log.skipped_rows,
        a.log.duplicate_rows
    );
    println!(
        "threshold: {} °C, kept {} of {} ({} re-admitted)",
        a.steady.threshold_c,
        a.steady.kept.len(),
        a.log.entries.len(),
        a.steady.readmitted.len()
    );
    println!(
        "window: {} .. {} ({} min)",
        a.medians.started_at.format("%Y-%m-%d %H:%M:%S"),
        a.medians.ended_at.format("%Y-%m-%d %H:%M:%S"),
        a.duration_minutes()
    );
    for s in Section::ALL {
        match medians[s.index()] {
            Some(v) => println!("  {:<10} {v:.2}", s.name()),
            None => println!("  {:<10} -", s.name()),
        }
    }
}

fn predict(
    cfg: &stc_config::Config,
    hb: &[f64],
    sv: &[f64],
    formula: Option<u16>,
    machine: Option<u32>,
    json: bool,
) -> eyre::Result<()> {
    let settings = CalibratorCfg::try_from(cfg)?;
    let limits = match machine {
        Some(id) => {
            let m = cfg
                .machine(id)
                .ok_or(stc_core::StcError::MachineNotFound(id))?;
            MachineProfile::try_from(m)?.limits
        }
        None => None,
    };
    let formula = formula.unwrap_or_else(|| settings.prediction.default_formula.code());
    let svp = stc_core::predict(hb, sv, formula, limits.as_ref(), &settings.prediction)?;
    if json {
        println!(
            "{}",
            json!({ "formula_id": formula, "svp": svp.absolute, "relative": svp.relative })
        );
    } else {
        println!("formula {formula}");
        for (i, (abs, rel)) in svp.absolute.iter().zip(&svp.relative).enumerate() {
            println!("  section_{} {abs} ({rel})", i + 1);
        }
    }
    Ok(())
}

fn print_run(out: &RunOutcome, json: bool) {
    let r = &out.record;
    if json {
        let warnings: Vec<String> = out.warnings.iter().map(ToString::to_string).collect();
        println!(
            "{}",
            json!({
                "record": r,
                "warnings": warnings,
            })
        );
        return;
    }
    println!(
        "machine {} {}: formula {}, sv from {}, integrity {}",
        r.machine_id,
        r.position,
        r.formula_id,
        match r.sv_source {
            stc_core::SvSource::Live => "controller",
            stc_core::SvSource::Manual => "manual input",
        },
        r.integrity
    );
    println!("  hb  {:?}", r.hb_values);
    println!("  sv  {:?}", r.sv_values);
    println!("  svp {:?}", r.svp_values);
    println!(
        "  at  previous {} current {} delta {}",
        r.at_values.previous, r.at_values.current, r.at_values.delta
    );
    if r.is_applied {
        println!("push applied ({} steps)", r.push_log.len());
    } else {
        println!("push NOT applied");
        for s in &r.push_log {
            let state = match &s.outcome {
                StepOutcome::Sent => "sent".to_string(),
                StepOutcome::Failed { error } => format!("FAILED: {error}"),
                StepOutcome::NotAttempted => "not attempted".to_string(),
            };
            println!("  [{:>2}] {:<16} {state}", s.index, s.step.name());
        }
    }
    for w in &out.warnings {
        println!("warning: {w}");
    }
}

fn recents(cfg: &stc_config::Config, json: bool) -> eyre::Result<()> {
    // the connector is never used for a store lookup
    let cal = calibrator(cfg, true, None)?;
    let uploads = cal.recent_uploads()?;
    if json {
        println!("{}", serde_json::to_string(&uploads)?);
        return Ok(());
    }
    let mark = |b: bool| if b { "yes" } else { "-" };
    println!("machine  line  upper  lower");
    for u in &uploads {
        println!(
            "{:>7}  {:>4}  {:>5}  {:>5}",
            u.machine_id,
            u.line,
            mark(u.upper),
            mark(u.lower)
        );
    }
    Ok(())
}

fn ambient_adjust(
    cfg: &stc_config::Config,
    change: f64,
    dry_run: bool,
    sim: bool,
    json: bool,
) -> eyre::Result<()> {
    let mut cal = calibrator(cfg, sim, None)?;
    let results = cal.adjust_for_ambient(change, dry_run);
    if json {
        println!("{}", serde_json::to_string(&results)?);
        return Ok(());
    }
    for a in &results {
        let line = match &a.outcome {
            AdjustOutcome::SkippedRecentRun => "skipped: calibrated recently".to_string(),
            AdjustOutcome::SkippedBusy => "skipped: run in progress".to_string(),
            AdjustOutcome::SkippedNoLiveSv { reason } => format!("skipped: no live SV ({reason})"),
            AdjustOutcome::SkippedStoreError { reason } => format!("skipped: {reason}"),
            AdjustOutcome::Planned { from, to } => format!("planned {from:?} -> {to:?}"),
            AdjustOutcome::Applied { from, to } => format!("applied {from:?} -> {to:?}"),
            AdjustOutcome::Failed { error, .. } => format!("FAILED: {error}"),
        };
        println!("machine {} {}: {line}", a.machine_id, a.position);
    }
    Ok(())
}

fn self_check(cfg: &stc_config::Config, json: bool) -> eyre::Result<()> {
    let store = JsonlStore::open(&cfg.store.path)?;
    store.probe()?;
    CalibratorCfg::try_from(cfg)?;
    for m in &cfg.machines {
        MachineProfile::try_from(m)?;
    }
    if json {
        println!(
            "{}",
            json!({
                "status": "ok",
                "machines": cfg.machines.len(),
                "store": cfg.store.path,
            })
        );
    } else {
        println!(
            "ok: {} machines, store {}",
            cfg.machines.len(),
            cfg.store.path
        );
    }
    Ok(())
}
