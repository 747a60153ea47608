//! Human-readable error descriptions and structured JSON error formatting.

use stc_core::error::{BuildError, StcError};

/// Stable name of an error kind, used in JSON output.
pub fn error_kind_name(err: &eyre::Report) -> &'static str {
    if let Some(e) = err.downcast_ref::<StcError>() {
        return match e {
            StcError::InsufficientData { .. } => "InsufficientData",
            StcError::Validation(_) => "Validation",
            StcError::MachineNotFound(_) => "MachineNotFound",
            StcError::Network(_) => "Network",
            StcError::Persistence(_) => "Persistence",
            StcError::Busy { .. } => "Busy",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingStore => {
                "What happened: No record store was provided to the calibrator.\nLikely causes: The store could not be opened or was not wired into the builder.\nHow to fix: Check [store].path in the config.".to_string()
            }
            BuildError::MissingConnector => {
                "What happened: No controller connector was provided to the calibrator.\nLikely causes: The builder was not configured with a connector.\nHow to fix: This is a wiring bug; report it.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/stc_config.toml for a sample."
            ),
        };
    }

    if let Some(e) = err.downcast_ref::<StcError>() {
        return match e {
            StcError::InsufficientData { found, required } => format!(
                "What happened: The probe log has {found} usable rows; at least {required} are needed.\nLikely causes: The export was cut short, or rows have a bad timestamp or temperature column.\nHow to fix: Re-export the full probe run and check columns 1 (serial) and 4 (temperature)."
            ),
            StcError::Validation(msg) => format!(
                "What happened: Input rejected ({msg}).\nLikely causes: A value outside its allowed range, or a malformed list.\nHow to fix: Correct the value and rerun; setpoints must be eight values in the configured SV range."
            ),
            StcError::MachineNotFound(id) => format!(
                "What happened: Machine {id} is not configured.\nLikely causes: A typo in --machine, or the [[machines]] entry is missing.\nHow to fix: Add the machine to the config or pick a configured id."
            ),
            StcError::Network(msg) => format!(
                "What happened: Controller communication failed ({msg}).\nLikely causes: Controller offline, wrong ip_address/port, or a firewall.\nHow to fix: Check the machine's ip_address and [controller] settings; try --sim to test without a device."
            ),
            StcError::Persistence(msg) => format!(
                "What happened: The run could not be recorded ({msg}).\nLikely causes: [store].path is not writable or the disk is full.\nHow to fix: Fix permissions or free space, then run `stc self-check`."
            ),
            StcError::Busy {
                machine_id,
                position,
            } => format!(
                "What happened: Machine {machine_id} ({position}) already has a calibration in progress.\nLikely causes: Another run on the same machine and position.\nHow to fix: Wait for it to finish, then rerun."
            ),
        };
    }

    // String-based heuristics for errors coming from config or file loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        let cause = err
            .source()
            .map(|s| format!(" ({s})"))
            .unwrap_or_default();
        return format!(
            "What happened: Configuration is invalid or incomplete{cause}.\nLikely causes: A missing [[machines]] section or an out-of-range value.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file ({msg}).\nLikely causes: Wrong --config path.\nHow to fix: Pass --config FILE or create etc/stc_config.toml."
        );
    }

    if lower.contains("thermal log") {
        return format!(
            "What happened: Could not read the probe log ({msg}).\nLikely causes: Wrong --log path or a file that is not CSV.\nHow to fix: Check the path and export format."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; anything unclassified is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<StcError>() {
        Some(StcError::InsufficientData { .. }) => 3,
        Some(StcError::Validation(_)) => 4,
        Some(StcError::MachineNotFound(_)) => 5,
        Some(StcError::Network(_)) => 6,
        Some(StcError::Persistence(_)) => 7,
        Some(StcError::Busy { .. }) => 8,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": error_kind_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(StcError::InsufficientData { found, required }) = err.downcast_ref::<StcError>() {
        obj["details"] = json!({ "found": found, "required": required });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_core::Position;

    #[test]
    fn exit_codes_are_stable() {
        let cases = [
            (
                StcError::InsufficientData {
                    found: 3,
                    required: 20,
                },
                3,
            ),
            (StcError::Validation("x".into()), 4),
            (StcError::MachineNotFound(9), 5),
            (StcError::Network("x".into()), 6),
            (StcError::Persistence("x".into()), 7),
            (
                StcError::Busy {
                    machine_id: 1,
                    position: Position::Upper,
                },
                8,
            ),
        ];
        for (e, code) in cases {
            assert_eq!(exit_code_for_error(&eyre::Report::new(e)), code);
        }
        assert_eq!(exit_code_for_error(&eyre::eyre!("other")), 1);
    }

    #[test]
    fn json_error_names_the_kind() {
        let err = eyre::Report::new(StcError::InsufficientData {
            found: 3,
            required: 20,
        });
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "InsufficientData");
        assert_eq!(v["exit_code"], 3);
        assert_eq!(v["details"]["required"], 20);
    }

    #[test]
    fn wrapped_config_errors_are_explained() {
        let err = eyre::eyre!("controller.port must be > 0").wrap_err("invalid configuration");
        assert!(humanize(&err).contains("controller.port must be > 0"));
    }
}
