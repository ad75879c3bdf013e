//! Human-readable error descriptions and structured JSON error formatting.

use std::error::Error as _;

use crate::session::SessionError;

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use hvstep_core::error::{BuildError, SupplyError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAdc => {
                "What happened: No ADC was provided to the supply controller.\nLikely causes: The acquisition HAT failed to initialize or was not wired into the builder.\nHow to fix: Ensure the ADC opens successfully and is passed via with_adc(...).".to_string()
            }
            BuildError::MissingPot => {
                "What happened: No potentiometer bus was provided to the supply controller.\nLikely causes: The SPI device failed to open or was not wired into the builder.\nHow to fix: Ensure the pot bus opens successfully and is passed via with_pot(...).".to_string()
            }
            BuildError::MissingOutputs => {
                "What happened: No digital outputs were provided to the supply controller.\nLikely causes: GPIO initialization failed or was not wired into the builder.\nHow to fix: Ensure the output pins claim successfully and are passed via with_outputs(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SupplyError>() {
        if let SupplyError::Acquisition(detail) = se {
            return format!(
                "What happened: The ADC acquisition failed ({detail}); the supply has been de-energized.\nLikely causes: HAT wiring/power fault, SPI noise, or a wedged conversion.\nHow to fix: Check the HAT seating and SPI wiring, then start a new session. Sensing failures are never retried."
            );
        }
        if matches!(se, SupplyError::State(_)) {
            return "What happened: A step was requested after the supply shut down.\nLikely causes: The session continued past a fatal condition.\nHow to fix: Start a new session; the rig re-arms on startup.".to_string();
        }
        return format!(
            "What happened: {se}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    if let Some(se) = err.downcast_ref::<SessionError>() {
        return match se {
            SessionError::CriticalBattery => {
                "What happened: Battery voltage fell below the critical floor; the supply was de-energized and the host asked to power down.\nLikely causes: Discharged pack.\nHow to fix: Recharge or replace the battery before the next session.".to_string()
            }
            SessionError::InvalidThrust => {
                "What happened: The thrust reading could not be parsed twice in a row.\nLikely causes: Typo or empty input at the prompt.\nHow to fix: Enter a plain decimal number next time; the session was ended safely.".to_string()
            }
            SessionError::InvalidFileName => {
                "What happened: No usable measurement file name was entered.\nLikely causes: Empty input at the prompt, twice.\nHow to fix: Re-run and give the session a short file name (without extension).".to_string()
            }
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open adc spi") || lower.contains("open pot spi") {
        return "What happened: Failed to open an SPI device.\nLikely causes: SPI not enabled on the host, wrong bus/slave numbers, or insufficient permissions.\nHow to fix: Enable SPI, check the [spi] config table, and verify device permissions.".to_string();
    }

    if lower.contains("gpio") {
        return "What happened: Failed to claim a GPIO pin.\nLikely causes: Incorrect pin numbers in [pins] or insufficient permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process can access GPIO.".to_string();
    }

    if lower.contains("must have headers") {
        return "Invalid headers in sensor curve CSV. Expected 'power,coefficient'.".to_string();
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

/// Stable exit codes per failure class; generic errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use hvstep_core::error::SupplyError;
    if let Some(SupplyError::Acquisition(_)) = err.downcast_ref::<SupplyError>() {
        return 3;
    }
    if let Some(se) = err.downcast_ref::<SessionError>() {
        return match se {
            SessionError::CriticalBattery => 4,
            SessionError::InvalidThrust | SessionError::InvalidFileName => 5,
        };
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    use hvstep_core::error::SupplyError;
    if let Some(se) = err.downcast_ref::<SupplyError>() {
        return match se {
            SupplyError::Acquisition(_) => "Acquisition",
            SupplyError::Hardware(_) => "Hardware",
            SupplyError::HardwareFault(_) => "HardwareFault",
            SupplyError::State(_) => "State",
        };
    }
    if let Some(se) = err.downcast_ref::<SessionError>() {
        return match se {
            SessionError::CriticalBattery => "CriticalBattery",
            SessionError::InvalidThrust => "InvalidThrust",
            SessionError::InvalidFileName => "InvalidFileName",
        };
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
