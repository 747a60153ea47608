//! Maps `Box<dyn Error>` from trait boundaries to typed `StcError`.
//!
//! The traits in `stc_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to `StcError::Network`, with an optional feature-gated path
//! for `stc_hardware::HwError` downcasting.

use crate::error::StcError;

/// Map a bus or connector error to `StcError::Network`.
///
/// Known hardware errors get a precise message; anything else keeps its
/// own text.
pub fn map_bus_error(e: &(dyn std::error::Error + 'static)) -> StcError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<stc_hardware::HwError>() {
            return match hw {
                stc_hardware::HwError::Timeout => StcError::Network("controller timeout".into()),
                stc_hardware::HwError::Exception { function, code } => StcError::Network(format!(
                    "controller rejected function 0x{function:02x} with exception 0x{code:02x}"
                )),
                other => StcError::Network(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timed out") {
        StcError::Network("controller timeout".into())
    } else {
        StcError::Network(s)
    }
}
