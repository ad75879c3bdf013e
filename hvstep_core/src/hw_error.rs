//! Maps `Box<dyn Error>` from trait boundaries to typed `SupplyError`.
//!
//! The traits in `hvstep_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `hvstep_hardware::HwError`
//! downcasting.

use crate::error::SupplyError;

/// Map a trait-boundary error to a typed `SupplyError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SupplyError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<hvstep_hardware::error::HwError>() {
            return match hw {
                hvstep_hardware::error::HwError::ConversionTimeout => {
                    SupplyError::Acquisition(hw.to_string())
                }
                hvstep_hardware::error::HwError::BadFrame(_) => {
                    SupplyError::Acquisition(hw.to_string())
                }
                other => SupplyError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("frame") || lower.contains("checksum") || lower.contains("conversion") {
        SupplyError::Acquisition(s)
    } else {
        SupplyError::Hardware(s)
    }
}
