//! Host power-off backend.

use std::process::Command;

use tracing::warn;

use crate::error::HwError;
use hvstep_traits::HostPower;

/// Powers down the host via the system `shutdown` binary. Only the
/// battery-critical path is allowed to reach this.
pub struct SystemPower;

impl HostPower for SystemPower {
    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        warn!("powering down host");
        let status = Command::new("shutdown")
            .args(["-h", "now"])
            .status()
            .map_err(|e| Box::new(HwError::PowerOff(e.to_string())) as Box<dyn std::error::Error + Send + Sync>)?;
        if !status.success() {
            return Err(Box::new(HwError::PowerOff(format!(
                "shutdown exited with {status}"
            ))));
        }
        Ok(())
    }
}
