//! Hardware backends for the stepped HV supply.
//!
//! The `hardware` feature enables the Raspberry-Pi backends (rppal SPI and
//! GPIO); the simulated rig in `sim` is always available and is the default
//! for development and CI.

pub mod error;
pub mod sim;

#[cfg(feature = "hardware")]
pub mod ads1263;
#[cfg(feature = "hardware")]
pub mod outputs;
#[cfg(feature = "hardware")]
pub mod pot;
#[cfg(feature = "hardware")]
pub mod power;
#[cfg(feature = "hardware")]
pub mod rig;

pub use sim::{SimulatedAdc, SimulatedOutputs, SimulatedPot, SimulatedPower, SimulatedRig};

#[cfg(feature = "hardware")]
pub use ads1263::Ads1263;
#[cfg(feature = "hardware")]
pub use outputs::{GpioOutputs, OutputPins};
#[cfg(feature = "hardware")]
pub use pot::SpiPot;
#[cfg(feature = "hardware")]
pub use power::SystemPower;
#[cfg(feature = "hardware")]
pub use rig::{HardwareRigCfg, open_rig};
