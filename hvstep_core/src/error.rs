use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SupplyError {
    /// The multi-channel acquisition came back short, malformed, or not at
    /// all. Always fatal; there is no retry path for sensing failures.
    #[error("adc acquisition failed: {0}")]
    Acquisition(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing adc")]
    MissingAdc,
    #[error("missing potentiometer bus")]
    MissingPot,
    #[error("missing digital outputs")]
    MissingOutputs,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
