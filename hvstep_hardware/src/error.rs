use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("spi error: {0}")]
    Spi(String),
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("adc conversion-ready timeout")]
    ConversionTimeout,
    #[error("adc frame rejected: {0}")]
    BadFrame(&'static str),
    #[error("host power-off failed: {0}")]
    PowerOff(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
