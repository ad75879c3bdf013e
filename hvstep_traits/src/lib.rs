pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Number of usable input channels on the measurement ADC.
pub const ADC_CHANNEL_COUNT: usize = 10;

/// One complete acquisition: a raw sign-magnitude code per channel.
pub type RawFrame = [u32; ADC_CHANNEL_COUNT];

/// Multi-channel measurement ADC.
///
/// `acquire` returns every channel code from a single acquisition pass, or
/// fails as a whole. Implementations must never return a partially filled
/// frame: a short or malformed transfer is a total failure.
pub trait AdcBank {
    fn acquire(&mut self) -> Result<RawFrame, Box<dyn std::error::Error + Send + Sync>>;
}

/// Write-only bus to the digital potentiometer.
///
/// The two bytes form one indivisible transfer; the wiper must never be able
/// to observe a half-written position.
pub trait PotBus {
    fn transfer(&mut self, frame: [u8; 2]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Digital output lines of the rig, addressed by role rather than pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    /// Enables the 15 V amplifier stage.
    AmpEnable,
    /// Indicator LED paired with the amplifier enable.
    AmpLed,
    /// Low-battery warning LED.
    BatteryLed,
    /// Current-sensor range selector, range 1.
    RangeA,
    /// Current-sensor range selector, range 2.
    RangeB,
}

impl Line {
    /// Every auxiliary line (everything except the amplifier enable).
    pub const AUXILIARY: [Line; 4] = [Line::AmpLed, Line::BatteryLed, Line::RangeA, Line::RangeB];
}

/// Per-line digital output control.
pub trait DigitalOutputs {
    fn set_line(
        &mut self,
        line: Line,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Capability to power down the host machine. Only the battery-critical path
/// may invoke it.
pub trait HostPower {
    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

// Forwarding impls so boxed handles can be used wherever the traits are
// expected (the dynamic-dispatch controller variant stores Box<dyn ...>).
impl<T: AdcBank + ?Sized> AdcBank for Box<T> {
    fn acquire(&mut self) -> Result<RawFrame, Box<dyn std::error::Error + Send + Sync>> {
        (**self).acquire()
    }
}

impl<T: PotBus + ?Sized> PotBus for Box<T> {
    fn transfer(&mut self, frame: [u8; 2]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).transfer(frame)
    }
}

impl<T: DigitalOutputs + ?Sized> DigitalOutputs for Box<T> {
    fn set_line(
        &mut self,
        line: Line,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_line(line, high)
    }
}

impl<T: HostPower + ?Sized> HostPower for Box<T> {
    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).power_off()
    }
}
