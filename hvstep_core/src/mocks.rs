//! Test and helper mocks for hvstep_core.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hvstep_traits::clock::Clock;
use hvstep_traits::{ADC_CHANNEL_COUNT, AdcBank, DigitalOutputs, HostPower, Line, PotBus, RawFrame};

use crate::volts::encode_voltage;

/// Build a frame holding the given per-channel voltages; unlisted channels
/// read zero volts.
pub fn frame(volts: &[(usize, f64)], vref: f64) -> RawFrame {
    let mut out: RawFrame = [0; ADC_CHANNEL_COUNT];
    for (ch, v) in volts {
        out[*ch] = encode_voltage(*v, vref);
    }
    out
}

/// One operation observed at a hardware boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigOp {
    PotWrite(u16),
    Level(Line, bool),
    PowerOff,
}

/// Shared chronological log of rig operations; clone it into each spy.
#[derive(Clone, Default)]
pub struct OpLog(Rc<RefCell<Vec<RigOp>>>);

impl OpLog {
    pub fn push(&self, op: RigOp) {
        self.0.borrow_mut().push(op);
    }

    pub fn snapshot(&self) -> Vec<RigOp> {
        self.0.borrow().clone()
    }

    /// Last commanded level of a line, if any.
    pub fn last_level(&self, line: Line) -> Option<bool> {
        self.0.borrow().iter().rev().find_map(|op| match op {
            RigOp::Level(l, high) if *l == line => Some(*high),
            _ => None,
        })
    }

    /// Every wiper position written, in order.
    pub fn pot_writes(&self) -> Vec<u16> {
        self.0
            .borrow()
            .iter()
            .filter_map(|op| match op {
                RigOp::PotWrite(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn power_off_count(&self) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|op| matches!(op, RigOp::PowerOff))
            .count()
    }
}

/// ADC returning scripted frames in order, then repeating the last one.
/// `failing_after(n)` makes every acquisition past the first `n` fail.
pub struct ScriptAdc {
    frames: Vec<RawFrame>,
    taken: usize,
    fail_after: Option<usize>,
}

impl ScriptAdc {
    pub fn new(frames: Vec<RawFrame>) -> Self {
        Self {
            frames,
            taken: 0,
            fail_after: None,
        }
    }

    pub fn failing_after(frames: Vec<RawFrame>, n: usize) -> Self {
        Self {
            frames,
            taken: 0,
            fail_after: Some(n),
        }
    }
}

impl AdcBank for ScriptAdc {
    fn acquire(&mut self) -> Result<RawFrame, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(n) = self.fail_after
            && self.taken >= n
        {
            return Err(Box::new(std::io::Error::other("scripted short frame")));
        }
        let frame = if self.taken < self.frames.len() {
            self.frames[self.taken]
        } else {
            self.frames.last().copied().unwrap_or([0; ADC_CHANNEL_COUNT])
        };
        self.taken += 1;
        Ok(frame)
    }
}

/// ADC whose every acquisition fails.
pub struct FaultyAdc;

impl AdcBank for FaultyAdc {
    fn acquire(&mut self) -> Result<RawFrame, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("short frame")))
    }
}

pub struct SpyPot {
    pub log: OpLog,
}

impl PotBus for SpyPot {
    fn transfer(&mut self, frame: [u8; 2]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.push(RigOp::PotWrite(u16::from_be_bytes(frame)));
        Ok(())
    }
}

pub struct SpyOutputs {
    pub log: OpLog,
}

impl DigitalOutputs for SpyOutputs {
    fn set_line(
        &mut self,
        line: Line,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.push(RigOp::Level(line, high));
        Ok(())
    }
}

pub struct SpyPower {
    pub log: OpLog,
}

impl HostPower for SpyPower {
    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.push(RigOp::PowerOff);
        Ok(())
    }
}

/// Host power handle that does nothing; the builder default for rigs that
/// must never take the host down (simulation, tests).
pub struct NoopHostPower;

impl HostPower for NoopHostPower {
    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Clock whose `sleep` returns immediately but records every request, so
/// tests can assert settle and grace waits without real delays.
#[derive(Clone, Default)]
pub struct InstantClock {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl InstantClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for InstantClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if let Ok(mut g) = self.slept.lock() {
            g.push(d);
        }
    }
}
