//! In-memory Arduino-style board.
//!
//! Holds the pin state the builtin device operations write and read back.
//! Inputs can be injected.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::error::{DeviceError, Result};

/// Highest value an analog input reports.
pub const ANALOG_MAX: u16 = 1023;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PinMode {
    Input,
    Output,
    InputPullup,
}

impl FromStr for PinMode {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INPUT" => Ok(Self::Input),
            "OUTPUT" => Ok(Self::Output),
            "INPUT_PULLUP" => Ok(Self::InputPullup),
            other => Err(DeviceError::InvalidArgument {
                name: "mode",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Level {
    High,
    #[default]
    Low,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl FromStr for Level {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HIGH" | "1" | "true" => Ok(Self::High),
            "LOW" | "0" | "false" => Ok(Self::Low),
            other => Err(DeviceError::InvalidArgument {
                name: "level",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterruptMode {
    Rising,
    Falling,
    Change,
    Low,
}

impl FromStr for InterruptMode {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RISING" => Ok(Self::Rising),
            "FALLING" => Ok(Self::Falling),
            "CHANGE" => Ok(Self::Change),
            "LOW" => Ok(Self::Low),
            other => Err(DeviceError::InvalidArgument {
                name: "interrupt mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Accept `D3` as well as `3`.
pub fn normalize_pin(pin: &str) -> String {
    let pin = pin.trim();
    match pin.strip_prefix('D') {
        Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) => {
            rest.to_string()
        }
        _ => pin.to_string(),
    }
}

// ============================================================================
// Layout
// ============================================================================

/// What a pin can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinCapabilities {
    pub digital: bool,
    pub analog: bool,
    pub pwm: bool,
}

impl PinCapabilities {
    const fn new(digital: bool, analog: bool, pwm: bool) -> Self {
        Self {
            digital,
            analog,
            pwm,
        }
    }
}

/// Pins of a board and what each supports.
#[derive(Debug, Clone)]
pub struct BoardLayout {
    pins: HashMap<String, PinCapabilities>,
}

impl BoardLayout {
    /// ATmega328P pins: D0-D13 and A0-A5, PWM on 3, 5, 6, 9, 10 and 11.
    pub fn uno() -> Self {
        let mut pins = HashMap::new();
        for pin in 0..=13u8 {
            let pwm = matches!(pin, 3 | 5 | 6 | 9 | 10 | 11);
            pins.insert(pin.to_string(), PinCapabilities::new(true, false, pwm));
        }
        for pin in 0..=5u8 {
            pins.insert(format!("A{pin}"), PinCapabilities::new(true, true, false));
        }
        Self { pins }
    }

    /// The Uno layout plus the analog-only A6 and A7 of the compact package.
    pub fn uno_compact() -> Self {
        let mut layout = Self::uno();
        for pin in ["A6", "A7"] {
            layout
                .pins
                .insert(pin.to_string(), PinCapabilities::new(false, true, false));
        }
        layout
    }

    pub fn capabilities(&self, pin: &str) -> Option<PinCapabilities> {
        self.pins.get(pin).copied()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PinState {
    pub mode: Option<PinMode>,
    /// Driven level for outputs, sensed level for inputs.
    pub level: Level,
    pub pwm: Option<u8>,
    pub servo: Option<u8>,
    pub analog: u16,
}

/// Simulated board.
#[derive(Debug)]
pub struct ArduinoBoard {
    layout: BoardLayout,
    pins: DashMap<String, PinState>,
    interrupts: DashMap<String, InterruptMode>,
}

impl ArduinoBoard {
    pub fn new(layout: BoardLayout) -> Self {
        Self {
            layout,
            pins: DashMap::new(),
            interrupts: DashMap::new(),
        }
    }

    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    fn checked(&self, pin: &str, capability: &'static str) -> Result<String> {
        let pin = normalize_pin(pin);
        let caps = self
            .layout
            .capabilities(&pin)
            .ok_or_else(|| DeviceError::UnknownPin(pin.clone()))?;
        let supported = match capability {
            "analog input" => caps.analog,
            "PWM" => caps.pwm,
            _ => caps.digital,
        };
        if !supported {
            return Err(DeviceError::Unsupported { pin, capability });
        }
        Ok(pin)
    }

    /// Snapshot of a pin; untouched pins report the default state.
    pub fn pin(&self, pin: &str) -> Result<PinState> {
        let pin = normalize_pin(pin);
        if self.layout.capabilities(&pin).is_none() {
            return Err(DeviceError::UnknownPin(pin));
        }
        Ok(self
            .pins
            .get(&pin)
            .map(|state| state.value().clone())
            .unwrap_or_default())
    }

    pub fn set_pin_mode(&self, pin: &str, mode: PinMode) -> Result<()> {
        let pin = self.checked(pin, "digital I/O")?;
        let mut state = self.pins.entry(pin).or_default();
        state.mode = Some(mode);
        if mode == PinMode::InputPullup {
            state.level = Level::High;
        }
        Ok(())
    }

    pub fn digital_write(&self, pin: &str, level: Level) -> Result<()> {
        let pin = self.checked(pin, "digital I/O")?;
        let mut state = self.pins.entry(pin).or_default();
        state.mode.get_or_insert(PinMode::Output);
        state.level = level;
        state.pwm = None;
        Ok(())
    }

    pub fn analog_write(&self, pin: &str, duty: u8) -> Result<()> {
        let pin = self.checked(pin, "PWM")?;
        let mut state = self.pins.entry(pin).or_default();
        state.mode = Some(PinMode::Output);
        state.level = if duty > 0 { Level::High } else { Level::Low };
        state.pwm = Some(duty);
        Ok(())
    }

    /// Servo angle, clamped to 0-180 degrees.
    pub fn servo_write(&self, pin: &str, angle: i64) -> Result<u8> {
        let pin = self.checked(pin, "digital I/O")?;
        let angle = angle.clamp(0, 180) as u8;
        let mut state = self.pins.entry(pin).or_default();
        state.mode = Some(PinMode::Output);
        state.servo = Some(angle);
        Ok(angle)
    }

    pub fn digital_read(&self, pin: &str) -> Result<Level> {
        let pin = self.checked(pin, "digital I/O")?;
        Ok(self.pins.get(&pin).map(|state| state.level).unwrap_or_default())
    }

    pub fn analog_read(&self, pin: &str) -> Result<u16> {
        let pin = self.checked(pin, "analog input")?;
        Ok(self.pins.get(&pin).map(|state| state.analog).unwrap_or(0))
    }

    /// Apply an external level to an input pin.
    pub fn set_input(&self, pin: &str, level: Level) -> Result<()> {
        let pin = self.checked(pin, "digital I/O")?;
        self.pins.entry(pin).or_default().level = level;
        Ok(())
    }

    pub fn set_analog_input(&self, pin: &str, value: u16) -> Result<()> {
        let pin = self.checked(pin, "analog input")?;
        self.pins.entry(pin).or_default().analog = value.min(ANALOG_MAX);
        Ok(())
    }

    pub fn attach_interrupt(&self, pin: &str, mode: InterruptMode) -> Result<()> {
        let pin = self.checked(pin, "digital I/O")?;
        debug!(pin = %pin, ?mode, "Interrupt attached");
        self.interrupts.insert(pin, mode);
        Ok(())
    }

    pub fn detach_interrupt(&self, pin: &str) -> Result<()> {
        let pin = self.checked(pin, "digital I/O")?;
        self.interrupts.remove(&pin);
        Ok(())
    }

    pub fn interrupt(&self, pin: &str) -> Option<InterruptMode> {
        self.interrupts.get(&normalize_pin(pin)).map(|mode| *mode)
    }
}
