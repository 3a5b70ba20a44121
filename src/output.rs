//! Indicator outputs: channel names, the GPIO seam, and the controller that
//! binds one pin to each channel.
//!
//! Two GPIO backends are provided:
//! - [`SimulatedGpio`] keeps levels in memory and logs every change
//! - [`HalGpio`] drives any set of `embedded_hal::digital::OutputPin`s
//!
//! The `crosswalk-rs` binary always runs on [`SimulatedGpio`]. [`HalGpio`]
//! is for library users who hold board pins from a HAL crate and build their
//! own [`OutputController`] around them.

use crate::PinMap;
use embedded_hal::digital::{OutputPin, PinState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ── Channel ──────────────────────────────────────────────────────────

/// One of the three controllable indicator outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Green,
    Yellow,
    Red,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Green, Channel::Yellow, Channel::Red];

    /// Name used on the wire (`green`, `yellow`, `red`).
    pub fn name(self) -> &'static str {
        match self {
            Channel::Green => "green",
            Channel::Yellow => "yellow",
            Channel::Red => "red",
        }
    }

    fn index(self) -> usize {
        match self {
            Channel::Green => 0,
            Channel::Yellow => 1,
            Channel::Red => 2,
        }
    }

    /// The pin a [`PinMap`] assigns to this channel.
    pub fn pin_in(self, pins: &PinMap) -> u8 {
        match self {
            Channel::Green => pins.green,
            Channel::Yellow => pins.yellow,
            Channel::Red => pins.red,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names are matched exactly; `Green` is not a channel.
impl FromStr for Channel {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(Channel::Green),
            "yellow" => Ok(Channel::Yellow),
            "red" => Ok(Channel::Red),
            other => Err(OutputError::UnknownChannel(other.to_string())),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────

/// Failures reported by a [`Gpio`] backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpioError {
    /// The pin was never configured as an output (or does not exist).
    NotConfigured(u8),
    /// Two channels were assigned the same pin.
    SharedPin(u8),
    /// The underlying pin driver rejected the operation.
    Pin { pin: u8, message: String },
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioError::NotConfigured(pin) => write!(f, "pin {pin} is not configured as an output"),
            GpioError::SharedPin(pin) => write!(f, "pin {pin} is assigned to more than one channel"),
            GpioError::Pin { pin, message } => write!(f, "pin {pin}: {message}"),
        }
    }
}

impl std::error::Error for GpioError {}

/// Failures from [`OutputController::set_channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// The channel name is not green, yellow, or red.
    UnknownChannel(String),
    Gpio(GpioError),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::UnknownChannel(name) => write!(f, "unknown channel: {name:?}"),
            OutputError::Gpio(e) => write!(f, "gpio: {e}"),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Gpio(e) => Some(e),
            OutputError::UnknownChannel(_) => None,
        }
    }
}

impl From<GpioError> for OutputError {
    fn from(e: GpioError) -> Self {
        OutputError::Gpio(e)
    }
}

// ── GPIO seam ────────────────────────────────────────────────────────

/// Digital output abstraction the controller is written against.
pub trait Gpio {
    /// Prepare `pin` for output. Called once per pin at startup.
    fn configure_as_output(&mut self, pin: u8) -> Result<(), GpioError>;

    /// Drive `pin` high (`true`) or low (`false`).
    fn set_level(&mut self, pin: u8, high: bool) -> Result<(), GpioError>;
}

/// In-memory GPIO used when no real pins are attached.
///
/// Each level change is logged, which is the only way to "see" the lights
/// on a host machine.
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    levels: BTreeMap<u8, bool>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of a configured pin.
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.levels.get(&pin).copied()
    }
}

impl Gpio for SimulatedGpio {
    fn configure_as_output(&mut self, pin: u8) -> Result<(), GpioError> {
        self.levels.insert(pin, false);
        tracing::debug!("Pin {} configured as output", pin);
        Ok(())
    }

    fn set_level(&mut self, pin: u8, high: bool) -> Result<(), GpioError> {
        let level = self.levels.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        if *level != high {
            tracing::debug!("Pin {} -> {}", pin, if high { "HIGH" } else { "LOW" });
        }
        *level = high;
        Ok(())
    }
}

/// GPIO backed by `embedded-hal` output pins, keyed by pin number.
///
/// Library-only: the binary has no board pins to hand it.
pub struct HalGpio<P> {
    pins: BTreeMap<u8, (P, bool)>,
}

impl<P: OutputPin> HalGpio<P> {
    /// Wrap a set of pins. None of them is driven until configured.
    pub fn new(pins: impl IntoIterator<Item = (u8, P)>) -> Self {
        Self {
            pins: pins
                .into_iter()
                .map(|(number, pin)| (number, (pin, false)))
                .collect(),
        }
    }
}

impl<P: OutputPin> Gpio for HalGpio<P> {
    fn configure_as_output(&mut self, pin: u8) -> Result<(), GpioError> {
        let (driver, configured) = self.pins.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        driver.set_low().map_err(|e| GpioError::Pin {
            pin,
            message: format!("{e:?}"),
        })?;
        *configured = true;
        Ok(())
    }

    fn set_level(&mut self, pin: u8, high: bool) -> Result<(), GpioError> {
        match self.pins.get_mut(&pin) {
            Some((driver, true)) => driver
                .set_state(PinState::from(high))
                .map_err(|e| GpioError::Pin {
                    pin,
                    message: format!("{e:?}"),
                }),
            _ => Err(GpioError::NotConfigured(pin)),
        }
    }
}

// ── Output controller ────────────────────────────────────────────────

/// A channel, its pin, and the level last written to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelOutput {
    pub channel: Channel,
    pub pin: u8,
    pub level: bool,
}

/// Binds each [`Channel`] to exactly one pin and sets its level.
pub struct OutputController<G> {
    gpio: G,
    outputs: [ChannelOutput; 3],
}

impl<G: Gpio> OutputController<G> {
    /// Configure the three pins as outputs and drive them low.
    pub fn new(mut gpio: G, pins: PinMap) -> Result<Self, GpioError> {
        if !pins.is_distinct() {
            let shared = if pins.green == pins.yellow || pins.green == pins.red {
                pins.green
            } else {
                pins.yellow
            };
            return Err(GpioError::SharedPin(shared));
        }

        let outputs = Channel::ALL.map(|channel| ChannelOutput {
            channel,
            pin: channel.pin_in(&pins),
            level: false,
        });

        for output in &outputs {
            gpio.configure_as_output(output.pin)?;
            gpio.set_level(output.pin, false)?;
        }

        Ok(Self { gpio, outputs })
    }

    /// Set a channel by its wire name.
    pub fn set_channel(&mut self, name: &str, state: bool) -> Result<(), OutputError> {
        let channel: Channel = name.parse()?;
        self.set(channel, state)
    }

    /// Set a channel's pin level. The in-memory level only changes if the
    /// pin write succeeded.
    pub fn set(&mut self, channel: Channel, state: bool) -> Result<(), OutputError> {
        let output = &mut self.outputs[channel.index()];
        self.gpio.set_level(output.pin, state)?;
        output.level = state;
        Ok(())
    }

    pub fn level(&self, channel: Channel) -> bool {
        self.outputs[channel.index()].level
    }

    pub fn outputs(&self) -> &[ChannelOutput; 3] {
        &self.outputs
    }

    /// Drive every channel low, carrying on past failures. Returns the
    /// first failure.
    pub fn all_off(&mut self) -> Result<(), OutputError> {
        let mut result = Ok(());
        for channel in Channel::ALL {
            let outcome = self.set(channel, false);
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }
}

// ── Tests ────────────────────────────────────────────────────────────
