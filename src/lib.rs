//! Pedestrian crossing simulator.
//!
//! This crate drives three indicator outputs (green, yellow, red), accepts
//! state-change commands over HTTP, and animates a walking figure on a small
//! display while the green light is on.
//!
//! Module map:
//! - [`output`]: channel names, GPIO abstraction, output controller
//! - [`animation`]: walking figure position and leg pose
//! - [`render`]: frame buffer and figure drawing
//! - [`display`]: display backends the frame buffer is presented to
//! - [`crosswalk`]: the owned state the control loop mutates
//! - [`handler`]: command validation and application
//! - [`sequence`]: the timed go/caution/stop sequence
//! - [`control`]: the cooperative control loop
//! - [`server`]: axum router feeding the control loop

pub mod animation;
pub mod control;
pub mod crosswalk;
pub mod display;
pub mod error;
pub mod handler;
pub mod output;
pub mod phase;
pub mod render;
pub mod sequence;
pub mod server;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Screen configuration ───────────────────────────────────────────

/// Largest accepted display width or height.
pub const MAX_DIMENSION: u32 = 1024;

/// Dimensions of the attached display in pixels.
///
/// Defaults to the 128x32 OLED the crossing was built around.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl ScreenConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels on the screen.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 32,
        }
    }
}

// ── Pin assignment ─────────────────────────────────────────────────

/// GPIO pin number assigned to each indicator channel.
///
/// Fixed at startup; the output controller never reassigns a pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinMap {
    pub green: u8,
    pub yellow: u8,
    pub red: u8,
}

impl PinMap {
    pub fn new(green: u8, yellow: u8, red: u8) -> Self {
        Self { green, yellow, red }
    }

    /// All three pins in channel order (green, yellow, red).
    pub fn pins(&self) -> [u8; 3] {
        [self.green, self.yellow, self.red]
    }

    /// Whether every channel has its own pin.
    pub fn is_distinct(&self) -> bool {
        self.green != self.yellow && self.green != self.red && self.yellow != self.red
    }
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            green: 33,
            yellow: 25,
            red: 26,
        }
    }
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// The control loop polls the returned flag once per frame.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the control loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────
