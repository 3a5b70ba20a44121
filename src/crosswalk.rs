//! The crossing's owned state: indicator outputs plus the walking figure.
//!
//! The control loop owns exactly one [`Crosswalk`] and lends it to the
//! request handler and the renderer for one call at a time. Green can only
//! change through [`Crosswalk::set_green_and_animation`], so the figure
//! never walks while the green output is low.

use crate::animation::AnimationState;
use crate::output::{Channel, Gpio, OutputController, OutputError};
use crate::phase::Phase;
use serde::Serialize;

/// Snapshot of the crossing, served by the status endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct CrosswalkStatus {
    pub green: bool,
    pub yellow: bool,
    pub red: bool,
    pub animation: AnimationState,
    /// Phase of the running sequence, if one is running
    pub sequence: Option<Phase>,
    /// Server version
    pub version: String,
}

pub struct Crosswalk<G> {
    outputs: OutputController<G>,
    animation: AnimationState,
}

impl<G: Gpio> Crosswalk<G> {
    pub fn new(outputs: OutputController<G>) -> Self {
        Self {
            outputs,
            animation: AnimationState::new(),
        }
    }

    /// Set the green output and the animation flag together.
    ///
    /// If the pin write fails the animation is left untouched.
    pub fn set_green_and_animation(&mut self, on: bool) -> Result<(), OutputError> {
        self.outputs.set(Channel::Green, on)?;
        self.animation.set_active(on);
        Ok(())
    }

    /// Set any channel; green goes through the coupled update.
    pub fn set_channel(&mut self, channel: Channel, on: bool) -> Result<(), OutputError> {
        match channel {
            Channel::Green => self.set_green_and_animation(on),
            Channel::Yellow | Channel::Red => self.outputs.set(channel, on),
        }
    }

    /// Advance the figure one frame (no-op while green is off).
    pub fn tick(&mut self, screen_width: u32) {
        self.animation.tick(screen_width);
    }

    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    pub fn outputs(&self) -> &OutputController<G> {
        &self.outputs
    }

    pub fn level(&self, channel: Channel) -> bool {
        self.outputs.level(channel)
    }

    pub fn status(&self) -> CrosswalkStatus {
        CrosswalkStatus {
            green: self.level(Channel::Green),
            yellow: self.level(Channel::Yellow),
            red: self.level(Channel::Red),
            animation: self.animation,
            sequence: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Turn every light off and stop the figure. Every channel is tried even
    /// if an earlier one fails; the first failure is returned.
    pub fn shutdown(&mut self) -> Result<(), OutputError> {
        let green = self.set_green_and_animation(false);
        let rest = self.outputs.all_off();
        green.and(rest)
    }
}
