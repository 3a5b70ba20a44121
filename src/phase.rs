//! Named traffic-light phases.
//!
//! A phase is a preset combination of the three channel levels, matching
//! the buttons a crossing operator uses: go, caution, stop, prepare-to-go
//! (red and yellow together), and off.

use crate::output::Channel;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Green only; the figure walks.
    Go,
    /// Yellow only.
    Caution,
    /// Red only.
    Stop,
    /// Red and yellow together.
    PrepareToGo,
    /// All lights dark.
    Off,
}

impl Phase {
    /// Channel levels for this phase, lights switching off first so two
    /// phases never show at once.
    pub fn levels(self) -> [(Channel, bool); 3] {
        let (green, yellow, red) = match self {
            Phase::Go => (true, false, false),
            Phase::Caution => (false, true, false),
            Phase::Stop => (false, false, true),
            Phase::PrepareToGo => (false, true, true),
            Phase::Off => (false, false, false),
        };

        let mut levels = [
            (Channel::Green, green),
            (Channel::Yellow, yellow),
            (Channel::Red, red),
        ];
        levels.sort_by_key(|(_, on)| *on);
        levels
    }
}
