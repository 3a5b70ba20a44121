//! Walking figure state: horizontal position, leg pose, and whether the
//! green phase is active.

use serde::Serialize;

/// Pixels the figure moves per tick.
pub const STEP: i32 = 2;

/// How far past either screen edge the figure travels before wrapping.
pub const WRAP_MARGIN: i32 = 10;

/// Leg pose drawn for the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LegFrame {
    /// Legs spread evenly.
    #[default]
    Neutral,
    /// Legs mid-stride.
    Walking,
}

impl LegFrame {
    pub fn toggled(self) -> Self {
        match self {
            LegFrame::Neutral => LegFrame::Walking,
            LegFrame::Walking => LegFrame::Neutral,
        }
    }

    /// 0 for neutral, 1 for walking.
    pub fn index(self) -> u8 {
        match self {
            LegFrame::Neutral => 0,
            LegFrame::Walking => 1,
        }
    }
}

/// Animation state for the pedestrian figure.
///
/// `active` mirrors the green light. Position only advances while active,
/// and switching off sends the figure back to the start. Switching on does
/// not move it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct AnimationState {
    pub position: i32,
    pub leg_frame: LegFrame,
    pub active: bool,
}

impl AnimationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one frame. Does nothing while inactive.
    ///
    /// Once the figure has walked more than [`WRAP_MARGIN`] pixels past the
    /// right edge it re-enters [`WRAP_MARGIN`] pixels left of the screen.
    pub fn tick(&mut self, screen_width: u32) {
        if !self.active {
            return;
        }

        self.position += STEP;
        self.leg_frame = self.leg_frame.toggled();

        let limit = i32::try_from(screen_width)
            .unwrap_or(i32::MAX)
            .saturating_add(WRAP_MARGIN);
        if self.position > limit {
            self.position = -WRAP_MARGIN;
        }
    }

    pub fn set_active(&mut self, active: bool) {
        if !active {
            self.position = 0;
        }
        self.active = active;
    }
}
