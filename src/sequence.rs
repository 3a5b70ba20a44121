//! Timed traffic-light sequence.
//!
//! A sequence is a list of phases, each held for a fixed time. The control
//! loop polls the running sequence once per iteration and applies whatever
//! phase comes due; nothing here sleeps or spawns.

use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// One phase of a sequence and how long it is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceStep {
    pub phase: Phase,
    pub hold: Duration,
}

impl SequenceStep {
    pub const fn new(phase: Phase, hold: Duration) -> Self {
        Self { phase, hold }
    }
}

/// Go, caution, stop, prepare-to-go, then back to go, where it stays.
pub const STANDARD_SEQUENCE: &[SequenceStep] = &[
    SequenceStep::new(Phase::Go, Duration::from_secs(10)),
    SequenceStep::new(Phase::Caution, Duration::from_secs(2)),
    SequenceStep::new(Phase::Stop, Duration::from_secs(10)),
    SequenceStep::new(Phase::PrepareToGo, Duration::from_secs(2)),
    SequenceStep::new(Phase::Go, Duration::ZERO),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SequenceAction {
    /// Start from the first step, replacing any running sequence.
    Start,
    /// Stop the sequence and switch every light off.
    Stop,
}

/// A sequence in progress.
#[derive(Clone, Debug)]
pub struct Sequence {
    steps: &'static [SequenceStep],
    next: usize,
    deadline: Option<Instant>,
}

impl Sequence {
    /// A sequence whose first step is due on the first poll.
    pub fn new(steps: &'static [SequenceStep]) -> Self {
        Self {
            steps,
            next: 0,
            deadline: None,
        }
    }

    /// Return the phase to apply if the current step's hold has run out.
    pub fn poll(&mut self, now: Instant) -> Option<Phase> {
        if self.deadline.is_some_and(|deadline| now < deadline) {
            return None;
        }
        let step = self.steps.get(self.next)?;
        self.next += 1;
        self.deadline = Some(now + step.hold);
        Some(step.phase)
    }

    /// The phase most recently handed out.
    pub fn current(&self) -> Option<Phase> {
        self.next
            .checked_sub(1)
            .and_then(|i| self.steps.get(i))
            .map(|step| step.phase)
    }

    /// True once the last step has been handed out.
    pub fn is_finished(&self) -> bool {
        self.next >= self.steps.len()
    }
}
