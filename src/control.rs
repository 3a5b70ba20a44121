//! The control loop: one cooperative cycle that serves requests, animates,
//! and paces the display.
//!
//! Each iteration:
//! 1. drain queued requests without waiting (at most
//!    [`MAX_REQUESTS_PER_FRAME`]), handling each one fully
//! 2. apply the running sequence's next phase if it has come due
//! 3. clear the frame; if green is on, tick then render; present the frame
//! 4. sleep for the frame interval
//!
//! The loop is the sole owner of the [`Crosswalk`]. HTTP handlers reach it
//! only through [`ControlRequest`]s and wait for the reply on a oneshot.
//! A manual command or phase cancels a running sequence.

use crate::crosswalk::{Crosswalk, CrosswalkStatus};
use crate::display::Display;
use crate::handler::{self, CommandRequest, CommandResponse, UnknownChannelPolicy};
use crate::output::Gpio;
use crate::phase::Phase;
use crate::render::{FrameBuffer, render_into};
use crate::sequence::{STANDARD_SEQUENCE, Sequence, SequenceAction, SequenceStep};
use crate::{ScreenConfig, is_running};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

/// Upper bound on requests handled in one iteration, so a burst cannot
/// starve the display.
pub const MAX_REQUESTS_PER_FRAME: usize = 16;

/// Depth of the request queue between the HTTP server and the loop.
pub const REQUEST_QUEUE_DEPTH: usize = 64;

// ── Requests ─────────────────────────────────────────────────────────

/// Work sent from the HTTP server to the control loop.
pub enum ControlRequest {
    /// Set one channel from query parameters.
    Command {
        request: CommandRequest,
        reply: oneshot::Sender<CommandResponse>,
    },
    /// Apply a named phase.
    Phase {
        phase: Phase,
        reply: oneshot::Sender<CommandResponse>,
    },
    /// Start or stop the timed sequence.
    Sequence {
        action: SequenceAction,
        reply: oneshot::Sender<CommandResponse>,
    },
    /// Report the current state.
    Status {
        reply: oneshot::Sender<CrosswalkStatus>,
    },
}

// ── Configuration ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlConfig {
    pub screen: ScreenConfig,
    /// Fixed sleep between iterations.
    pub frame_interval: Duration,
    pub unknown_channels: UnknownChannelPolicy,
    /// Steps run by a sequence start request.
    pub sequence: &'static [SequenceStep],
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            screen: ScreenConfig::default(),
            frame_interval: Duration::from_millis(100),
            unknown_channels: UnknownChannelPolicy::Ignore,
            sequence: STANDARD_SEQUENCE,
        }
    }
}

// ── Loop ─────────────────────────────────────────────────────────────

pub struct ControlLoop<G> {
    crosswalk: Crosswalk<G>,
    config: ControlConfig,
    frame: FrameBuffer,
    requests: mpsc::Receiver<ControlRequest>,
    sequence: Option<Sequence>,
}

impl<G: Gpio> ControlLoop<G> {
    pub fn new(
        crosswalk: Crosswalk<G>,
        config: ControlConfig,
        requests: mpsc::Receiver<ControlRequest>,
    ) -> Self {
        Self {
            crosswalk,
            config,
            frame: FrameBuffer::new(config.screen),
            requests,
            sequence: None,
        }
    }

    pub fn crosswalk(&self) -> &Crosswalk<G> {
        &self.crosswalk
    }

    /// Phase of the running sequence, if any.
    pub fn sequence_phase(&self) -> Option<Phase> {
        self.sequence.as_ref().and_then(Sequence::current)
    }

    /// The frame presented by the last iteration.
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Handle queued requests without waiting for new ones. Returns how many
    /// were handled.
    pub fn drain_requests(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_REQUESTS_PER_FRAME {
            match self.requests.try_recv() {
                Ok(request) => {
                    self.handle(request);
                    handled += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    fn handle(&mut self, request: ControlRequest) {
        // A dropped receiver means the client went away; nothing to do.
        match request {
            ControlRequest::Command { request, reply } => {
                self.cancel_sequence();
                let response =
                    handler::handle(&mut self.crosswalk, &request, self.config.unknown_channels);
                let _ = reply.send(response);
            }
            ControlRequest::Phase { phase, reply } => {
                self.cancel_sequence();
                let _ = reply.send(handler::apply_phase(&mut self.crosswalk, phase));
            }
            ControlRequest::Sequence { action, reply } => {
                let _ = reply.send(self.sequence_action(action));
            }
            ControlRequest::Status { reply } => {
                let mut status = self.crosswalk.status();
                status.sequence = self.sequence_phase();
                let _ = reply.send(status);
            }
        }
    }

    fn sequence_action(&mut self, action: SequenceAction) -> CommandResponse {
        match action {
            SequenceAction::Start => {
                // First step is applied by this iteration's advance.
                self.sequence = Some(Sequence::new(self.config.sequence));
                tracing::info!("Sequence started");
                CommandResponse::ok()
            }
            SequenceAction::Stop => {
                self.cancel_sequence();
                handler::apply_phase(&mut self.crosswalk, Phase::Off)
            }
        }
    }

    fn cancel_sequence(&mut self) {
        if self.sequence.take().is_some() {
            tracing::info!("Sequence stopped");
        }
    }

    /// Apply the sequence's next phase if it is due at `now`.
    fn advance_sequence(&mut self, now: Instant) {
        let Some(sequence) = self.sequence.as_mut() else {
            return;
        };
        let due = sequence.poll(now);
        let finished = sequence.is_finished();

        if let Some(phase) = due {
            let response = handler::apply_phase(&mut self.crosswalk, phase);
            if response != CommandResponse::ok() {
                tracing::warn!("Sequence abandoned");
                self.sequence = None;
                return;
            }
        }
        if finished {
            tracing::info!("Sequence finished");
            self.sequence = None;
        }
    }

    /// One iteration minus the sleep.
    pub fn step<D: Display + ?Sized>(&mut self, display: &mut D) {
        self.step_at(display, Instant::now());
    }

    /// One iteration minus the sleep, with sequence timing measured at `now`.
    pub fn step_at<D: Display + ?Sized>(&mut self, display: &mut D, now: Instant) {
        self.drain_requests();
        self.advance_sequence(now);

        self.frame.clear();
        if self.crosswalk.animation().active {
            self.crosswalk.tick(self.config.screen.width);
            render_into(self.crosswalk.animation(), &mut self.frame)
                .unwrap_or_else(|never| match never {});
        }

        if let Err(e) = display.present(&self.frame) {
            tracing::warn!("{}", e);
        }
    }

    /// Run until `running` goes false, then darken the crossing and hand the
    /// state back.
    pub async fn run<D: Display + ?Sized>(
        mut self,
        display: &mut D,
        running: &AtomicBool,
    ) -> Crosswalk<G> {
        tracing::info!(
            "Control loop started ({}ms per frame)",
            self.config.frame_interval.as_millis()
        );

        while is_running(running) {
            self.step(display);
            tokio::time::sleep(self.config.frame_interval).await;
        }

        tracing::info!("Control loop stopping");
        if let Err(e) = self.crosswalk.shutdown() {
            tracing::error!("Failed to switch lights off: {}", e);
        }
        if let Err(e) = display.clear() {
            tracing::warn!("{}", e);
        }

        self.crosswalk
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PinMap;
    use crate::display::{DisplayError, HeadlessDisplay};
    use crate::handler::ResponseStatus;
    use crate::output::{Channel, OutputController, SimulatedGpio};
    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn control(config: ControlConfig) -> (ControlLoop<SimulatedGpio>, mpsc::Sender<ControlRequest>) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let outputs = OutputController::new(SimulatedGpio::new(), PinMap::default()).unwrap();
        (ControlLoop::new(Crosswalk::new(outputs), config, rx), tx)
    }

    fn command(
        tx: &mpsc::Sender<ControlRequest>,
        channel: &str,
        state: &str,
    ) -> oneshot::Receiver<CommandResponse> {
        let (reply, rx) = oneshot::channel();
        tx.try_send(ControlRequest::Command {
            request: CommandRequest::new(channel, state),
            reply,
        })
        .unwrap_or_else(|_| panic!("queue full"));
        rx
    }

    /// Display that fails every present.
    struct BrokenDisplay;

    impl Display for BrokenDisplay {
        fn clear(&mut self) -> Result<(), DisplayError> {
            Ok(())
        }

        fn present(&mut self, _frame: &FrameBuffer) -> Result<(), DisplayError> {
            Err(DisplayError::Present("cable unplugged".to_string()))
        }
    }

    #[test]
    fn idle_iteration_presents_blank_frame() {
        let (mut ctl, _tx) = control(ControlConfig::default());
        let mut display = HeadlessDisplay::new();

        ctl.step(&mut display);

        assert_eq!(display.presented(), 1);
        assert!(ctl.frame().is_blank());
        assert_eq!(ctl.crosswalk().animation().position, 0);
    }

    #[test]
    fn command_is_answered_within_the_iteration() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let mut display = HeadlessDisplay::new();
        let mut reply = command(&tx, "green", "on");

        ctl.step(&mut display);

        let response = reply.try_recv().unwrap();
        assert_eq!(response.code, StatusCode::OK);
        assert!(ctl.crosswalk().level(Channel::Green));
        assert_eq!(ctl.crosswalk().animation().position, 2);
        assert!(!ctl.frame().is_blank());
        assert!(display.last_lit() > 0);
    }

    #[test]
    fn figure_advances_once_per_iteration() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let mut display = HeadlessDisplay::new();
        let _reply = command(&tx, "green", "on");

        for _ in 0..5 {
            ctl.step(&mut display);
        }

        assert_eq!(ctl.crosswalk().animation().position, 10);
        assert_eq!(display.presented(), 5);
    }

    #[test]
    fn green_off_blanks_the_next_frame() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let mut display = HeadlessDisplay::new();
        let _on = command(&tx, "green", "on");
        ctl.step(&mut display);
        ctl.step(&mut display);

        let _off = command(&tx, "green", "off");
        ctl.step(&mut display);

        assert!(ctl.frame().is_blank());
        assert_eq!(ctl.crosswalk().animation().position, 0);
        assert_eq!(display.last_lit(), 0);
    }

    #[test]
    fn missing_parameter_reply_is_error() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let (reply, mut rx) = oneshot::channel();
        tx.try_send(ControlRequest::Command {
            request: CommandRequest {
                channel: Some("green".into()),
                state: None,
            },
            reply,
        })
        .unwrap_or_else(|_| panic!("queue full"));

        ctl.drain_requests();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.code, StatusCode::BAD_REQUEST);
        assert_eq!(response.body.status, ResponseStatus::Error);
        assert!(!ctl.crosswalk().level(Channel::Green));
    }

    #[test]
    fn requests_are_handled_in_order() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let _a = command(&tx, "red", "on");
        let _b = command(&tx, "red", "off");
        let _c = command(&tx, "yellow", "on");

        assert_eq!(ctl.drain_requests(), 3);
        assert!(!ctl.crosswalk().level(Channel::Red));
        assert!(ctl.crosswalk().level(Channel::Yellow));
    }

    #[test]
    fn drain_is_bounded_per_iteration() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let replies: Vec<_> = (0..MAX_REQUESTS_PER_FRAME + 4)
            .map(|_| command(&tx, "red", "on"))
            .collect();

        assert_eq!(ctl.drain_requests(), MAX_REQUESTS_PER_FRAME);
        assert_eq!(ctl.drain_requests(), 4);
        assert_eq!(ctl.drain_requests(), 0);
        drop(replies);
    }

    #[test]
    fn status_request_reports_state() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let _on = command(&tx, "red", "on");
        let (reply, mut rx) = oneshot::channel();
        tx.try_send(ControlRequest::Status { reply })
            .unwrap_or_else(|_| panic!("queue full"));

        ctl.drain_requests();

        let status = rx.try_recv().unwrap();
        assert!(status.red);
        assert!(!status.green);
    }

    #[test]
    fn phase_request_applies_preset() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let (reply, mut rx) = oneshot::channel();
        tx.try_send(ControlRequest::Phase {
            phase: Phase::PrepareToGo,
            reply,
        })
        .unwrap_or_else(|_| panic!("queue full"));

        ctl.drain_requests();

        assert_eq!(rx.try_recv().unwrap(), CommandResponse::ok());
        assert!(ctl.crosswalk().level(Channel::Red));
        assert!(ctl.crosswalk().level(Channel::Yellow));
    }

    #[test]
    fn dropped_client_does_not_disturb_loop() {
        let (mut ctl, tx) = control(ControlConfig::default());
        drop(command(&tx, "yellow", "on"));

        assert_eq!(ctl.drain_requests(), 1);
        assert!(ctl.crosswalk().level(Channel::Yellow));
    }

    #[test]
    fn closed_queue_keeps_animating() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let _on = command(&tx, "green", "on");
        drop(tx);
        let mut display = HeadlessDisplay::new();

        ctl.step(&mut display);
        ctl.step(&mut display);

        assert_eq!(ctl.crosswalk().animation().position, 4);
    }

    #[test]
    fn present_failure_is_not_fatal() {
        let (mut ctl, tx) = control(ControlConfig::default());
        let _on = command(&tx, "green", "on");

        ctl.step(&mut BrokenDisplay);
        ctl.step(&mut BrokenDisplay);

        assert_eq!(ctl.crosswalk().animation().position, 4);
    }

    static QUICK: &[SequenceStep] = &[
        SequenceStep::new(Phase::Go, Duration::from_millis(100)),
        SequenceStep::new(Phase::Caution, Duration::from_millis(20)),
        SequenceStep::new(Phase::Stop, Duration::from_millis(100)),
        SequenceStep::new(Phase::PrepareToGo, Duration::from_millis(20)),
        SequenceStep::new(Phase::Go, Duration::ZERO),
    ];

    fn quick_config() -> ControlConfig {
        ControlConfig {
            sequence: QUICK,
            ..ControlConfig::default()
        }
    }

    fn sequence(
        tx: &mpsc::Sender<ControlRequest>,
        action: SequenceAction,
    ) -> oneshot::Receiver<CommandResponse> {
        let (reply, rx) = oneshot::channel();
        tx.try_send(ControlRequest::Sequence { action, reply })
            .unwrap_or_else(|_| panic!("queue full"));
        rx
    }

    /// Lit channels as (green, yellow, red).
    fn lights(ctl: &ControlLoop<SimulatedGpio>) -> (bool, bool, bool) {
        let cw = ctl.crosswalk();
        (
            cw.level(Channel::Green),
            cw.level(Channel::Yellow),
            cw.level(Channel::Red),
        )
    }

    #[test]
    fn sequence_runs_phases_in_order() {
        let (mut ctl, tx) = control(quick_config());
        let mut display = HeadlessDisplay::new();
        let mut reply = sequence(&tx, SequenceAction::Start);
        let start = Instant::now();
        let at = |ms: u64| start + Duration::from_millis(ms);

        ctl.step_at(&mut display, at(0));
        assert_eq!(reply.try_recv().unwrap(), CommandResponse::ok());
        assert_eq!(lights(&ctl), (true, false, false));
        assert_eq!(ctl.sequence_phase(), Some(Phase::Go));
        assert!(ctl.crosswalk().animation().active);

        ctl.step_at(&mut display, at(50));
        assert_eq!(lights(&ctl), (true, false, false));

        ctl.step_at(&mut display, at(100));
        assert_eq!(lights(&ctl), (false, true, false));
        assert_eq!(ctl.crosswalk().animation().position, 0);

        ctl.step_at(&mut display, at(120));
        assert_eq!(lights(&ctl), (false, false, true));

        ctl.step_at(&mut display, at(220));
        assert_eq!(lights(&ctl), (false, true, true));
        assert_eq!(ctl.sequence_phase(), Some(Phase::PrepareToGo));

        ctl.step_at(&mut display, at(240));
        assert_eq!(lights(&ctl), (true, false, false));
        assert_eq!(ctl.sequence_phase(), None);

        // Finished: green stays on.
        ctl.step_at(&mut display, at(1_000));
        assert_eq!(lights(&ctl), (true, false, false));
    }

    #[test]
    fn manual_command_cancels_sequence() {
        let (mut ctl, tx) = control(quick_config());
        let mut display = HeadlessDisplay::new();
        let _start = sequence(&tx, SequenceAction::Start);
        let start = Instant::now();
        ctl.step_at(&mut display, start);

        let _red = command(&tx, "red", "on");
        ctl.step_at(&mut display, start + Duration::from_millis(150));

        assert_eq!(ctl.sequence_phase(), None);
        assert_eq!(lights(&ctl), (true, false, true));
    }

    #[test]
    fn stop_cancels_and_darkens() {
        let (mut ctl, tx) = control(quick_config());
        let mut display = HeadlessDisplay::new();
        let _start = sequence(&tx, SequenceAction::Start);
        let start = Instant::now();
        ctl.step_at(&mut display, start);

        let mut stop = sequence(&tx, SequenceAction::Stop);
        ctl.step_at(&mut display, start + Duration::from_millis(10));

        assert_eq!(stop.try_recv().unwrap(), CommandResponse::ok());
        assert_eq!(ctl.sequence_phase(), None);
        assert_eq!(lights(&ctl), (false, false, false));
        assert!(!ctl.crosswalk().animation().active);

        ctl.step_at(&mut display, start + Duration::from_millis(500));
        assert_eq!(lights(&ctl), (false, false, false));
    }

    #[test]
    fn status_reports_running_sequence_phase() {
        let (mut ctl, tx) = control(quick_config());
        let mut display = HeadlessDisplay::new();
        let _start = sequence(&tx, SequenceAction::Start);
        let start = Instant::now();
        ctl.step_at(&mut display, start);
        ctl.step_at(&mut display, start + Duration::from_millis(100));

        let (reply, mut rx) = oneshot::channel();
        tx.try_send(ControlRequest::Status { reply })
            .unwrap_or_else(|_| panic!("queue full"));
        ctl.drain_requests();

        assert_eq!(rx.try_recv().unwrap().sequence, Some(Phase::Caution));
    }

    #[tokio::test]
    async fn run_stops_and_darkens_on_shutdown() {
        let config = ControlConfig {
            frame_interval: Duration::from_millis(5),
            ..ControlConfig::default()
        };
        let (ctl, tx) = control(config);
        let _on = command(&tx, "green", "on");
        let _red = command(&tx, "red", "on");
        let running = Arc::new(AtomicBool::new(true));
        let mut display = HeadlessDisplay::new();

        let stopper = {
            let running = running.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                running.store(false, Ordering::SeqCst);
            }
        };
        let (crosswalk, ()) = tokio::join!(ctl.run(&mut display, &running), stopper);

        assert!(Channel::ALL.iter().all(|c| !crosswalk.level(*c)));
        assert!(!crosswalk.animation().active);
        assert!(display.presented() >= 2);
    }
}
