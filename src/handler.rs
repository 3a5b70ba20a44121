//! Command validation and application.
//!
//! This is the only code that mutates the crossing in response to outside
//! requests. Every call runs to completion on the control loop before the
//! next request is looked at.

use crate::crosswalk::Crosswalk;
use crate::output::{Channel, Gpio, OutputError};
use crate::phase::Phase;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Request ──────────────────────────────────────────────────────────

/// Raw query parameters of a command request. Both are required; they are
/// optional here so a missing one can be answered with a JSON error.
///
/// Built with [`CommandRequest::from_query`], which keeps the first value of
/// a repeated parameter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CommandRequest {
    /// Channel to set: green, yellow, or red. `led` is accepted as an alias.
    #[serde(alias = "led")]
    #[param(example = "green")]
    pub channel: Option<String>,
    /// `on` switches the channel on; any other value switches it off.
    #[param(example = "on")]
    pub state: Option<String>,
}

impl CommandRequest {
    pub fn new(channel: &str, state: &str) -> Self {
        Self {
            channel: Some(channel.to_string()),
            state: Some(state.to_string()),
        }
    }

    /// Collect the parameters from decoded query pairs. The first `channel`
    /// or `led` and the first `state` win; everything else is ignored.
    pub fn from_query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut request = Self::default();
        for (key, value) in pairs {
            let slot = match key {
                "channel" | "led" => &mut request.channel,
                "state" => &mut request.state,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        request
    }

    /// Check both parameters are present.
    pub fn validate(&self) -> Result<Command, CommandError> {
        let channel = self
            .channel
            .as_ref()
            .ok_or(CommandError::MissingParameter("channel"))?;
        let state = self
            .state
            .as_ref()
            .ok_or(CommandError::MissingParameter("state"))?;

        Ok(Command {
            channel: channel.clone(),
            desired_state: state == "on",
        })
    }
}

/// A validated command. The channel name is not checked yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub channel: String,
    pub desired_state: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    MissingParameter(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::MissingParameter(name) => write!(f, "missing parameter: {name}"),
        }
    }
}

impl std::error::Error for CommandError {}

// ── Response ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// JSON body of every command response: `{"status":"ok"}` or
/// `{"status":"error"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StatusBody {
    pub status: ResponseStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandResponse {
    pub code: StatusCode,
    pub body: StatusBody,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::OK,
            body: StatusBody {
                status: ResponseStatus::Ok,
            },
        }
    }

    pub fn error(code: StatusCode) -> Self {
        Self {
            code,
            body: StatusBody {
                status: ResponseStatus::Error,
            },
        }
    }
}

// ── Handling ─────────────────────────────────────────────────────────

/// How requests naming an unknown channel are answered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownChannelPolicy {
    /// Answer 200 and change nothing.
    #[default]
    Ignore,
    /// Answer 400.
    Reject,
}

/// Validate and apply one command request.
///
/// Missing parameters answer 400 without touching any state. Green is set
/// through the coupled output-and-animation update.
pub fn handle<G: Gpio>(
    crosswalk: &mut Crosswalk<G>,
    request: &CommandRequest,
    policy: UnknownChannelPolicy,
) -> CommandResponse {
    let command = match request.validate() {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!("Rejected command: {}", e);
            return CommandResponse::error(StatusCode::BAD_REQUEST);
        }
    };

    let channel = match command.channel.parse::<Channel>() {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!("{}", e);
            return match policy {
                UnknownChannelPolicy::Ignore => CommandResponse::ok(),
                UnknownChannelPolicy::Reject => CommandResponse::error(StatusCode::BAD_REQUEST),
            };
        }
    };

    match crosswalk.set_channel(channel, command.desired_state) {
        Ok(()) => {
            tracing::info!(
                "{} -> {}",
                channel,
                if command.desired_state { "on" } else { "off" }
            );
            CommandResponse::ok()
        }
        Err(e) => gpio_failure(e),
    }
}

/// Apply every channel level of a phase.
pub fn apply_phase<G: Gpio>(crosswalk: &mut Crosswalk<G>, phase: Phase) -> CommandResponse {
    for (channel, on) in phase.levels() {
        if let Err(e) = crosswalk.set_channel(channel, on) {
            return gpio_failure(e);
        }
    }
    tracing::info!("Phase {:?}", phase);
    CommandResponse::ok()
}

fn gpio_failure(e: OutputError) -> CommandResponse {
    tracing::error!("Failed to set output: {}", e);
    CommandResponse::error(StatusCode::INTERNAL_SERVER_ERROR)
}

// ── Tests ────────────────────────────────────────────────────────────
