//! Pedestrian crossing simulator
//!
//! Drives three indicator outputs, accepts commands over HTTP, and animates
//! a walking figure on the display while the green light is on.
//!
//! ## Architecture
//! Everything runs on one `tokio` current-thread runtime:
//! - **HTTP server** (axum): turns each request into a queued message
//! - **Control loop**: drains the queue, animates, presents, sleeps
//!
//! ## Usage
//! ```sh
//! ./target/release/crosswalk-rs --port 8080 --display terminal
//! curl 'http://localhost:8080/led?channel=green&state=on'
//! ```

use clap::Parser;
use crosswalk_rs::control::{ControlConfig, ControlLoop, REQUEST_QUEUE_DEPTH};
use crosswalk_rs::crosswalk::Crosswalk;
use crosswalk_rs::display::{DisplayKind, open_display};
use crosswalk_rs::error::StartupError;
use crosswalk_rs::handler::UnknownChannelPolicy;
use crosswalk_rs::output::{OutputController, SimulatedGpio};
use crosswalk_rs::server::{self, AppState};
use crosswalk_rs::{MAX_DIMENSION, PinMap, ScreenConfig, setup_signal_handler};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Pedestrian crossing simulator
#[derive(Parser)]
#[command(name = "crosswalk-rs")]
#[command(about = "Simulated pedestrian crossing with an HTTP command endpoint")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Display width in pixels
    #[arg(long, default_value = "128", value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DIMENSION)))]
    width: u32,

    /// Display height in pixels
    #[arg(long, default_value = "32", value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DIMENSION)))]
    height: u32,

    /// GPIO pin for the green light
    #[arg(long, default_value = "33")]
    green_pin: u8,

    /// GPIO pin for the yellow light
    #[arg(long, default_value = "25")]
    yellow_pin: u8,

    /// GPIO pin for the red light
    #[arg(long, default_value = "26")]
    red_pin: u8,

    /// Milliseconds between frames
    #[arg(long, default_value = "100")]
    frame_ms: u64,

    /// Display backend
    #[arg(long, value_enum, default_value_t = DisplayKind::Headless)]
    display: DisplayKind,

    /// Answer 400 for unknown channel names instead of ignoring them
    #[arg(long)]
    strict_channels: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr) // stdout belongs to the terminal display
        .with_target(false)
        .with_ansi(false)
        .compact()
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    let screen = ScreenConfig::new(args.width, args.height);
    let pins = PinMap::new(args.green_pin, args.yellow_pin, args.red_pin);
    let config = ControlConfig {
        screen,
        frame_interval: Duration::from_millis(args.frame_ms),
        unknown_channels: if args.strict_channels {
            UnknownChannelPolicy::Reject
        } else {
            UnknownChannelPolicy::Ignore
        },
        ..ControlConfig::default()
    };

    tracing::info!("Crosswalk v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Screen: {}x{}", screen.width, screen.height);
    tracing::info!(
        "Pins: green={} yellow={} red={}",
        pins.green,
        pins.yellow,
        pins.red
    );

    let running = setup_signal_handler()?;

    let outputs = OutputController::new(SimulatedGpio::new(), pins)?;

    let mut display = open_display(args.display, screen)?;
    display.clear()?;
    tracing::info!("Display ready ({:?})", args.display);

    let listener = server::bind(args.port).await?;
    tracing::info!(
        "Try: curl 'http://localhost:{}/led?channel=green&state=on'",
        args.port
    );
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);

    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let app = server::create_router(AppState { requests: tx });
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let control = ControlLoop::new(Crosswalk::new(outputs), config, rx);
    control.run(&mut *display, &running).await;

    server.abort();
    tracing::info!("Shut down cleanly");
    Ok(())
}
