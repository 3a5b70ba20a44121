//! Startup failures.
//!
//! Anything that goes wrong before the control loop starts is fatal. The
//! error travels up to `main`, which logs it and exits non-zero.

use crate::display::DisplayError;
use crate::output::GpioError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum StartupError {
    /// The display was not detected or would not initialize.
    Display(DisplayError),
    /// An indicator pin could not be configured.
    Gpio(GpioError),
    /// The HTTP listener could not be bound.
    Bind(io::Error),
    /// The Ctrl+C handler could not be installed.
    Signal(ctrlc::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Display(e) => write!(f, "{e}"),
            StartupError::Gpio(e) => write!(f, "gpio setup failed: {e}"),
            StartupError::Bind(e) => write!(f, "could not start HTTP server: {e}"),
            StartupError::Signal(e) => write!(f, "could not install signal handler: {e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Display(e) => Some(e),
            StartupError::Gpio(e) => Some(e),
            StartupError::Bind(e) => Some(e),
            StartupError::Signal(e) => Some(e),
        }
    }
}

impl From<DisplayError> for StartupError {
    fn from(e: DisplayError) -> Self {
        StartupError::Display(e)
    }
}

impl From<GpioError> for StartupError {
    fn from(e: GpioError) -> Self {
        StartupError::Gpio(e)
    }
}

impl From<io::Error> for StartupError {
    fn from(e: io::Error) -> Self {
        StartupError::Bind(e)
    }
}

impl From<ctrlc::Error> for StartupError {
    fn from(e: ctrlc::Error) -> Self {
        StartupError::Signal(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::error::Error;

    #[test]
    fn display_failure_message_names_the_cause() {
        let err = StartupError::from(DisplayError::InitFailure("not found".to_string()));
        assert_eq!(err.to_string(), "display init failed: not found");
        assert!(err.source().is_some());
    }

    #[test]
    fn bind_failure_wraps_io_error() {
        let err = StartupError::from(io::Error::new(io::ErrorKind::AddrInUse, "in use"));
        assert!(matches!(err, StartupError::Bind(_)));
        assert_eq!(err.to_string(), "could not start HTTP server: in use");
    }
}
