//! Display backends a [`FrameBuffer`] is presented to.
//!
//! The control loop only knows the [`Display`] trait. Backends:
//! - [`HeadlessDisplay`]: counts frames, logs at trace level
//! - [`TerminalDisplay`]: prints the frame as text whenever it changes
//! - `MatrixDisplay`: RGB LED matrix panel (`hardware` feature)

use crate::ScreenConfig;
use crate::render::FrameBuffer;
use std::fmt;
use std::io::{self, IsTerminal, Write};

// ── Trait & errors ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// The display could not be found or initialized. Fatal at startup.
    InitFailure(String),
    /// A frame could not be pushed to the display.
    Present(String),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::InitFailure(msg) => write!(f, "display init failed: {msg}"),
            DisplayError::Present(msg) => write!(f, "display present failed: {msg}"),
        }
    }
}

impl std::error::Error for DisplayError {}

/// Where rendered frames end up.
pub trait Display {
    /// Blank the physical screen.
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Flush a frame to the physical screen.
    fn present(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError>;
}

/// Display backend selected on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DisplayKind {
    /// No output; frames are only counted
    #[default]
    Headless,
    /// Draw frames as text on stdout
    Terminal,
    /// RGB LED matrix panel (requires the `hardware` feature)
    Matrix,
}

/// Initialize the selected backend.
///
/// This is the only place a display can fail to come up; callers treat an
/// error here as fatal.
pub fn open_display(
    kind: DisplayKind,
    screen: ScreenConfig,
) -> Result<Box<dyn Display>, DisplayError> {
    match kind {
        DisplayKind::Headless => Ok(Box::new(HeadlessDisplay::new())),
        DisplayKind::Terminal => {
            let stdout = io::stdout();
            if !stdout.is_terminal() {
                return Err(DisplayError::InitFailure(
                    "stdout is not a terminal".to_string(),
                ));
            }
            Ok(Box::new(TerminalDisplay::new(stdout)))
        }
        #[cfg(feature = "hardware")]
        DisplayKind::Matrix => Ok(Box::new(MatrixDisplay::new(screen)?)),
        #[cfg(not(feature = "hardware"))]
        DisplayKind::Matrix => {
            let _ = screen;
            Err(DisplayError::InitFailure(
                "built without the `hardware` feature".to_string(),
            ))
        }
    }
}

// ── Headless ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    presented: u64,
    last_lit: usize,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames presented so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Lit pixel count of the most recent frame.
    pub fn last_lit(&self) -> usize {
        self.last_lit
    }
}

impl Display for HeadlessDisplay {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.last_lit = 0;
        Ok(())
    }

    fn present(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
        self.presented += 1;
        self.last_lit = frame.lit_count();
        tracing::trace!("Frame {}: {} pixels lit", self.presented, self.last_lit);
        Ok(())
    }
}

// ── Terminal ─────────────────────────────────────────────────────────

/// Prints frames as rows of `#` and `.`, skipping repeats so an idle
/// crossing does not flood the terminal.
pub struct TerminalDisplay<W> {
    out: W,
    last: Option<FrameBuffer>,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Text form of a frame: one line per row, `#` for lit pixels.
pub fn frame_to_text(frame: &FrameBuffer) -> String {
    let screen = frame.screen();
    let mut text = String::with_capacity(screen.pixel_count() + screen.height as usize);
    for y in 0..screen.height as i32 {
        for x in 0..screen.width as i32 {
            text.push(if frame.get(x, y) { '#' } else { '.' });
        }
        text.push('\n');
    }
    text
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.last = None;
        Ok(())
    }

    fn present(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
        if self.last.as_ref() == Some(frame) {
            return Ok(());
        }

        let separator = "-".repeat(frame.screen().width as usize);
        writeln!(self.out, "{}{separator}", frame_to_text(frame))
            .and_then(|()| self.out.flush())
            .map_err(|e| DisplayError::Present(e.to_string()))?;

        self.last = Some(frame.clone());
        Ok(())
    }
}

// ── LED matrix ───────────────────────────────────────────────────────

#[cfg(feature = "hardware")]
pub use matrix::MatrixDisplay;

#[cfg(feature = "hardware")]
mod matrix {
    use super::{Display, DisplayError};
    use crate::ScreenConfig;
    use crate::render::FrameBuffer;
    use rpi_led_matrix::{LedCanvas, LedColor, LedMatrix, LedMatrixOptions, LedRuntimeOptions};

    /// Presents frames on an RGB LED matrix: lit pixels white, the rest off.
    pub struct MatrixDisplay {
        matrix: LedMatrix,
        canvas: Option<LedCanvas>,
    }

    impl MatrixDisplay {
        /// Bring up a panel sized to the screen.
        ///
        /// Fails if not running as root or if the GPIO block is unavailable.
        pub fn new(screen: ScreenConfig) -> Result<Self, DisplayError> {
            let mut options = LedMatrixOptions::new();
            options.set_rows(screen.height);
            options.set_cols(screen.width);
            options.set_hardware_mapping("adafruit-hat");
            options
                .set_pwm_bits(1)
                .map_err(|e| DisplayError::InitFailure(e.to_string()))?;

            let mut rt_options = LedRuntimeOptions::new();
            rt_options.set_gpio_slowdown(2);

            let matrix = LedMatrix::new(Some(options), Some(rt_options))
                .map_err(|e| DisplayError::InitFailure(e.to_string()))?;
            let canvas = matrix.offscreen_canvas();

            Ok(Self {
                matrix,
                canvas: Some(canvas),
            })
        }

        fn swap_in(&mut self, draw: impl FnOnce(&mut LedCanvas)) -> Result<(), DisplayError> {
            let mut canvas = self
                .canvas
                .take()
                .ok_or_else(|| DisplayError::Present("canvas lost".to_string()))?;
            canvas.clear();
            draw(&mut canvas);
            self.canvas = Some(self.matrix.swap(canvas));
            Ok(())
        }
    }

    impl Display for MatrixDisplay {
        fn clear(&mut self) -> Result<(), DisplayError> {
            self.swap_in(|_| {})
        }

        fn present(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
            let white = LedColor {
                red: 255,
                green: 255,
                blue: 255,
            };
            self.swap_in(|canvas| {
                for (x, y) in frame.lit_pixels() {
                    canvas.set(x as i32, y as i32, &white);
                }
            })
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
