//! Frame buffer and walking-figure drawing.
//!
//! Rendering is a pure function of [`AnimationState`]: the same state always
//! yields the same frame. Drawing goes through `embedded-graphics`, so the
//! figure can be drawn onto [`FrameBuffer`] or any other monochrome
//! `DrawTarget`.

use crate::ScreenConfig;
use crate::animation::{AnimationState, LegFrame};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle};
use std::convert::Infallible;

// ── Frame buffer ─────────────────────────────────────────────────────

/// One bit per pixel, row-major. Out-of-bounds pixels are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    screen: ScreenConfig,
    pixels: Vec<bool>,
}

impl FrameBuffer {
    /// A blank frame sized to the screen.
    pub fn new(screen: ScreenConfig) -> Self {
        Self {
            screen,
            pixels: vec![false; screen.pixel_count()],
        }
    }

    pub fn screen(&self) -> ScreenConfig {
        self.screen
    }

    /// Turn every pixel off.
    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    /// Whether the pixel at `(x, y)` is lit. Off-screen reads are unlit.
    pub fn get(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some_and(|i| self.pixels[i])
    }

    pub fn is_blank(&self) -> bool {
        !self.pixels.contains(&true)
    }

    pub fn lit_count(&self) -> usize {
        self.pixels.iter().filter(|p| **p).count()
    }

    /// Coordinates of every lit pixel, row by row.
    pub fn lit_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.screen.width as usize;
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, lit)| **lit)
            .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.screen.width || y >= self.screen.height {
            return None;
        }
        Some((y * self.screen.width + x) as usize)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.screen.width, self.screen.height)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(i) = self.index(point.x, point.y) {
                self.pixels[i] = color.is_on();
            }
        }
        Ok(())
    }
}

// ── Figure geometry ──────────────────────────────────────────────────

/// Vertical centre of the head.
const HEAD_Y: i32 = 10;
const HEAD_RADIUS: u32 = 3;

/// Torso and arms, as offsets from `(position, 0)`.
const BODY: [(Point, Point); 3] = [
    (Point::new(0, 13), Point::new(0, 22)),
    (Point::new(0, 15), Point::new(-3, 18)),
    (Point::new(0, 15), Point::new(3, 18)),
];

const LEGS_NEUTRAL: [(Point, Point); 2] = [
    (Point::new(0, 22), Point::new(-2, 28)),
    (Point::new(0, 22), Point::new(2, 28)),
];

const LEGS_WALKING: [(Point, Point); 2] = [
    (Point::new(0, 22), Point::new(-3, 28)),
    (Point::new(0, 22), Point::new(1, 28)),
];

fn legs(frame: LegFrame) -> &'static [(Point, Point); 2] {
    match frame {
        LegFrame::Neutral => &LEGS_NEUTRAL,
        LegFrame::Walking => &LEGS_WALKING,
    }
}

// ── Rendering ────────────────────────────────────────────────────────

/// Render the current animation state into a fresh frame.
///
/// An inactive state yields a blank frame.
pub fn render(state: &AnimationState, screen: ScreenConfig) -> FrameBuffer {
    let mut frame = FrameBuffer::new(screen);
    render_into(state, &mut frame).unwrap_or_else(|never| match never {});
    frame
}

/// Draw the figure onto any monochrome target. Draws nothing at all while
/// the state is inactive.
pub fn render_into<D>(state: &AnimationState, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    if !state.active {
        return Ok(());
    }
    draw_figure(target, state.position, state.leg_frame)
}

fn draw_figure<D>(target: &mut D, x: i32, frame: LegFrame) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let anchor = Point::new(x, 0);

    Circle::with_center(Point::new(x, HEAD_Y), HEAD_RADIUS * 2 + 1)
        .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
        .draw(target)?;

    let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 1);
    for (from, to) in BODY.iter().chain(legs(frame).iter()) {
        Line::new(anchor + *from, anchor + *to)
            .into_styled(stroke)
            .draw(target)?;
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn screen() -> ScreenConfig {
        ScreenConfig::default()
    }

    fn walking_at(position: i32, leg_frame: LegFrame) -> AnimationState {
        AnimationState {
            position,
            leg_frame,
            active: true,
        }
    }

    /// Counts how often drawing reaches the target.
    #[derive(Default)]
    struct CountingTarget {
        calls: usize,
        pixels: usize,
    }

    impl OriginDimensions for CountingTarget {
        fn size(&self) -> Size {
            Size::new(128, 32)
        }
    }

    impl DrawTarget for CountingTarget {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            self.calls += 1;
            self.pixels += pixels.into_iter().count();
            Ok(())
        }

        fn fill_solid(
            &mut self,
            area: &embedded_graphics::primitives::Rectangle,
            _color: Self::Color,
        ) -> Result<(), Self::Error> {
            self.calls += 1;
            self.pixels += area.size.width as usize * area.size.height as usize;
            Ok(())
        }
    }

    #[test]
    fn new_frame_is_blank() {
        let frame = FrameBuffer::new(screen());
        assert!(frame.is_blank());
        assert_eq!(frame.size(), Size::new(128, 32));
    }

    #[test]
    fn inactive_state_renders_blank_frame() {
        let state = AnimationState {
            position: 40,
            leg_frame: LegFrame::Walking,
            active: false,
        };
        assert!(render(&state, screen()).is_blank());
    }

    #[test]
    fn inactive_state_invokes_no_primitives() {
        let mut target = CountingTarget::default();
        render_into(&AnimationState::new(), &mut target).unwrap();
        assert_eq!(target.calls, 0);
        assert_eq!(target.pixels, 0);
    }

    #[test]
    fn active_state_draws_head_torso_and_arms() {
        let frame = render(&walking_at(40, LegFrame::Neutral), screen());

        assert!(frame.get(40, 10), "head centre");
        assert!(frame.get(43, 10), "head edge");
        assert!(!frame.get(44, 10), "outside head");
        assert!(frame.get(40, 13) && frame.get(40, 22), "torso ends");
        assert!(frame.get(37, 18) && frame.get(43, 18), "hands");
    }

    #[rstest]
    #[case(LegFrame::Neutral, (38, 28), (42, 28))]
    #[case(LegFrame::Walking, (37, 28), (41, 28))]
    fn leg_frame_selects_stance(
        #[case] leg_frame: LegFrame,
        #[case] left: (i32, i32),
        #[case] right: (i32, i32),
    ) {
        let frame = render(&walking_at(40, leg_frame), screen());
        assert!(frame.get(left.0, left.1));
        assert!(frame.get(right.0, right.1));
    }

    #[test]
    fn stances_differ() {
        let neutral = render(&walking_at(40, LegFrame::Neutral), screen());
        let walking = render(&walking_at(40, LegFrame::Walking), screen());
        assert_ne!(neutral, walking);
    }

    #[test]
    fn render_is_deterministic() {
        let state = walking_at(12, LegFrame::Walking);
        assert_eq!(render(&state, screen()), render(&state, screen()));
    }

    #[test]
    fn figure_moves_with_position() {
        let frame = render(&walking_at(100, LegFrame::Neutral), screen());
        assert!(frame.get(100, 10));
        assert!(!frame.get(40, 10));
    }

    #[rstest]
    #[case(-10)]
    #[case(200)]
    fn off_screen_figure_is_clipped(#[case] position: i32) {
        let frame = render(&walking_at(position, LegFrame::Neutral), screen());
        assert!(frame.is_blank());
    }

    #[test]
    fn figure_at_left_edge_is_partially_visible() {
        let frame = render(&walking_at(0, LegFrame::Neutral), screen());
        assert!(frame.get(0, 10));
        assert!(frame.get(2, 28));
        assert!(!frame.is_blank());
    }

    #[test]
    fn clear_blanks_frame() {
        let mut frame = render(&walking_at(40, LegFrame::Neutral), screen());
        frame.clear();
        assert!(frame.is_blank());
    }

    #[test]
    fn lit_pixels_match_lit_count() {
        let frame = render(&walking_at(64, LegFrame::Walking), screen());
        assert_eq!(frame.lit_pixels().count(), frame.lit_count());
        assert!(frame.lit_pixels().all(|(x, y)| frame.get(x as i32, y as i32)));
    }
}
