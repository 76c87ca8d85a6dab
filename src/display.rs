//! Display window, overlay rasterization, and input polling.
//!
//! The outer surface around the session: presents frames in a window,
//! burns annotation primitives onto a copy of the frame, and turns raw
//! window input into typed session events.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use thiserror::Error;

use crate::events::{ClickButton, ClickEvent, KeyCommand, SessionEvent};
use crate::geom::PixelPoint;
use crate::overlay::{Annotation, CrosshairStyle, MarkerKind};

const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const CYAN: Rgb<u8> = Rgb([0, 255, 255]);

const MARKER_RADIUS: i32 = 5;
const BADGE_RADIUS: i32 = 10;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to open display window: {0}")]
    WindowFailed(minifb::Error),
    #[error("failed to present frame: {0}")]
    PresentFailed(minifb::Error),
}

/// The capture window plus input edge-detection state.
pub struct DisplayWindow {
    window: Window,
    buffer: Vec<u32>,
    width: u32,
    height: u32,
    prev_buttons: [bool; 3],
}

impl DisplayWindow {
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self, DisplayError> {
        let window = Window::new(
            title,
            width as usize,
            height as usize,
            WindowOptions::default(),
        )
        .map_err(DisplayError::WindowFailed)?;

        Ok(Self {
            window,
            buffer: Vec::with_capacity(width as usize * height as usize),
            width,
            height,
            prev_buttons: [false; 3],
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// Current cursor position, if it is over the window.
    pub fn cursor(&self) -> Option<PixelPoint> {
        self.window
            .get_mouse_pos(MouseMode::Discard)
            .map(|(x, y)| PixelPoint::new(x as i32, y as i32))
    }

    /// Rasterize the annotations onto a copy of the frame and present it.
    pub fn present(
        &mut self,
        frame: &RgbImage,
        annotations: &[Annotation],
    ) -> Result<(), DisplayError> {
        let mut composed = frame.clone();
        rasterize(&mut composed, annotations);

        self.buffer.clear();
        self.buffer.extend(composed.pixels().map(|p| {
            let [r, g, b] = p.0;
            (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
        }));

        self.window
            .update_with_buffer(&self.buffer, self.width as usize, self.height as usize)
            .map_err(DisplayError::PresentFailed)
    }

    /// Drain input since the last poll as typed session events.
    ///
    /// Keys report on press only; mouse buttons are edge-detected against
    /// the previous poll. Ctrl+left aliases the middle button.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        for (key, command) in [
            (Key::R, KeyCommand::ToggleRecording),
            (Key::C, KeyCommand::ToggleCalibration),
            (Key::T, KeyCommand::ToggleTargeting),
            (Key::H, KeyCommand::ToggleAnnotations),
            (Key::Q, KeyCommand::Quit),
        ] {
            if self.window.is_key_pressed(key, KeyRepeat::No) {
                events.push(SessionEvent::Key(command));
            }
        }

        let ctrl_held = self.window.is_key_down(Key::LeftCtrl)
            || self.window.is_key_down(Key::RightCtrl);
        let cursor = self.cursor();

        let buttons = [
            (MouseButton::Left, ClickButton::Primary),
            (MouseButton::Right, ClickButton::Secondary),
            (MouseButton::Middle, ClickButton::Auxiliary),
        ];
        for (i, (mouse_button, click_button)) in buttons.into_iter().enumerate() {
            let down = self.window.get_mouse_down(mouse_button);
            if down && !self.prev_buttons[i] {
                if let Some(position) = cursor {
                    events.push(SessionEvent::Click(ClickEvent::normalized(
                        click_button,
                        ctrl_held,
                        position,
                    )));
                }
            }
            self.prev_buttons[i] = down;
        }

        events
    }
}

fn style_color(style: CrosshairStyle) -> Rgb<u8> {
    match style {
        CrosshairStyle::Calibration => GREEN,
        CrosshairStyle::Targeting => CYAN,
    }
}

fn marker_color(kind: MarkerKind) -> Rgb<u8> {
    match kind {
        MarkerKind::Origin | MarkerKind::ReferenceEndpoint => YELLOW,
        MarkerKind::PendingCalibration | MarkerKind::SelectedTarget => RED,
        MarkerKind::SentTarget => GREEN,
    }
}

/// Burn annotation primitives into the frame.
pub fn rasterize(frame: &mut RgbImage, annotations: &[Annotation]) {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    for annotation in annotations {
        match *annotation {
            Annotation::Crosshair { at, style } => {
                let color = style_color(style);
                let x = at.x as f32;
                let y = at.y as f32;
                draw_line_segment_mut(frame, (x, 0.0), (x, h), color);
                draw_line_segment_mut(frame, (0.0, y), (w, y), color);
            }
            Annotation::Marker { at, kind } => {
                draw_filled_circle_mut(frame, (at.x, at.y), MARKER_RADIUS, marker_color(kind));
            }
            Annotation::ReferenceLine { from, to } => {
                draw_line_segment_mut(
                    frame,
                    (from.x as f32, from.y as f32),
                    (to.x as f32, to.y as f32),
                    YELLOW,
                );
            }
            Annotation::RecordingBadge => {
                let x = frame.width() as i32 - 30;
                draw_filled_circle_mut(frame, (x, 30), BADGE_RADIUS, RED);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rasterize_marker_colors_center_pixel() {
        let mut frame = RgbImage::new(64, 64);
        rasterize(
            &mut frame,
            &[Annotation::Marker { at: PixelPoint::new(32, 32), kind: MarkerKind::Origin }],
        );
        assert_eq!(*frame.get_pixel(32, 32), YELLOW);
    }

    #[test]
    fn test_rasterize_crosshair_spans_frame() {
        let mut frame = RgbImage::new(64, 64);
        rasterize(
            &mut frame,
            &[Annotation::Crosshair {
                at: PixelPoint::new(10, 20),
                style: CrosshairStyle::Targeting,
            }],
        );
        assert_eq!(*frame.get_pixel(10, 0), CYAN);
        assert_eq!(*frame.get_pixel(10, 63), CYAN);
        assert_eq!(*frame.get_pixel(0, 20), CYAN);
        assert_eq!(*frame.get_pixel(63, 20), CYAN);
    }

    #[test]
    fn test_rasterize_badge_sits_top_right() {
        let mut frame = RgbImage::new(100, 100);
        rasterize(&mut frame, &[Annotation::RecordingBadge]);
        assert_eq!(*frame.get_pixel(70, 30), RED);
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rasterize_marker_out_of_bounds_does_not_panic() {
        let mut frame = RgbImage::new(16, 16);
        rasterize(
            &mut frame,
            &[Annotation::Marker {
                at: PixelPoint::new(-3, 100),
                kind: MarkerKind::SelectedTarget,
            }],
        );
    }

    #[test]
    fn test_selected_and_sent_markers_use_distinct_colors() {
        assert_ne!(
            marker_color(MarkerKind::SelectedTarget),
            marker_color(MarkerKind::SentTarget)
        );
    }
}
