//! Pixel-to-millimeter calibration.
//!
//! The operator marks two points a known 10 mm apart on the image (the
//! depth ruler of the scanner); the vertical pixel separation between them
//! fixes the scale. The origin is placed with a secondary click, or an
//! auxiliary click for lazy placement (horizontal frame center, vertical
//! position from the click).

use image::RgbImage;
use log::{info, warn};
use serde::Deserialize;

use crate::geom::{MmPoint, PixelPoint};

/// Physical separation between the two calibration clicks, in millimeters.
pub const REFERENCE_SEPARATION_MM: f64 = 10.0;

/// Search radius when snapping a calibration click to a bright pixel.
const SNAP_RADIUS: i32 = 50;

/// Per-channel value at or above which a pixel counts as bright.
const SNAP_THRESHOLD: u8 = 225;

/// Vertical axis convention mapping image rows to physical depth.
///
/// `TopDown` means pixel y growing downward maps to increasing physical y
/// (depth grows away from the probe face); `BottomUp` negates physical y.
/// This is a configuration decision and must match the receiving peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageOrientation {
    TopDown,
    BottomUp,
}

impl ImageOrientation {
    fn sign(self) -> f64 {
        match self {
            ImageOrientation::TopDown => 1.0,
            ImageOrientation::BottomUp => -1.0,
        }
    }
}

impl Default for ImageOrientation {
    fn default() -> Self {
        ImageOrientation::TopDown
    }
}

/// Result of feeding a calibration point to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationUpdate {
    /// The point was stored; a second one is needed.
    Pending,
    /// A pair committed and the scale is now set.
    Committed { mm_per_px: f64 },
    /// The pair had no vertical separation; both points were discarded.
    RejectedZeroSpan,
}

/// Owns the calibration state: origin, in-progress point pair, and the
/// committed scale.
pub struct CalibrationEngine {
    origin: PixelPoint,
    pending: Vec<PixelPoint>,
    scale_mm_per_px: Option<f64>,
    reference_span: Option<(PixelPoint, PixelPoint)>,
    orientation: ImageOrientation,
}

impl CalibrationEngine {
    pub fn new(origin: PixelPoint, orientation: ImageOrientation) -> Self {
        Self {
            origin,
            pending: Vec::with_capacity(2),
            scale_mm_per_px: None,
            reference_span: None,
            orientation,
        }
    }

    pub fn origin(&self) -> PixelPoint {
        self.origin
    }

    pub fn pending(&self) -> &[PixelPoint] {
        &self.pending
    }

    /// Millimeters represented by one pixel, once a pair has committed.
    pub fn scale(&self) -> Option<f64> {
        self.scale_mm_per_px
    }

    /// The last committed calibration pair, kept so the overlay can keep
    /// drawing the reference span after the pending points are cleared.
    pub fn reference_span(&self) -> Option<(PixelPoint, PixelPoint)> {
        self.reference_span
    }

    pub fn is_calibrated(&self) -> bool {
        self.scale_mm_per_px.is_some()
    }

    /// Discard any in-progress point pair.
    ///
    /// Called when Calibration mode is entered or left mid-pair. A
    /// previously committed origin and scale survive; recalibration needs
    /// two fresh clicks.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Store a calibration point; the second point of a pair commits the
    /// scale from the vertical separation between the two.
    pub fn push_point(&mut self, p: PixelPoint) -> CalibrationUpdate {
        self.pending.push(p);
        info!(
            "Calibration point {} selected at ({}, {})",
            self.pending.len(),
            p.x,
            p.y
        );
        if self.pending.len() < 2 {
            return CalibrationUpdate::Pending;
        }

        let (p1, p2) = (self.pending[0], self.pending[1]);
        self.pending.clear();

        let dy = (p2.y - p1.y).abs();
        if dy == 0 {
            warn!("Calibration points have no vertical separation; please reselect");
            return CalibrationUpdate::RejectedZeroSpan;
        }

        let mm_per_px = REFERENCE_SEPARATION_MM / f64::from(dy);
        self.scale_mm_per_px = Some(mm_per_px);
        self.reference_span = Some((p1, p2));
        info!("Calculated pixel to mm ratio: {}", mm_per_px);
        CalibrationUpdate::Committed { mm_per_px }
    }

    /// Place the origin exactly at `p`.
    pub fn set_origin(&mut self, p: PixelPoint) {
        self.origin = p;
        info!("Frame origin selected at ({}, {})", p.x, p.y);
    }

    /// Lazy origin placement: horizontal center of the frame, vertical
    /// position taken from the click.
    pub fn set_lazy_origin(&mut self, p: PixelPoint, frame_width: u32) {
        self.origin = PixelPoint::new(frame_width as i32 / 2, p.y);
        info!(
            "Frame origin selected at ({}, {})",
            self.origin.x, self.origin.y
        );
    }

    /// Map a pixel position to physical millimeters relative to the origin.
    ///
    /// Returns `None` until a calibration pair has committed.
    pub fn transform(&self, p: PixelPoint) -> Option<MmPoint> {
        let scale = self.scale_mm_per_px?;
        let x = f64::from(p.x - self.origin.x) * scale;
        let y = f64::from(p.y - self.origin.y) * scale * self.orientation.sign();
        Some(MmPoint::new(x, y))
    }
}

/// Snap a click to the nearest bright pixel within a fixed radius.
///
/// Calibration clicks aim at ruler marks, which render close to white; the
/// snap forgives slightly-off clicks. Falls back to the click itself when
/// nothing bright is in range.
pub fn snap_to_bright(frame: &RgbImage, p: PixelPoint) -> PixelPoint {
    let (w, h) = (frame.width() as i32, frame.height() as i32);
    let x0 = (p.x - SNAP_RADIUS).max(0);
    let x1 = (p.x + SNAP_RADIUS).min(w);
    let y0 = (p.y - SNAP_RADIUS).max(0);
    let y1 = (p.y + SNAP_RADIUS).min(h);

    let mut best = p;
    let mut best_d2 = i64::MAX;
    for y in y0..y1 {
        for x in x0..x1 {
            let px = frame.get_pixel(x as u32, y as u32);
            if px.0.iter().all(|&c| c >= SNAP_THRESHOLD) {
                let candidate = PixelPoint::new(x, y);
                let d2 = candidate.dist2(p);
                if d2 < best_d2 {
                    best_d2 = d2;
                    best = candidate;
                }
            }
        }
    }
    best
}
