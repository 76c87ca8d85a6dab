//! Overlay composition: session state in, annotation primitives out.
//!
//! The compositor is a pure function; it never touches pixels. The display
//! side rasterizes the primitives and maps their kinds to colors.

use crate::calibration::CalibrationEngine;
use crate::geom::PixelPoint;
use crate::mode::Mode;
use crate::targets::{TargetRegistry, TargetStatus};

/// Crosshair styling, one per interactive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrosshairStyle {
    Calibration,
    Targeting,
}

/// Marker styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Origin,
    PendingCalibration,
    ReferenceEndpoint,
    SelectedTarget,
    SentTarget,
}

/// A single drawable primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// Full-frame crosshair centered on the cursor.
    Crosshair { at: PixelPoint, style: CrosshairStyle },
    Marker { at: PixelPoint, kind: MarkerKind },
    /// The committed 10 mm reference span.
    ReferenceLine { from: PixelPoint, to: PixelPoint },
    /// Indicator dot shown while recording.
    RecordingBadge,
}

/// Derive the annotation set for the current state.
///
/// `annotations_hidden` suppresses the persistent calibration annotations
/// (origin marker and reference span); mode-specific annotations and the
/// recording badge are unaffected.
pub fn compose(
    mode: Mode,
    recording: bool,
    annotations_hidden: bool,
    cal: &CalibrationEngine,
    targets: &TargetRegistry,
    cursor: Option<PixelPoint>,
) -> Vec<Annotation> {
    let mut out = Vec::new();

    if recording {
        out.push(Annotation::RecordingBadge);
    }

    if cal.is_calibrated() && !annotations_hidden {
        out.push(Annotation::Marker { at: cal.origin(), kind: MarkerKind::Origin });
        if let Some((p1, p2)) = cal.reference_span() {
            // The scale comes from the vertical separation only, so the span
            // renders as a vertical tick at the first point's column.
            let top = p1;
            let bottom = PixelPoint::new(p1.x, p2.y);
            out.push(Annotation::ReferenceLine { from: top, to: bottom });
            out.push(Annotation::Marker { at: top, kind: MarkerKind::ReferenceEndpoint });
            out.push(Annotation::Marker { at: bottom, kind: MarkerKind::ReferenceEndpoint });
        }
    }

    match mode {
        Mode::Normal => {}
        Mode::Calibration => {
            if !cal.is_calibrated() {
                out.push(Annotation::Marker { at: cal.origin(), kind: MarkerKind::Origin });
            }
            for &p in cal.pending() {
                out.push(Annotation::Marker { at: p, kind: MarkerKind::PendingCalibration });
            }
            if let Some(at) = cursor {
                out.push(Annotation::Crosshair { at, style: CrosshairStyle::Calibration });
            }
        }
        Mode::Targeting => {
            for t in targets.targets() {
                let kind = match t.status {
                    TargetStatus::Selected => MarkerKind::SelectedTarget,
                    TargetStatus::Sent => MarkerKind::SentTarget,
                };
                out.push(Annotation::Marker { at: t.pixel, kind });
            }
            if let Some(at) = cursor {
                out.push(Annotation::Crosshair { at, style: CrosshairStyle::Targeting });
            }
        }
    }

    out
}
