//! Operator-selected targets and their lifecycle.

use log::{info, warn};

use crate::calibration::CalibrationEngine;
use crate::geom::{MmPoint, PixelPoint};
use crate::transmit::TargetSink;

/// Maximum pixel distance for a deselect/send click to match a target.
pub const PROXIMITY_TOLERANCE_PX: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Selected,
    Sent,
}

/// A selected point, frozen in both coordinate spaces.
///
/// The physical position is computed from the transform active at selection
/// time and never recomputed; only the status can change, and only
/// Selected -> Sent.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub pixel: PixelPoint,
    pub mm: MmPoint,
    pub status: TargetStatus,
}

/// Outcome of a send-nearest request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SendOutcome {
    /// The nearest target was transmitted and marked Sent.
    Sent(MmPoint),
    /// A target matched but the local send failed; it stays Selected.
    Failed,
    /// Nothing selectable within tolerance.
    NoMatch,
}

/// Ordered set of targets; insertion order is selection order.
#[derive(Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Select a new target at `p`, freezing its physical position from the
    /// current transform. Returns `None` (and selects nothing) if no
    /// calibration is committed.
    pub fn select(&mut self, p: PixelPoint, cal: &CalibrationEngine) -> Option<MmPoint> {
        let Some(mm) = cal.transform(p) else {
            warn!("Cannot select targets without calibration");
            return None;
        };
        self.targets.push(Target { pixel: p, mm, status: TargetStatus::Selected });
        info!("Target selected at ({:.3} mm, {:.3} mm)", mm.x, mm.y);
        Some(mm)
    }

    /// Remove the Selected target nearest to `p` within tolerance.
    ///
    /// Sent targets are not removable. Nothing in range is a silent no-op.
    pub fn deselect(&mut self, p: PixelPoint) -> Option<Target> {
        let idx = self.nearest_selected(p)?;
        let removed = self.targets.remove(idx);
        info!(
            "Target removed at ({:.3} mm, {:.3} mm)",
            removed.mm.x,
            removed.mm.y
        );
        Some(removed)
    }

    /// Transmit the Selected target nearest to `p` within tolerance.
    ///
    /// Marked Sent only when the local send succeeds; on failure it stays
    /// Selected so the operator can retry.
    pub fn send_nearest(&mut self, p: PixelPoint, sink: &mut dyn TargetSink) -> SendOutcome {
        let Some(idx) = self.nearest_selected(p) else {
            return SendOutcome::NoMatch;
        };
        let mm = self.targets[idx].mm;
        match sink.send(mm) {
            Ok(()) => {
                self.targets[idx].status = TargetStatus::Sent;
                SendOutcome::Sent(mm)
            }
            Err(e) => {
                warn!("Failed to send target: {}; it remains selected", e);
                SendOutcome::Failed
            }
        }
    }

    /// Drop every target; Targeting mode entry and exit both do this.
    pub fn clear(&mut self) {
        self.targets.clear();
    }

    /// Index of the nearest Selected target within tolerance of `p`.
    ///
    /// Ties go to the earliest-selected target: the scan keeps the first
    /// minimum it sees.
    fn nearest_selected(&self, p: PixelPoint) -> Option<usize> {
        let tolerance2 = i64::from(PROXIMITY_TOLERANCE_PX) * i64::from(PROXIMITY_TOLERANCE_PX);
        let mut best: Option<(usize, i64)> = None;
        for (i, t) in self.targets.iter().enumerate() {
            if t.status != TargetStatus::Selected {
                continue;
            }
            let d2 = t.pixel.dist2(p);
            if d2 <= tolerance2 && best.map_or(true, |(_, bd2)| d2 < bd2) {
                best = Some((i, d2));
            }
        }
        best.map(|(i, _)| i)
    }
}
