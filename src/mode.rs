//! Session mode state machine.
//!
//! One exclusive interaction mode (Normal, Calibration, Targeting) plus an
//! orthogonal recording flag. Transitions report a typed outcome so the
//! session can apply side effects (registry clears, pending discards)
//! instead of the state machine reaching into other components.

use log::{info, warn};

/// The exclusive interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Calibration,
    Targeting,
}

/// Outcome of a mode toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// The mode changed.
    Switched { from: Mode, to: Mode },
    /// The transition was rejected; state is unchanged.
    Rejected,
}

/// Owns the current mode, the recording flag, and annotation visibility.
pub struct ModeController {
    mode: Mode,
    recording: bool,
    annotations_hidden: bool,
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: Mode::Normal,
            recording: false,
            annotations_hidden: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn annotations_hidden(&self) -> bool {
        self.annotations_hidden
    }

    fn switch(&mut self, to: Mode) -> Toggle {
        let from = self.mode;
        self.mode = to;
        match to {
            Mode::Normal => info!("Returning to normal mode"),
            Mode::Calibration => info!("Entering calibration mode..."),
            Mode::Targeting => info!("Entering targeting mode..."),
        }
        Toggle::Switched { from, to }
    }

    /// Toggle Calibration mode. Allowed from every mode; leaving Targeting
    /// this way drops its targets (applied by the caller).
    pub fn toggle_calibration(&mut self) -> Toggle {
        match self.mode {
            Mode::Calibration => {
                info!("Exiting calibration mode...");
                self.switch(Mode::Normal)
            }
            Mode::Normal | Mode::Targeting => self.switch(Mode::Calibration),
        }
    }

    /// Toggle Targeting mode. Entering requires a committed scale.
    pub fn toggle_targeting(&mut self, calibrated: bool) -> Toggle {
        match self.mode {
            Mode::Targeting => {
                info!("Exiting targeting mode...");
                self.switch(Mode::Normal)
            }
            Mode::Normal | Mode::Calibration if calibrated => self.switch(Mode::Targeting),
            Mode::Normal | Mode::Calibration => {
                warn!("Cannot enter targeting mode without calibration");
                Toggle::Rejected
            }
        }
    }

    /// Flip annotation visibility; only effective in Normal mode.
    ///
    /// Returns whether the flag was flipped.
    pub fn toggle_annotations(&mut self) -> bool {
        if self.mode != Mode::Normal {
            warn!("Cannot hide/show annotations in calibration and targeting modes");
            return false;
        }
        self.annotations_hidden = !self.annotations_hidden;
        if self.annotations_hidden {
            info!("Hiding annotations...");
        } else {
            info!("Showing annotations...");
        }
        true
    }

    /// Flip the recording flag; valid in every mode. Returns the new value.
    pub fn toggle_recording(&mut self) -> bool {
        self.recording = !self.recording;
        self.recording
    }

    /// Force the recording flag, used to revert a toggle whose recorder
    /// start failed.
    pub fn set_recording(&mut self, on: bool) {
        self.recording = on;
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}
