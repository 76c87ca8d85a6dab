//! Event dispatch tying the session components together.
//!
//! The session owns every piece of interactive state and applies the
//! cross-component side effects the mode machine reports (registry clears,
//! pending discards, recorder toggles). Keeping it free of any window or
//! capture handle makes the whole machine testable with plain events.

use image::RgbImage;
use log::{error, info, warn};

use crate::calibration::{self, CalibrationEngine};
use crate::events::{ClickButton, ClickEvent, KeyCommand, SessionEvent};
use crate::geom::PixelPoint;
use crate::mode::{Mode, ModeController, Toggle};
use crate::overlay::{self, Annotation};
use crate::recorder::Recorder;
use crate::targets::TargetRegistry;
use crate::transmit::TargetSink;

/// What the caller should do after an event is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Quit,
}

pub struct Session {
    modes: ModeController,
    calibration: CalibrationEngine,
    targets: TargetRegistry,
    sink: Box<dyn TargetSink>,
    recorder: Recorder,
    frame_width: u32,
}

impl Session {
    pub fn new(
        calibration: CalibrationEngine,
        recorder: Recorder,
        sink: Box<dyn TargetSink>,
        frame_width: u32,
    ) -> Self {
        Self {
            modes: ModeController::new(),
            calibration,
            targets: TargetRegistry::new(),
            sink,
            recorder,
            frame_width,
        }
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn is_recording(&self) -> bool {
        self.modes.is_recording()
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    /// Forward an acquired frame to the recorder while the flag is on.
    ///
    /// A failed write stops the session and reverts the flag rather than
    /// erroring every following frame.
    pub fn on_frame(&mut self, frame: &RgbImage) {
        if !self.modes.is_recording() {
            return;
        }
        if let Err(e) = self.recorder.write_frame(frame) {
            warn!("Recording failed, stopping it: {}", e);
            self.recorder.stop();
            self.modes.set_recording(false);
        }
    }

    /// Annotation set for the current state.
    pub fn annotations(&self, cursor: Option<PixelPoint>) -> Vec<Annotation> {
        overlay::compose(
            self.modes.mode(),
            self.modes.is_recording(),
            self.modes.annotations_hidden(),
            &self.calibration,
            &self.targets,
            cursor,
        )
    }

    /// Dispatch one input event against the currently displayed frame.
    pub fn handle_event(&mut self, event: SessionEvent, frame: &RgbImage) -> Disposition {
        match event {
            SessionEvent::Key(command) => self.handle_key(command),
            SessionEvent::Click(click) => {
                self.handle_click(click, frame);
                Disposition::Continue
            }
        }
    }

    /// Stop whatever is still running; part of the ordered shutdown.
    pub fn shutdown(&mut self) {
        if self.recorder.is_active() {
            self.recorder.stop();
            self.modes.set_recording(false);
        }
    }

    fn handle_key(&mut self, command: KeyCommand) -> Disposition {
        match command {
            KeyCommand::ToggleCalibration => {
                if let Toggle::Switched { from, to } = self.modes.toggle_calibration() {
                    self.apply_switch(from, to);
                }
            }
            KeyCommand::ToggleTargeting => {
                let calibrated = self.calibration.is_calibrated();
                if let Toggle::Switched { from, to } = self.modes.toggle_targeting(calibrated) {
                    self.apply_switch(from, to);
                }
            }
            KeyCommand::ToggleAnnotations => {
                self.modes.toggle_annotations();
            }
            KeyCommand::ToggleRecording => self.toggle_recording(),
            KeyCommand::Quit => {
                info!("Quitting...");
                return Disposition::Quit;
            }
        }
        Disposition::Continue
    }

    /// Side effects of a mode switch: targets live only inside Targeting,
    /// and an in-progress calibration pair does not survive leaving or
    /// re-entering Calibration.
    fn apply_switch(&mut self, from: Mode, to: Mode) {
        if from == Mode::Targeting || to == Mode::Targeting {
            self.targets.clear();
        }
        if from == Mode::Calibration || to == Mode::Calibration {
            self.calibration.discard_pending();
        }
    }

    fn toggle_recording(&mut self) {
        if self.modes.toggle_recording() {
            if let Err(e) = self.recorder.start() {
                error!("Unable to start recording: {}", e);
                self.modes.set_recording(false);
            }
        } else {
            self.recorder.stop();
        }
    }

    fn handle_click(&mut self, click: ClickEvent, frame: &RgbImage) {
        match self.modes.mode() {
            Mode::Normal => {}
            Mode::Calibration => {
                let p = calibration::snap_to_bright(frame, click.position);
                match click.button {
                    ClickButton::Primary => {
                        self.calibration.push_point(p);
                    }
                    ClickButton::Secondary => self.calibration.set_origin(p),
                    ClickButton::Auxiliary => {
                        self.calibration.set_lazy_origin(p, self.frame_width)
                    }
                }
            }
            Mode::Targeting => match click.button {
                ClickButton::Primary => {
                    self.targets.select(click.position, &self.calibration);
                }
                ClickButton::Secondary => {
                    self.targets.deselect(click.position);
                }
                ClickButton::Auxiliary => {
                    self.targets.send_nearest(click.position, self.sink.as_mut());
                }
            },
        }
    }
}
