//! Typed input events for the session.
//!
//! Raw window input is turned into these values at the edge; everything
//! past that point dispatches on plain data, which keeps the transition
//! logic unit-testable.

use crate::geom::PixelPoint;

/// Discrete key commands the session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    ToggleRecording,
    ToggleCalibration,
    ToggleTargeting,
    ToggleAnnotations,
    Quit,
}

/// Pointer buttons, after modifier aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickButton {
    Primary,
    Secondary,
    Auxiliary,
}

/// A pointer click at a pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub button: ClickButton,
    pub position: PixelPoint,
}

impl ClickEvent {
    /// Build a click, aliasing Ctrl+primary to the auxiliary button for
    /// mice without a usable middle button.
    pub fn normalized(button: ClickButton, ctrl_held: bool, position: PixelPoint) -> Self {
        let button = match button {
            ClickButton::Primary if ctrl_held => ClickButton::Auxiliary,
            other => other,
        };
        Self { button, position }
    }
}

/// Anything the input surface can hand to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Key(KeyCommand),
    Click(ClickEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrl_primary_aliases_auxiliary() {
        let click = ClickEvent::normalized(ClickButton::Primary, true, PixelPoint::new(1, 2));
        assert_eq!(click.button, ClickButton::Auxiliary);
        assert_eq!(click.position, PixelPoint::new(1, 2));
    }

    #[test]
    fn test_primary_without_ctrl_stays_primary() {
        let click = ClickEvent::normalized(ClickButton::Primary, false, PixelPoint::new(0, 0));
        assert_eq!(click.button, ClickButton::Primary);
    }

    #[test]
    fn test_ctrl_does_not_alias_other_buttons() {
        let click = ClickEvent::normalized(ClickButton::Secondary, true, PixelPoint::new(0, 0));
        assert_eq!(click.button, ClickButton::Secondary);
    }
}
