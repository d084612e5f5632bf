use serde::{Deserialize, Serialize};

/// Mouse buttons the map reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Input events forwarded by the windowing host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Button pressed at a screen position
    Press {
        button: MouseButton,
        x: f64,
        y: f64,
    },
    /// Button released
    Release { button: MouseButton },
    /// Pointer moved to a screen position
    Move { x: f64, y: f64 },
    /// Scroll wheel; positive delta zooms in, anchored at the pointer
    Wheel { delta: f64, x: f64, y: f64 },
}

impl InputEvent {
    /// Gets the screen position associated with this event, if any
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            InputEvent::Press { x, y, .. } => Some((*x, *y)),
            InputEvent::Move { x, y } => Some((*x, *y)),
            InputEvent::Wheel { x, y, .. } => Some((*x, *y)),
            InputEvent::Release { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_event_position() {
        let press = InputEvent::Press {
            button: MouseButton::Left,
            x: 100.0,
            y: 200.0,
        };
        assert_eq!(press.position(), Some((100.0, 200.0)));

        let release = InputEvent::Release {
            button: MouseButton::Left,
        };
        assert_eq!(release.position(), None);
    }
}
