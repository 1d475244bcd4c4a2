use bitflags::bitflags;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MoveKeys: u8 {
        const FORWARD  = 1 << 0;
        const BACKWARD = 1 << 1;
        const LEFT     = 1 << 2;
        const RIGHT    = 1 << 3;
        const UP       = 1 << 4;
        const DOWN     = 1 << 5;
    }
}

impl MoveKeys {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::KeyW => Some(Self::FORWARD),
            KeyCode::KeyS => Some(Self::BACKWARD),
            KeyCode::KeyA => Some(Self::LEFT),
            KeyCode::KeyD => Some(Self::RIGHT),
            KeyCode::KeyE => Some(Self::UP),
            KeyCode::KeyQ => Some(Self::DOWN),
            _ => None,
        }
    }
}

/// Debug toggles available without the GUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    CycleRenderMode,
    CycleBufferView,
    ToggleSsao,
}

impl DebugAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::F1 => Some(Self::CycleRenderMode),
            KeyCode::F2 => Some(Self::CycleBufferView),
            KeyCode::F3 => Some(Self::ToggleSsao),
            _ => None,
        }
    }
}

/// Keyboard and mouse state accumulated between frames.
#[derive(Debug, Default)]
pub struct InputState {
    held: MoveKeys,
    looking: bool,
    cursor: Option<(f64, f64)>,
    mouse_delta: (f32, f32),
}

impl InputState {
    pub fn key(&mut self, code: KeyCode, state: ElementState) {
        if let Some(flag) = MoveKeys::from_key(code) {
            self.held.set(flag, state == ElementState::Pressed);
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Right {
            self.looking = state == ElementState::Pressed;
            if !self.looking {
                self.cursor = None;
            }
        }
    }

    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        if self.looking {
            if let Some((px, py)) = self.cursor {
                self.mouse_delta.0 += (x - px) as f32;
                self.mouse_delta.1 += (y - py) as f32;
            }
        }
        self.cursor = Some((x, y));
    }

    pub fn held(&self) -> MoveKeys {
        self.held
    }

    /// Returns the accumulated look delta and resets it.
    pub fn take_mouse_delta(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.mouse_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_track_press_and_release() {
        let mut input = InputState::default();
        input.key(KeyCode::KeyW, ElementState::Pressed);
        input.key(KeyCode::KeyQ, ElementState::Pressed);
        assert_eq!(input.held(), MoveKeys::FORWARD | MoveKeys::DOWN);

        input.key(KeyCode::KeyW, ElementState::Released);
        assert_eq!(input.held(), MoveKeys::DOWN);
    }

    #[test]
    fn mouse_delta_only_accumulates_while_looking() {
        let mut input = InputState::default();
        input.cursor_moved(10.0, 10.0);
        input.cursor_moved(20.0, 30.0);
        assert_eq!(input.take_mouse_delta(), (0.0, 0.0));

        input.mouse_button(MouseButton::Right, ElementState::Pressed);
        input.cursor_moved(25.0, 28.0);
        assert_eq!(input.take_mouse_delta(), (5.0, -2.0));
        assert_eq!(input.take_mouse_delta(), (0.0, 0.0));
    }
}
