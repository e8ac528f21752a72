use winit::keyboard::KeyCode;

/// Movement keys currently held.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub ascend: bool,
    pub descend: bool,
}

impl InputState {
    /// Updates the held state for a movement key. Returns whether `key` is one.
    pub fn handle_key(&mut self, key: KeyCode, pressed: bool) -> bool {
        match key {
            KeyCode::KeyW => self.forward = pressed,
            KeyCode::KeyS => self.backward = pressed,
            KeyCode::KeyA => self.left = pressed,
            KeyCode::KeyD => self.right = pressed,
            KeyCode::Space => self.ascend = pressed,
            KeyCode::ControlLeft => self.descend = pressed,
            _ => return false,
        }
        true
    }
}

/// Everything the window layer knows about the user's input devices.
/// Owned by the application state and handed out explicitly.
#[derive(Debug, Default)]
pub struct InputContext {
    pub keys: InputState,
    mouse_captured: bool,
    pending_look: (f32, f32),
    pending_scroll: f32,
}

impl InputContext {
    pub fn mouse_captured(&self) -> bool {
        self.mouse_captured
    }

    pub fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        if !captured {
            self.pending_look = (0.0, 0.0);
            self.keys = InputState::default();
        }
    }

    /// Mouse motion only steers the camera while the cursor is captured.
    pub fn mouse_motion(&mut self, dx: f64, dy: f64) {
        if self.mouse_captured {
            self.pending_look.0 += dx as f32;
            self.pending_look.1 += dy as f32;
        }
    }

    pub fn scroll(&mut self, lines: f32) {
        self.pending_scroll += lines;
    }

    /// Look delta accumulated since the last call.
    pub fn take_look(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.pending_look)
    }

    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.pending_scroll)
    }
}
