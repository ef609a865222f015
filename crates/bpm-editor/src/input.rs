//! Input abstraction layer.
//!
//! Normalizes host pointer, wheel and keyboard events into a unified
//! `InputEvent` enum consumed by the interaction state machine.
//! Pointer coordinates are canvas-relative screen pixels.

/// Keyboard modifier state at the time of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    /// Platform command key: ctrl, or ⌘ on macOS.
    pub fn cmd(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Which pointer button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

impl PointerButton {
    /// Map a DOM `MouseEvent.button` index.
    pub fn from_index(index: u16) -> Self {
        match index {
            1 => Self::Middle,
            2 => Self::Secondary,
            _ => Self::Primary,
        }
    }
}

/// A normalized input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer pressed. `time_ms` is a monotonic host timestamp used for
    /// double-click detection.
    PointerDown {
        x: f32,
        y: f32,
        button: PointerButton,
        modifiers: Modifiers,
        time_ms: f64,
    },

    /// Pointer moved.
    PointerMove {
        x: f32,
        y: f32,
        modifiers: Modifiers,
    },

    /// Pointer released.
    PointerUp {
        x: f32,
        y: f32,
        modifiers: Modifiers,
    },

    /// Mouse wheel. Positive `delta_y` scrolls down (zoom out).
    Wheel {
        x: f32,
        y: f32,
        delta_y: f32,
        modifiers: Modifiers,
    },

    /// Key pressed. `in_text_input` is set when focus is inside an input
    /// or textarea, where editing keys must not reach the canvas.
    Key {
        key: String,
        modifiers: Modifiers,
        in_text_input: bool,
    },
}

impl InputEvent {
    pub fn from_pointer_down(
        x: f32,
        y: f32,
        button: PointerButton,
        modifiers: Modifiers,
        time_ms: f64,
    ) -> Self {
        Self::PointerDown {
            x,
            y,
            button,
            modifiers,
            time_ms,
        }
    }

    pub fn from_pointer_move(x: f32, y: f32, modifiers: Modifiers) -> Self {
        Self::PointerMove { x, y, modifiers }
    }

    pub fn from_pointer_up(x: f32, y: f32, modifiers: Modifiers) -> Self {
        Self::PointerUp { x, y, modifiers }
    }

    pub fn from_wheel(x: f32, y: f32, delta_y: f32, modifiers: Modifiers) -> Self {
        Self::Wheel {
            x,
            y,
            delta_y,
            modifiers,
        }
    }

    pub fn from_key(key: &str, modifiers: Modifiers, in_text_input: bool) -> Self {
        Self::Key {
            key: key.to_string(),
            modifiers,
            in_text_input,
        }
    }
}
