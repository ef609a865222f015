//! Canvas keyboard bindings. `key` is the DOM `KeyboardEvent.key` value.

use crate::input::Modifiers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    /// Delete every selected node and edge.
    Delete,
    /// Abandon an in-progress connection, otherwise clear the selection.
    Cancel,
    ZoomIn,
    ZoomOut,
    /// Zoom 1, no pan.
    ResetView,
}

/// Key binding table. Ctrl and ⌘ are interchangeable.
pub struct ShortcutMap;

impl ShortcutMap {
    pub fn resolve(key: &str, modifiers: Modifiers) -> Option<ShortcutAction> {
        match (modifiers.cmd() && !modifiers.alt, key) {
            (true, "=" | "+") => Some(ShortcutAction::ZoomIn),
            (true, "-" | "_") => Some(ShortcutAction::ZoomOut),
            (true, "0") => Some(ShortcutAction::ResetView),
            (false, "Delete" | "Backspace") if !modifiers.cmd() => Some(ShortcutAction::Delete),
            (false, "Escape") => Some(ShortcutAction::Cancel),
            _ => None,
        }
    }
}
