//! Editor configuration.
//!
//! Every behaviour that differed between deployments of the canvas is a
//! field here. Hosts pass options as JSON; missing keys take the basic
//! editor defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub use bpm_render::EdgeStyle;

/// Where the diagram is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Whole diagram in one field of the parent record.
    #[default]
    Blob,
    /// One store row per node and edge, keyed by the parent identity.
    Relational,
}

/// Pointer gesture that starts panning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanTrigger {
    /// Middle button only.
    Middle,
    /// Middle button, or shift + primary button.
    #[default]
    MiddleOrShiftPrimary,
}

/// What a plain primary drag on empty canvas does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyCanvasDrag {
    /// Clear the selection, nothing else.
    #[default]
    Deselect,
    /// Clear the selection and pan.
    Pan,
}

/// When node drags are written to storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragPersistence {
    #[default]
    OnRelease,
    /// Queue a deferred save on every move tick, plus one on release.
    EveryMove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub persistence: PersistenceMode,
    /// Record field holding the blob.
    pub field_name: String,
    /// Relational mode only: field that receives the legacy `{nodes, edges}`
    /// snapshot after each successful save.
    pub cache_field: Option<String>,
    pub grid_size: f32,
    pub snap_to_grid: bool,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Multiplicative step for zoom in/out buttons and shortcuts.
    pub zoom_step: f32,
    pub wheel_zoom_in: f32,
    pub wheel_zoom_out: f32,
    /// Connection point and edge pick radius, world units.
    pub connection_threshold: f32,
    pub double_click_ms: f64,
    pub pan_trigger: PanTrigger,
    pub empty_canvas_drag: EmptyCanvasDrag,
    pub drag_persistence: DragPersistence,
    /// Only zoom on wheel while ctrl/cmd is held; otherwise the host scrolls.
    pub wheel_requires_modifier: bool,
    pub edge_style: EdgeStyle,
    /// Put the world origin in the middle of the canvas when mounting an
    /// empty diagram.
    pub center_empty_viewport: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceMode::Blob,
            field_name: "json_definition".to_string(),
            cache_field: None,
            grid_size: 10.0,
            snap_to_grid: true,
            min_zoom: 0.25,
            max_zoom: 4.0,
            zoom_step: bpm_core::viewport::ZOOM_STEP,
            wheel_zoom_in: 1.1,
            wheel_zoom_out: 0.9,
            connection_threshold: 8.0,
            double_click_ms: 300.0,
            pan_trigger: PanTrigger::MiddleOrShiftPrimary,
            empty_canvas_drag: EmptyCanvasDrag::Deselect,
            drag_persistence: DragPersistence::OnRelease,
            wheel_requires_modifier: false,
            edge_style: EdgeStyle::Orthogonal,
            center_empty_viewport: false,
        }
    }
}

impl EditorConfig {
    /// Preset for the relational graph editor.
    #[must_use]
    pub fn graph_node() -> Self {
        Self {
            persistence: PersistenceMode::Relational,
            grid_size: 20.0,
            min_zoom: 0.1,
            max_zoom: 3.0,
            empty_canvas_drag: EmptyCanvasDrag::Pan,
            pan_trigger: PanTrigger::Middle,
            wheel_requires_modifier: true,
            edge_style: EdgeStyle::Bezier,
            center_empty_viewport: true,
            ..Self::default()
        }
    }

    /// Parse host options and validate them.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_zoom > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_zoom must be positive, got {}",
                self.min_zoom
            )));
        }
        if self.max_zoom < self.min_zoom {
            return Err(ConfigError::Invalid(format!(
                "zoom bounds are inverted: [{}, {}]",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.grid_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "grid_size must be positive, got {}",
                self.grid_size
            )));
        }
        if !(self.zoom_step > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "zoom_step must exceed 1, got {}",
                self.zoom_step
            )));
        }
        for (name, factor) in [
            ("wheel_zoom_in", self.wheel_zoom_in),
            ("wheel_zoom_out", self.wheel_zoom_out),
        ] {
            if !(factor > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive, got {factor}"
                )));
            }
        }
        if self.field_name.trim().is_empty() {
            return Err(ConfigError::Invalid("field_name is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = EditorConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.persistence, PersistenceMode::Blob);
        assert_eq!(c.grid_size, 10.0);
        assert!(EditorConfig::graph_node().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = EditorConfig::from_json(
            r#"{"persistence":"relational","edge_style":"bezier","cache_field":"json_definition"}"#,
        )
        .unwrap();
        assert_eq!(c.persistence, PersistenceMode::Relational);
        assert_eq!(c.edge_style, EdgeStyle::Bezier);
        assert_eq!(c.cache_field.as_deref(), Some("json_definition"));
        assert_eq!(c.double_click_ms, 300.0);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EditorConfig::from_json(r#"{"min_zoom":0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EditorConfig::from_json(r#"{"min_zoom":2,"max_zoom":1}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EditorConfig::from_json(r#"{"grid_size":-10}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EditorConfig::from_json(r#"{"grid_size":"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
