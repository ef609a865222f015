//! Canvas interaction state machine.
//!
//! Translates input events into [`EditorCommand`]s. The machine reads the
//! diagram but never mutates it: node moves, new edges and deletions come
//! out as [`DiagramMutation`]s for the `SyncEngine`. Viewport changes
//! (pan, zoom) are applied directly since they are session-local.
//!
//! ## Pointer-down precedence
//!
//! | Target | Result |
//! |--------|--------|
//! | pan gesture (middle, or shift + primary) | `Panning` |
//! | connection point | `Connecting` |
//! | node body, second click within the window | rename request |
//! | node body | selection rule, then `Dragging` |
//! | edge route | edge selection |
//! | empty canvas | clear selection (and `Panning` when configured) |

use crate::config::{DragPersistence, EditorConfig, EmptyCanvasDrag, PanTrigger};
use crate::host::NotifyLevel;
use crate::input::{InputEvent, Modifiers, PointerButton};
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::sync::DiagramMutation;
use bpm_core::geometry::{self, Point};
use bpm_core::id::ElementId;
use bpm_core::model::{Diagram, Edge, Side};
use bpm_core::viewport::Viewport;
use bpm_render::hit::{self, PointHit};
use bpm_render::path::EdgeRoute;
use smallvec::SmallVec;

/// A node being dragged. `raw` accumulates unsnapped movement so slow
/// drags still cross grid lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragEntry {
    pub id: ElementId,
    pub raw: Point,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum InteractionState {
    #[default]
    Idle,
    /// `anchor` is the screen cursor minus the pan offset at pointer-down.
    Panning { anchor: Point },
    /// `last` is the world cursor at the previous tick.
    Dragging {
        last: Point,
        nodes: SmallVec<[DragEntry; 4]>,
        moved: bool,
    },
    Connecting {
        source: ElementId,
        side: Side,
        origin: Point,
        cursor: Point,
        /// Connection point the rubber band currently snaps to.
        snap: Option<PointHit>,
    },
}

impl InteractionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Panning { .. } => "panning",
            Self::Dragging { .. } => "dragging",
            Self::Connecting { .. } => "connecting",
        }
    }
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    Mutate(DiagramMutation),
    /// Run a save pass now.
    Persist,
    /// Queue a save pass without blocking the handler.
    PersistDeferred,
    /// The user double-clicked a node.
    Rename(ElementId),
    Notify { message: String, level: NotifyLevel },
    /// Something visible changed (selection, viewport, rubber band).
    Redraw,
}

#[derive(Debug, Clone, Default)]
pub struct Interaction {
    state: InteractionState,
    selection: Vec<ElementId>,
    /// Node and host timestamp of the last plain node click.
    last_click: Option<(ElementId, f64)>,
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn selection(&self) -> &[ElementId] {
        &self.selection
    }

    pub fn is_selected(&self, id: ElementId) -> bool {
        self.selection.contains(&id)
    }

    pub fn select_only(&mut self, id: ElementId) {
        self.selection = vec![id];
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    fn toggle(&mut self, id: ElementId) {
        if let Some(pos) = self.selection.iter().position(|s| *s == id) {
            self.selection.remove(pos);
        } else {
            self.selection.push(id);
        }
    }

    /// Drop selected ids that no longer exist.
    pub fn prune(&mut self, diagram: &Diagram) {
        self.selection.retain(|id| diagram.contains(*id));
        if let Some((id, _)) = self.last_click
            && !diagram.contains(id)
        {
            self.last_click = None;
        }
    }

    /// Abandon whatever is in progress.
    pub fn cancel(&mut self) {
        if !self.state.is_idle() {
            log::debug!("interaction: cancel {}", self.state.name());
        }
        self.state = InteractionState::Idle;
    }

    /// Transient segment from the connection source to the snapped point,
    /// or to the raw cursor.
    pub fn rubber_band(&self) -> Option<EdgeRoute> {
        match &self.state {
            InteractionState::Connecting {
                origin,
                cursor,
                snap,
                ..
            } => Some(EdgeRoute::straight(
                *origin,
                snap.map_or(*cursor, |hit| hit.point),
            )),
            _ => None,
        }
    }

    pub fn handle(
        &mut self,
        event: &InputEvent,
        diagram: &Diagram,
        viewport: &mut Viewport,
        config: &EditorConfig,
    ) -> Vec<EditorCommand> {
        match event {
            InputEvent::PointerDown {
                x,
                y,
                button,
                modifiers,
                time_ms,
            } => self.pointer_down(
                Point::new(*x, *y),
                *button,
                *modifiers,
                *time_ms,
                diagram,
                viewport,
                config,
            ),
            InputEvent::PointerMove { x, y, .. } => {
                self.pointer_move(Point::new(*x, *y), diagram, viewport, config)
            }
            InputEvent::PointerUp { x, y, .. } => {
                self.pointer_up(Point::new(*x, *y), diagram, viewport, config)
            }
            InputEvent::Wheel {
                x,
                y,
                delta_y,
                modifiers,
            } => wheel(Point::new(*x, *y), *delta_y, *modifiers, viewport, config),
            InputEvent::Key {
                key,
                modifiers,
                in_text_input,
            } => {
                if *in_text_input {
                    return Vec::new();
                }
                let Some(action) = ShortcutMap::resolve(key, *modifiers) else {
                    return Vec::new();
                };
                self.shortcut(action, diagram, viewport, config)
            }
        }
    }

    // ─── Pointer ─────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn pointer_down(
        &mut self,
        screen: Point,
        button: PointerButton,
        modifiers: Modifiers,
        time_ms: f64,
        diagram: &Diagram,
        viewport: &mut Viewport,
        config: &EditorConfig,
    ) -> Vec<EditorCommand> {
        let pan_gesture = match button {
            PointerButton::Middle => true,
            PointerButton::Primary => {
                modifiers.shift && config.pan_trigger == PanTrigger::MiddleOrShiftPrimary
            }
            PointerButton::Secondary => return Vec::new(),
        };
        if pan_gesture {
            self.start_pan(screen, viewport);
            return Vec::new();
        }

        let world = viewport.screen_to_world(screen);
        let threshold = config.connection_threshold;

        if let Some(hit) = hit::find_connection_point_at(diagram, world.x, world.y, threshold) {
            log::debug!("interaction: connect from {} {:?}", hit.node, hit.side);
            self.last_click = None;
            self.select_only(hit.node);
            self.state = InteractionState::Connecting {
                source: hit.node,
                side: hit.side,
                origin: hit.point,
                cursor: world,
                snap: None,
            };
            return vec![EditorCommand::Redraw];
        }

        if let Some(id) = hit::find_node_at(diagram, world.x, world.y) {
            if let Some((last, at)) = self.last_click
                && last == id
                && time_ms - at <= config.double_click_ms
            {
                self.last_click = None;
                return vec![EditorCommand::Rename(id)];
            }
            self.last_click = Some((id, time_ms));

            if modifiers.cmd() {
                self.toggle(id);
            } else if !self.is_selected(id) {
                self.select_only(id);
            }

            let nodes: SmallVec<[DragEntry; 4]> = self
                .selection
                .iter()
                .filter_map(|s| diagram.node_by_id(*s))
                .map(|n| DragEntry {
                    id: n.id,
                    raw: Point::new(n.x, n.y),
                })
                .collect();
            if !nodes.is_empty() {
                self.state = InteractionState::Dragging {
                    last: world,
                    nodes,
                    moved: false,
                };
            }
            return vec![EditorCommand::Redraw];
        }
        self.last_click = None;

        if let Some(id) =
            hit::find_edge_at(diagram, world.x, world.y, threshold, config.edge_style)
        {
            if modifiers.cmd() {
                self.toggle(id);
            } else {
                self.select_only(id);
            }
            return vec![EditorCommand::Redraw];
        }

        if !modifiers.cmd() {
            self.selection.clear();
        }
        if config.empty_canvas_drag == EmptyCanvasDrag::Pan {
            self.start_pan(screen, viewport);
        }
        vec![EditorCommand::Redraw]
    }

    fn start_pan(&mut self, screen: Point, viewport: &Viewport) {
        let pan = viewport.pan();
        self.state = InteractionState::Panning {
            anchor: Point::new(screen.x - pan.x, screen.y - pan.y),
        };
    }

    fn pointer_move(
        &mut self,
        screen: Point,
        diagram: &Diagram,
        viewport: &mut Viewport,
        config: &EditorConfig,
    ) -> Vec<EditorCommand> {
        match &mut self.state {
            InteractionState::Idle => Vec::new(),
            InteractionState::Panning { anchor } => {
                viewport.pan_to(screen.x - anchor.x, screen.y - anchor.y);
                vec![EditorCommand::Redraw]
            }
            InteractionState::Dragging { last, nodes, moved } => {
                let world = viewport.screen_to_world(screen);
                let (dx, dy) = (world.x - last.x, world.y - last.y);
                *last = world;

                let snap = |v: f32| geometry::snap(v, config.grid_size, config.snap_to_grid).max(0.0);
                let mut out = Vec::new();
                for entry in nodes.iter_mut() {
                    entry.raw = Point::new((entry.raw.x + dx).max(0.0), (entry.raw.y + dy).max(0.0));
                    let (x, y) = (snap(entry.raw.x), snap(entry.raw.y));
                    if let Some(n) = diagram.node_by_id(entry.id)
                        && (n.x != x || n.y != y)
                    {
                        out.push(EditorCommand::Mutate(DiagramMutation::MoveNode {
                            id: entry.id,
                            x,
                            y,
                        }));
                    }
                }
                if !out.is_empty() {
                    *moved = true;
                    if config.drag_persistence == DragPersistence::EveryMove {
                        out.push(EditorCommand::PersistDeferred);
                    }
                }
                out
            }
            InteractionState::Connecting {
                source,
                cursor,
                snap,
                ..
            } => {
                let world = viewport.screen_to_world(screen);
                let from = *source;
                *cursor = world;
                *snap = hit::find_connection_point_where(
                    diagram,
                    world.x,
                    world.y,
                    config.connection_threshold,
                    |n| n.id != from,
                );
                vec![EditorCommand::Redraw]
            }
        }
    }

    fn pointer_up(
        &mut self,
        screen: Point,
        diagram: &Diagram,
        viewport: &Viewport,
        config: &EditorConfig,
    ) -> Vec<EditorCommand> {
        match std::mem::take(&mut self.state) {
            InteractionState::Idle | InteractionState::Panning { .. } => Vec::new(),
            InteractionState::Dragging { moved, .. } => {
                if moved {
                    vec![EditorCommand::Persist]
                } else {
                    Vec::new()
                }
            }
            InteractionState::Connecting { source, side, .. } => {
                let world = viewport.screen_to_world(screen);
                let Some(target) = hit::find_connection_point_where(
                    diagram,
                    world.x,
                    world.y,
                    config.connection_threshold,
                    |n| n.id != source,
                ) else {
                    log::debug!("interaction: connection from {source} abandoned");
                    return vec![EditorCommand::Redraw];
                };
                if diagram.has_connection(source, target.node) {
                    return vec![
                        EditorCommand::Notify {
                            message: "These nodes are already connected.".to_string(),
                            level: NotifyLevel::Warning,
                        },
                        EditorCommand::Redraw,
                    ];
                }
                let edge =
                    Edge::new(ElementId::new_edge(), source, target.node).docked(side, target.side);
                vec![
                    EditorCommand::Mutate(DiagramMutation::AddEdge { edge }),
                    EditorCommand::Persist,
                ]
            }
        }
    }

    // ─── Keyboard ────────────────────────────────────────────────────────

    fn shortcut(
        &mut self,
        action: ShortcutAction,
        diagram: &Diagram,
        viewport: &mut Viewport,
        config: &EditorConfig,
    ) -> Vec<EditorCommand> {
        let redraw = |changed: bool| {
            if changed {
                vec![EditorCommand::Redraw]
            } else {
                Vec::new()
            }
        };
        match action {
            ShortcutAction::Delete => self.delete_selection(diagram),
            ShortcutAction::Cancel => {
                if matches!(self.state, InteractionState::Connecting { .. }) {
                    self.cancel();
                    return vec![EditorCommand::Redraw];
                }
                let had = !self.selection.is_empty();
                self.selection.clear();
                redraw(had)
            }
            ShortcutAction::ZoomIn => redraw(viewport.zoom_in(config.zoom_step)),
            ShortcutAction::ZoomOut => redraw(viewport.zoom_out(config.zoom_step)),
            ShortcutAction::ResetView => {
                viewport.reset();
                vec![EditorCommand::Redraw]
            }
        }
    }

    /// Remove every selected element (node removal cascades to its
    /// edges), clear the selection, then persist.
    pub fn delete_selection(&mut self, diagram: &Diagram) -> Vec<EditorCommand> {
        let mut out: Vec<EditorCommand> = std::mem::take(&mut self.selection)
            .into_iter()
            .filter(|id| diagram.contains(*id))
            .map(|id| EditorCommand::Mutate(DiagramMutation::Remove { id }))
            .collect();
        if !out.is_empty() {
            out.push(EditorCommand::Persist);
        }
        out
    }
}

/// Zoom around the cursor. Returns nothing when the wheel should scroll
/// the host page instead.
fn wheel(
    cursor: Point,
    delta_y: f32,
    modifiers: Modifiers,
    viewport: &mut Viewport,
    config: &EditorConfig,
) -> Vec<EditorCommand> {
    if delta_y == 0.0 || (config.wheel_requires_modifier && !modifiers.cmd()) {
        return Vec::new();
    }
    let factor = if delta_y > 0.0 {
        config.wheel_zoom_out
    } else {
        config.wheel_zoom_in
    };
    if viewport.zoom_at(cursor, factor) {
        vec![EditorCommand::Redraw]
    } else {
        Vec::new()
    }
}
