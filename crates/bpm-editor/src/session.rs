//! The editor session: one mounted canvas bound to one parent record.
//!
//! Owns the sync engine, viewport and interaction machine, and routes
//! host events through them. This is the catch boundary: storage errors
//! are logged and surfaced through the [`Notifier`], never returned from
//! an event handler, and the in-memory diagram is never rolled back.
//!
//! Pointer-down, pointer-move and wheel handlers are synchronous. Saves
//! they request are queued and run by [`EditorSession::run_deferred`].

use crate::config::EditorConfig;
use crate::error::{ConfigError, SyncError};
use crate::host::{EntityStore, Notifier, NotifyLevel, RecordSource};
use crate::input::{InputEvent, Modifiers, PointerButton};
use crate::interaction::{EditorCommand, Interaction, InteractionState};
use crate::listeners::{ListenerGuard, ListenerHost, ListenerScope};
use crate::pending::PendingBuffer;
use crate::sync::{DiagramMutation, SyncEngine};
use bpm_core::geometry::{self, Point};
use bpm_core::id::ElementId;
use bpm_core::lint::{LintDiagnostic, lint_diagram};
use bpm_core::model::{Diagram, Node, NodeKind};
use bpm_core::viewport::Viewport;
use bpm_render::path::{EdgeRoute, edge_route};
use std::rc::Rc;

/// What applying a batch of commands asked for.
#[derive(Debug, Default)]
struct Applied {
    changed: bool,
    persist: bool,
}

pub struct EditorSession<R, S, N> {
    config: EditorConfig,
    engine: SyncEngine,
    viewport: Viewport,
    interaction: Interaction,
    record: R,
    store: S,
    notifier: N,
    listener_host: Option<Rc<dyn ListenerHost>>,
    mount_guards: Vec<ListenerGuard>,
    tracking: Option<ListenerGuard>,
    deferred_save: bool,
    rename_request: Option<ElementId>,
    canvas: (f32, f32),
}

impl<R: RecordSource, S: EntityStore, N: Notifier> EditorSession<R, S, N> {
    pub fn new(config: EditorConfig, record: R, store: S, notifier: N) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine: SyncEngine::new(&config),
            viewport: Viewport::with_bounds(config.min_zoom, config.max_zoom),
            interaction: Interaction::new(),
            record,
            store,
            notifier,
            listener_host: None,
            mount_guards: Vec::new(),
            tracking: None,
            deferred_save: false,
            rename_request: None,
            canvas: (0.0, 0.0),
            config,
        })
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn diagram(&self) -> &Diagram {
        &self.engine.diagram
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn selection(&self) -> &[ElementId] {
        self.interaction.selection()
    }

    pub fn state(&self) -> &InteractionState {
        self.interaction.state()
    }

    pub fn pending(&self) -> &PendingBuffer {
        self.engine.pending()
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn is_mounted(&self) -> bool {
        self.listener_host.is_some()
    }

    pub fn has_deferred_save(&self) -> bool {
        self.deferred_save
    }

    /// Node the user double-clicked since the last call, if any.
    pub fn take_rename_request(&mut self) -> Option<ElementId> {
        self.rename_request.take()
    }

    /// Routed path of every edge, in paint order.
    pub fn edge_routes(&self) -> Vec<(ElementId, EdgeRoute)> {
        let d = &self.engine.diagram;
        d.edges()
            .iter()
            .filter_map(|e| Some((e.id, edge_route(d, e, self.config.edge_style)?)))
            .collect()
    }

    pub fn rubber_band(&self) -> Option<EdgeRoute> {
        self.interaction.rubber_band()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Attach mount-long listeners, reset the viewport and load the diagram.
    pub async fn mount(&mut self, host: Rc<dyn ListenerHost>, width: f32, height: f32) {
        if self.is_mounted() {
            self.unmount();
        }
        self.mount_guards = vec![
            ListenerGuard::acquire(&host, ListenerScope::Keyboard),
            ListenerGuard::acquire(&host, ListenerScope::Wheel),
        ];
        self.listener_host = Some(host);
        self.canvas = (width, height);
        self.viewport = Viewport::with_bounds(self.config.min_zoom, self.config.max_zoom);
        self.interaction = Interaction::new();
        if self.reload().await && self.config.center_empty_viewport && self.diagram().is_empty() {
            self.viewport.center_origin(width, height);
        }
    }

    /// Detach every listener and drop queued work. Idempotent.
    pub fn unmount(&mut self) {
        self.interaction.cancel();
        self.tracking = None;
        self.mount_guards.clear();
        self.listener_host = None;
        self.deferred_save = false;
        self.rename_request = None;
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.canvas = (width, height);
    }

    async fn reload(&mut self) -> bool {
        match self.engine.load(&self.record, &self.store).await {
            Ok(outcome) => {
                log::debug!(
                    "session: loaded {:?}, {} repair(s)",
                    outcome.source,
                    outcome.repairs.len()
                );
                self.interaction.prune(&self.engine.diagram);
                if outcome.save_now {
                    self.save().await;
                } else if outcome.resave {
                    self.deferred_save = true;
                }
                true
            }
            Err(e) => {
                self.interaction.prune(&self.engine.diagram);
                self.report("Could not load the diagram", &e);
                false
            }
        }
    }

    /// The host saved the parent record for the first time.
    pub async fn on_identity_available(&mut self) -> bool {
        match self.engine.flush_pending(&self.record, &self.store).await {
            Ok(Some(report)) => {
                log::info!(
                    "session: flushed {} pending node(s), {} edge(s)",
                    report.node_ids.len(),
                    report.edges_created
                );
                self.save().await
            }
            Ok(None) => false,
            Err(e) => {
                self.report("Could not create pending elements", &e);
                false
            }
        }
    }

    /// Rows changed outside the canvas. Reloads, keeping the viewport.
    pub async fn on_external_reload(&mut self) -> bool {
        self.interaction.cancel();
        self.sync_tracking();
        self.reload().await
    }

    /// Run queued saves. Returns whether a save ran and succeeded.
    pub async fn run_deferred(&mut self) -> bool {
        if !std::mem::take(&mut self.deferred_save) {
            return false;
        }
        self.save().await
    }

    // ─── Input ───────────────────────────────────────────────────────────
    // Each handler returns whether the canvas needs a redraw.

    pub fn pointer_down(
        &mut self,
        x: f32,
        y: f32,
        button: PointerButton,
        modifiers: Modifiers,
        time_ms: f64,
    ) -> bool {
        self.dispatch_now(InputEvent::from_pointer_down(x, y, button, modifiers, time_ms))
    }

    pub fn pointer_move(&mut self, x: f32, y: f32, modifiers: Modifiers) -> bool {
        self.dispatch_now(InputEvent::from_pointer_move(x, y, modifiers))
    }

    /// Also tells the host whether to `preventDefault` the wheel event.
    pub fn wheel(&mut self, x: f32, y: f32, delta_y: f32, modifiers: Modifiers) -> bool {
        self.dispatch_now(InputEvent::from_wheel(x, y, delta_y, modifiers))
    }

    pub async fn pointer_up(&mut self, x: f32, y: f32, modifiers: Modifiers) -> bool {
        self.handle_event(InputEvent::from_pointer_up(x, y, modifiers))
            .await
    }

    pub async fn key_down(&mut self, key: &str, modifiers: Modifiers, in_text_input: bool) -> bool {
        self.handle_event(InputEvent::from_key(key, modifiers, in_text_input))
            .await
    }

    /// Handle any event, saving inline when it asks for persistence.
    pub async fn handle_event(&mut self, event: InputEvent) -> bool {
        let commands = self.run_machine(&event);
        let applied = self.apply(commands);
        if applied.persist {
            self.save().await;
        }
        applied.changed
    }

    fn dispatch_now(&mut self, event: InputEvent) -> bool {
        let commands = self.run_machine(&event);
        let applied = self.apply(commands);
        if applied.persist {
            self.deferred_save = true;
        }
        applied.changed
    }

    fn run_machine(&mut self, event: &InputEvent) -> Vec<EditorCommand> {
        let commands =
            self.interaction
                .handle(event, &self.engine.diagram, &mut self.viewport, &self.config);
        self.sync_tracking();
        commands
    }

    /// Pointer tracking is attached exactly while an interaction is active.
    fn sync_tracking(&mut self) {
        let active = !self.interaction.state().is_idle();
        match (&self.listener_host, active, self.tracking.is_some()) {
            (Some(host), true, false) => {
                self.tracking = Some(ListenerGuard::acquire(host, ListenerScope::PointerTracking));
            }
            (_, false, true) => self.tracking = None,
            _ => {}
        }
    }

    fn apply(&mut self, commands: Vec<EditorCommand>) -> Applied {
        let mut applied = Applied::default();
        for command in commands {
            match command {
                EditorCommand::Mutate(mutation) => match self.engine.apply_mutation(mutation) {
                    Ok(changed) => applied.changed |= changed,
                    Err(e) => log::warn!("session: mutation rejected: {e}"),
                },
                EditorCommand::Persist => applied.persist = true,
                EditorCommand::PersistDeferred => self.deferred_save = true,
                EditorCommand::Rename(id) => {
                    self.rename_request = Some(id);
                    applied.changed = true;
                }
                EditorCommand::Notify { message, level } => self.notifier.notify(&message, level),
                EditorCommand::Redraw => applied.changed = true,
            }
        }
        applied
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    /// Add a node at `at` (top-left, world units), or centred in the
    /// visible area. The new node becomes the selection and is saved.
    pub async fn add_node(&mut self, kind: NodeKind, at: Option<Point>) -> Option<ElementId> {
        let origin = at.unwrap_or_else(|| {
            let (w, h) = geometry::dimensions_for(kind);
            let c = self.viewport.visible_center(self.canvas.0, self.canvas.1);
            Point::new(c.x - w / 2.0, c.y - h / 2.0)
        });
        let snap = |v: f32| geometry::snap(v, self.config.grid_size, self.config.snap_to_grid);
        let node = Node::new(ElementId::new_node(), kind, snap(origin.x), snap(origin.y));
        let id = node.id;
        if let Err(e) = self.engine.apply_mutation(DiagramMutation::AddNode { node }) {
            log::error!("session: could not add node: {e}");
            return None;
        }
        self.interaction.select_only(id);
        self.save().await;
        Some(id)
    }

    /// Rename a node. Blank or unchanged labels are ignored.
    pub async fn rename_node(&mut self, id: ElementId, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() {
            return false;
        }
        let mutation = DiagramMutation::RenameNode {
            id,
            label: label.to_string(),
        };
        match self.engine.apply_mutation(mutation) {
            Ok(true) => {
                self.save().await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                log::warn!("session: rename rejected: {e}");
                false
            }
        }
    }

    pub async fn delete_selected(&mut self) -> bool {
        let commands = self.interaction.delete_selection(&self.engine.diagram);
        let applied = self.apply(commands);
        if applied.persist {
            self.save().await;
        }
        applied.changed
    }

    /// Run a save pass. Failures are reported, never returned.
    pub async fn save(&mut self) -> bool {
        let result = self.engine.save(&self.record, &self.store).await;
        self.interaction.prune(&self.engine.diagram);
        match result {
            Ok(outcome) => {
                log::debug!("session: saved ({outcome:?})");
                true
            }
            Err(e) => {
                self.report("Could not save the diagram", &e);
                false
            }
        }
    }

    fn report(&self, what: &str, err: &SyncError) {
        log::error!("session: {what}: {err}");
        self.notifier
            .notify(&format!("{what}: {err}"), NotifyLevel::Danger);
    }

    // ─── View & validation ───────────────────────────────────────────────

    pub fn validate(&self) -> Vec<LintDiagnostic> {
        lint_diagram(&self.engine.diagram)
    }

    pub fn set_snap_to_grid(&mut self, enabled: bool) {
        self.config.snap_to_grid = enabled;
    }

    pub fn zoom_in(&mut self) -> bool {
        self.viewport.zoom_in(self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.viewport.zoom_out(self.config.zoom_step)
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
    }
}
