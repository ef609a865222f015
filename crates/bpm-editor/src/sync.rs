//! Reconciliation between the in-memory diagram and storage.
//!
//! The engine owns the live [`Diagram`]. Interaction code changes it only
//! through [`SyncEngine::apply_mutation`]; `load` and `save` move it to and
//! from whichever store the configuration makes canonical. The other store,
//! when present, is a derived cache or a one-time import source.

use crate::config::{EditorConfig, PersistenceMode};
use crate::error::SyncError;
use crate::host::{EntityStore, RecordSource};
use crate::pending::{FlushReport, PendingBuffer};
use crate::relational::{self, KnownRows, PushStats};
use bpm_core::blob::{self, RawBlob, parse_blob};
use bpm_core::id::ElementId;
use bpm_core::model::{Diagram, Edge, ModelError, Node};
use bpm_core::repair::{RepairAction, repair_cells};

/// A single change to the diagram.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagramMutation {
    AddNode { node: Node },
    AddEdge { edge: Edge },
    MoveNode { id: ElementId, x: f32, y: f32 },
    RenameNode { id: ElementId, label: String },
    /// Remove a node (with its edges) or an edge.
    Remove { id: ElementId },
}

/// Where a load found the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Empty,
    Blob,
    Rows,
    /// Blob mode, blob empty: imported from rows.
    BlobFromRows,
    /// Relational mode, no rows yet: imported from the blob.
    RowsFromBlob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub source: LoadSource,
    pub repairs: Vec<RepairAction>,
    /// The stored form is stale (repaired or legacy); save it back soon.
    pub resave: bool,
    /// The diagram was imported from the non-canonical store; save it
    /// back before anything else.
    pub save_now: bool,
}

impl LoadOutcome {
    fn empty() -> Self {
        Self {
            source: LoadSource::Empty,
            repairs: Vec::new(),
            resave: false,
            save_now: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Blob,
    Rows(PushStats),
    /// No parent identity yet: creations were buffered.
    Pending { nodes: usize, edges: usize },
}

pub struct SyncEngine {
    pub diagram: Diagram,
    mode: PersistenceMode,
    field_name: String,
    cache_field: Option<String>,
    known: KnownRows,
    pending: PendingBuffer,
}

impl SyncEngine {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            diagram: Diagram::new(),
            mode: config.persistence,
            field_name: config.field_name.clone(),
            cache_field: config.cache_field.clone(),
            known: KnownRows::default(),
            pending: PendingBuffer::default(),
        }
    }

    pub fn mode(&self) -> PersistenceMode {
        self.mode
    }

    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    pub fn known_rows(&self) -> &KnownRows {
        &self.known
    }

    /// Apply one mutation. Returns whether the diagram changed.
    pub fn apply_mutation(&mut self, mutation: DiagramMutation) -> Result<bool, ModelError> {
        match mutation {
            DiagramMutation::AddNode { node } => {
                log::debug!("sync: add node {} ({})", node.id, node.kind);
                self.diagram.add_node(node)?;
                Ok(true)
            }
            DiagramMutation::AddEdge { edge } => {
                log::debug!("sync: add edge {} {} → {}", edge.id, edge.source, edge.target);
                self.diagram.add_edge(edge)?;
                Ok(true)
            }
            DiagramMutation::MoveNode { id, x, y } => {
                let mut node = self
                    .diagram
                    .node_mut(id)
                    .ok_or(ModelError::UnknownNode(id))?;
                Ok(node.set_position(x, y))
            }
            DiagramMutation::RenameNode { id, label } => {
                let mut node = self
                    .diagram
                    .node_mut(id)
                    .ok_or(ModelError::UnknownNode(id))?;
                Ok(node.set_label(label))
            }
            DiagramMutation::Remove { id } => {
                let removed = self.diagram.remove(id);
                if removed {
                    log::debug!("sync: removed {id}");
                    self.pending.retain_live(&self.diagram);
                }
                Ok(removed)
            }
        }
    }

    // ─── Storage → canvas ────────────────────────────────────────────────

    /// Replace the diagram with the stored one, repaired.
    pub async fn load<R: RecordSource, S: EntityStore>(
        &mut self,
        record: &R,
        store: &S,
    ) -> Result<LoadOutcome, SyncError> {
        self.diagram = Diagram::new();
        self.known = KnownRows::default();
        self.pending.clear();
        match self.mode {
            PersistenceMode::Blob => self.load_blob(record, store).await,
            PersistenceMode::Relational => self.load_rows(record, store).await,
        }
    }

    async fn load_blob<R: RecordSource, S: EntityStore>(
        &mut self,
        record: &R,
        store: &S,
    ) -> Result<LoadOutcome, SyncError> {
        let raw = self.read_blob(record);
        if !raw.is_empty() {
            let report = repair_cells(&raw.cells);
            let resave = report.changed() || raw.legacy;
            self.diagram = report.diagram;
            return Ok(LoadOutcome {
                source: LoadSource::Blob,
                repairs: report.actions,
                resave,
                save_now: false,
            });
        }

        let Some(process) = record.current_identity() else {
            return Ok(LoadOutcome::empty());
        };
        let (nodes, edges) = relational::fetch(store, process).await?;
        if nodes.is_empty() {
            return Ok(LoadOutcome::empty());
        }
        log::info!("sync: blob field `{}` is empty, importing rows", self.field_name);
        let report = repair_cells(&relational::rows_to_cells(&nodes, &edges));
        self.diagram = report.diagram;
        self.adopt_rows(nodes.len() + edges.len());
        Ok(LoadOutcome {
            source: LoadSource::BlobFromRows,
            repairs: report.actions,
            resave: false,
            save_now: true,
        })
    }

    async fn load_rows<R: RecordSource, S: EntityStore>(
        &mut self,
        record: &R,
        store: &S,
    ) -> Result<LoadOutcome, SyncError> {
        let Some(process) = record.current_identity() else {
            return Ok(LoadOutcome::empty());
        };
        let (nodes, edges) = relational::fetch(store, process).await?;
        if !nodes.is_empty() {
            let report = repair_cells(&relational::rows_to_cells(&nodes, &edges));
            let resave = report.changed();
            self.diagram = report.diagram;
            self.adopt_rows(nodes.len() + edges.len());
            return Ok(LoadOutcome {
                source: LoadSource::Rows,
                repairs: report.actions,
                resave,
                save_now: false,
            });
        }

        let raw = self.read_blob(record);
        if raw.is_empty() {
            return Ok(LoadOutcome::empty());
        }
        log::info!("sync: no rows for process {process}, importing blob");
        let report = repair_cells(&raw.cells);
        self.diagram = report.diagram;
        // Record ids in the blob point at rows that no longer exist.
        forget_external_ids(&mut self.diagram);
        Ok(LoadOutcome {
            source: LoadSource::RowsFromBlob,
            repairs: report.actions,
            resave: false,
            save_now: !self.diagram.is_empty(),
        })
    }

    /// Own exactly the rows that made it onto the canvas. Rows the repair
    /// pass dropped (duplicate connections, edges into other processes)
    /// stay in the store and are never deleted by a later push.
    fn adopt_rows(&mut self, fetched: usize) {
        self.known = KnownRows::from_diagram(&self.diagram);
        let left = fetched.saturating_sub(self.known.nodes.len() + self.known.edges.len());
        if left > 0 {
            log::warn!("sync: {left} row(s) not shown on the canvas are left untouched");
        }
    }

    /// Unreadable blobs load as empty; they are logged, never fatal.
    fn read_blob<R: RecordSource>(&self, record: &R) -> RawBlob {
        let Some(text) = record.field_value(&self.field_name) else {
            return RawBlob::default();
        };
        match parse_blob(&text) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("sync: ignoring unreadable blob in `{}`: {e}", self.field_name);
                RawBlob::default()
            }
        }
    }

    // ─── Canvas → storage ────────────────────────────────────────────────

    /// Write the current diagram to the canonical store.
    ///
    /// In relational mode without a parent identity nothing is written:
    /// creations are staged in the pending buffer instead.
    pub async fn save<R: RecordSource, S: EntityStore>(
        &mut self,
        record: &R,
        store: &S,
    ) -> Result<SaveOutcome, SyncError> {
        self.repair_in_place()?;
        match self.mode {
            PersistenceMode::Blob => {
                let text = blob::encode(&self.diagram)?;
                record.update_field(&self.field_name, text).await?;
                log::debug!("sync: wrote blob field `{}`", self.field_name);
                Ok(SaveOutcome::Blob)
            }
            PersistenceMode::Relational => {
                let Some(process) = record.current_identity() else {
                    self.pending.stage(&self.diagram);
                    log::debug!(
                        "sync: parent has no identity, {} node(s) and {} edge(s) pending",
                        self.pending.nodes().len(),
                        self.pending.edges().len()
                    );
                    return Ok(SaveOutcome::Pending {
                        nodes: self.pending.nodes().len(),
                        edges: self.pending.edges().len(),
                    });
                };
                if !self.pending.is_empty() {
                    self.pending
                        .flush(&mut self.diagram, store, process, &mut self.known)
                        .await?;
                }
                let stats =
                    relational::push(&mut self.diagram, store, process, &mut self.known).await?;
                if let Some(field) = &self.cache_field {
                    record
                        .update_field(field, blob::encode_legacy(&self.diagram)?)
                        .await?;
                }
                Ok(SaveOutcome::Rows(stats))
            }
        }
    }

    /// Run the repair pass over the live diagram before it is written.
    /// Mutations already keep the model's invariants, so this only changes
    /// diagrams holding ids outside the naming convention.
    fn repair_in_place(&mut self) -> Result<(), SyncError> {
        let cells = blob::to_cells(&self.diagram)
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let report = repair_cells(&cells);
        if report.changed() {
            log::warn!(
                "sync: {} repair(s) applied before save",
                report.actions.len()
            );
            self.diagram = report.diagram;
            self.pending.retain_live(&self.diagram);
        }
        Ok(())
    }

    /// Create buffered elements once the parent has an identity. `None`
    /// when there is nothing to flush or still no identity.
    pub async fn flush_pending<R: RecordSource, S: EntityStore>(
        &mut self,
        record: &R,
        store: &S,
    ) -> Result<Option<FlushReport>, SyncError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let Some(process) = record.current_identity() else {
            return Ok(None);
        };
        let report = self
            .pending
            .flush(&mut self.diagram, store, process, &mut self.known)
            .await?;
        Ok(Some(report))
    }
}

fn forget_external_ids(diagram: &mut Diagram) {
    let nodes: Vec<ElementId> = diagram.nodes().iter().map(|n| n.id).collect();
    let edges: Vec<ElementId> = diagram.edges().iter().map(|e| e.id).collect();
    for id in nodes {
        if let Some(mut n) = diagram.node_mut(id) {
            n.set_external_id(None);
        }
    }
    for id in edges {
        if let Some(mut e) = diagram.edge_mut(id) {
            e.set_external_id(None);
        }
    }
}
