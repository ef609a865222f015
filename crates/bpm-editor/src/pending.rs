//! Creations buffered while the parent record has no identity.
//!
//! Rows cannot be created before the parent exists, so elements added in
//! that window are staged here by element id, which doubles as their
//! temporary id. Row contents are read from the diagram at flush time,
//! so moves and renames made while pending are not lost.

use crate::error::SyncError;
use crate::host::{Entity, EntityStore};
use crate::relational::{EdgeRow, KnownRows, NodeRow, create_rows};
use bpm_core::id::{ElementId, ExternalId, RecordId};
use bpm_core::model::Diagram;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBuffer {
    nodes: Vec<ElementId>,
    edges: Vec<ElementId>,
}

/// Result of a successful [`PendingBuffer::flush`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Temporary → permanent id for every node created.
    pub node_ids: HashMap<ElementId, ExternalId>,
    pub edges_created: usize,
    /// Edges kept pending because an endpoint could not be resolved.
    pub edges_waiting: usize,
}

impl PendingBuffer {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn nodes(&self) -> &[ElementId] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ElementId] {
        &self.edges
    }

    /// Stage every element without a row id and forget staged elements
    /// that are no longer in the diagram.
    pub fn stage(&mut self, diagram: &Diagram) {
        self.retain_live(diagram);
        for n in diagram.nodes() {
            if n.external_id.is_none() && !self.nodes.contains(&n.id) {
                self.nodes.push(n.id);
            }
        }
        for e in diagram.edges() {
            if e.external_id.is_none() && !self.edges.contains(&e.id) {
                self.edges.push(e.id);
            }
        }
    }

    pub fn retain_live(&mut self, diagram: &Diagram) {
        self.nodes.retain(|id| diagram.node_by_id(*id).is_some());
        self.edges.retain(|id| diagram.edge_by_id(*id).is_some());
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// Create pending nodes, then pending edges with their endpoints
    /// rewritten through the temporary → permanent map. Each buffer is
    /// cleared only once its create call succeeded.
    pub async fn flush<S: EntityStore>(
        &mut self,
        diagram: &mut Diagram,
        store: &S,
        process: RecordId,
        known: &mut KnownRows,
    ) -> Result<FlushReport, SyncError> {
        self.retain_live(diagram);
        let mut report = FlushReport::default();

        if !self.nodes.is_empty() {
            let rows = self
                .nodes
                .iter()
                .filter_map(|id| diagram.node_by_id(*id))
                .map(|n| NodeRow::from_node(n, process).to_row())
                .collect::<Result<Vec<_>, _>>()?;
            let ids = create_rows(store, Entity::Node, rows).await?;
            for (temp, ext) in self.nodes.iter().zip(ids) {
                if let Some(mut node) = diagram.node_mut(*temp) {
                    node.set_external_id(Some(ext));
                }
                known.nodes.insert(ext);
                report.node_ids.insert(*temp, ext);
            }
            log::debug!("pending: created {} node(s)", report.node_ids.len());
            self.nodes.clear();
        }

        let resolve = |diagram: &Diagram, id: ElementId| {
            report
                .node_ids
                .get(&id)
                .copied()
                .or_else(|| diagram.node_by_id(id).and_then(|n| n.external_id))
        };
        let mut ready = Vec::new();
        let mut rows = Vec::new();
        let mut waiting = Vec::new();
        for id in &self.edges {
            let Some(edge) = diagram.edge_by_id(*id) else {
                continue;
            };
            match (resolve(diagram, edge.source), resolve(diagram, edge.target)) {
                (Some(source), Some(target)) => {
                    rows.push(EdgeRow::from_edge(edge, source, target, process).to_row()?);
                    ready.push(*id);
                }
                _ => {
                    log::warn!("pending: edge {id} still has an endpoint without a row");
                    waiting.push(*id);
                }
            }
        }
        let ids = create_rows(store, Entity::Edge, rows).await?;
        for (temp, ext) in ready.iter().zip(ids) {
            if let Some(mut edge) = diagram.edge_mut(*temp) {
                edge.set_external_id(Some(ext));
            }
            known.edges.insert(ext);
        }
        report.edges_created = ready.len();
        report.edges_waiting = waiting.len();
        self.edges = waiting;
        Ok(report)
    }
}
