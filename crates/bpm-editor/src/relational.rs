//! Relational persistence: one store row per node and edge.
//!
//! Rows are decoded leniently (the store reports empty char fields as
//! `false` and many2one references as `[id, display_name]` pairs) and
//! hydrated through the same repair pass as blobs, so a store left
//! inconsistent by a failed sync still loads.

use crate::error::{StoreError, SyncError};
use crate::host::{Entity, EntityStore, Row, RowFilter};
use bpm_core::id::{ElementId, ExternalId, RecordId};
use bpm_core::model::{Diagram, Edge, Node, NodeKind};
use bpm_core::repair::external_id;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};

pub const NODE_FIELDS: &[&str] = &[
    "id",
    "name",
    "node_type",
    "position_x",
    "position_y",
    "node_id",
    "process_id",
];

pub const EDGE_FIELDS: &[&str] = &[
    "id",
    "name",
    "condition",
    "sequence",
    "source_node_id",
    "target_node_id",
    "edge_id",
    "process_id",
];

// ─── Rows ────────────────────────────────────────────────────────────────

/// A `bpm.node` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    #[serde(default, deserialize_with = "many2one", skip_serializing)]
    pub id: Option<ExternalId>,
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default = "task", deserialize_with = "node_kind")]
    pub node_type: NodeKind,
    #[serde(default, deserialize_with = "float")]
    pub position_x: f32,
    #[serde(default, deserialize_with = "float")]
    pub position_y: f32,
    /// Diagram element id.
    #[serde(default, deserialize_with = "optional_text")]
    pub node_id: Option<String>,
    #[serde(default, deserialize_with = "parent")]
    pub process_id: Option<RecordId>,
}

/// A `bpm.edge` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRow {
    #[serde(default, deserialize_with = "many2one", skip_serializing)]
    pub id: Option<ExternalId>,
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub condition: Option<String>,
    #[serde(default = "default_sequence", deserialize_with = "sequence")]
    pub sequence: i32,
    #[serde(default, deserialize_with = "many2one")]
    pub source_node_id: Option<ExternalId>,
    #[serde(default, deserialize_with = "many2one")]
    pub target_node_id: Option<ExternalId>,
    /// Diagram element id.
    #[serde(default, deserialize_with = "optional_text")]
    pub edge_id: Option<String>,
    #[serde(default, deserialize_with = "parent")]
    pub process_id: Option<RecordId>,
}

impl NodeRow {
    pub fn from_node(node: &Node, process: RecordId) -> Self {
        Self {
            id: node.external_id,
            name: node.label.clone(),
            node_type: node.kind,
            position_x: node.x,
            position_y: node.y,
            node_id: Some(node.id.as_str().to_string()),
            process_id: Some(process),
        }
    }

    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row))
    }

    /// Write form, without the row id.
    pub fn to_row(&self) -> Result<Row, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

impl EdgeRow {
    pub fn from_edge(edge: &Edge, source: ExternalId, target: ExternalId, process: RecordId) -> Self {
        Self {
            id: edge.external_id,
            name: edge.label.clone(),
            condition: edge.condition.clone(),
            sequence: edge.sequence,
            source_node_id: Some(source),
            target_node_id: Some(target),
            edge_id: Some(edge.id.as_str().to_string()),
            process_id: Some(process),
        }
    }

    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row))
    }

    pub fn to_row(&self) -> Result<Row, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

fn task() -> NodeKind {
    NodeKind::Task
}

fn default_sequence() -> i32 {
    10
}

fn many2one<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ExternalId>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(external_id(Some(&v)))
}

fn parent<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RecordId>, D::Error> {
    Ok(many2one(d)?.map(|id| RecordId(id.0)))
}

fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(optional_text(d)?.unwrap_or_default())
}

fn optional_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn float<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    let v = Value::deserialize(d)?;
    let f = match &v {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(f.filter(|f| f.is_finite()).unwrap_or(0.0))
}

fn sequence<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let v = Value::deserialize(d)?;
    let s = v.as_i64().and_then(|s| i32::try_from(s).ok());
    Ok(s.unwrap_or_else(default_sequence))
}

fn node_kind<'de, D: Deserializer<'de>>(d: D) -> Result<NodeKind, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(v.as_str().map_or(NodeKind::Task, NodeKind::parse))
}

// ─── Known rows ──────────────────────────────────────────────────────────

/// External ids the canvas owns, for set-difference deletes. Rows that
/// were fetched but not hydrated are never listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownRows {
    pub nodes: BTreeSet<ExternalId>,
    pub edges: BTreeSet<ExternalId>,
}

impl KnownRows {
    pub fn from_diagram(diagram: &Diagram) -> Self {
        Self {
            nodes: diagram.nodes().iter().filter_map(|n| n.external_id).collect(),
            edges: diagram.edges().iter().filter_map(|e| e.external_id).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

// ─── Load ────────────────────────────────────────────────────────────────

/// Query every node and edge row owned by `process`.
pub async fn fetch<S: EntityStore>(
    store: &S,
    process: RecordId,
) -> Result<(Vec<NodeRow>, Vec<EdgeRow>), SyncError> {
    let filter = RowFilter::owned_by(process);
    let nodes = store
        .query(Entity::Node, &filter, NODE_FIELDS)
        .await?
        .into_iter()
        .map(NodeRow::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let edges = store
        .query(Entity::Edge, &filter, EDGE_FIELDS)
        .await?
        .into_iter()
        .map(EdgeRow::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!(
        "relational: fetched {} node row(s), {} edge row(s) for process {process}",
        nodes.len(),
        edges.len()
    );
    Ok((nodes, edges))
}

/// Raw cells for the repair pass. Rows without an element id (created
/// from a tabular view) get a placeholder that repair regenerates; edge
/// endpoints are resolved from row ids to the endpoint rows' element ids.
pub fn rows_to_cells(nodes: &[NodeRow], edges: &[EdgeRow]) -> Vec<Value> {
    let mut element_ids: HashMap<ExternalId, String> = HashMap::new();
    let mut cells = Vec::with_capacity(nodes.len() + edges.len());
    for row in nodes {
        let Some(ext) = row.id else { continue };
        let id = row
            .node_id
            .clone()
            .unwrap_or_else(|| format!("row_node_{ext}"));
        element_ids.insert(ext, id.clone());
        cells.push(json!({
            "id": id,
            "type": "vertex",
            "shape": row.node_type,
            "x": row.position_x,
            "y": row.position_y,
            "label": row.name,
            "externalId": ext,
        }));
    }
    let endpoint = |r: Option<ExternalId>| r.and_then(|ext| element_ids.get(&ext).cloned());
    for row in edges {
        let Some(ext) = row.id else { continue };
        let id = row
            .edge_id
            .clone()
            .unwrap_or_else(|| format!("row_edge_{ext}"));
        cells.push(json!({
            "id": id,
            "type": "edge",
            "source": endpoint(row.source_node_id),
            "target": endpoint(row.target_node_id),
            "label": row.name,
            "condition": row.condition,
            "sequence": row.sequence,
            "externalId": ext,
        }));
    }
    cells
}

// ─── Save ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Edges left out because an endpoint has no row yet.
    pub skipped: usize,
}

/// Create rows, checking that the store returned one id per row.
pub(crate) async fn create_rows<S: EntityStore>(
    store: &S,
    entity: Entity,
    rows: Vec<Row>,
) -> Result<Vec<ExternalId>, SyncError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let expected = rows.len();
    let ids = store.create(entity, rows).await?;
    if ids.len() != expected {
        return Err(StoreError::CountMismatch {
            expected,
            got: ids.len(),
        }
        .into());
    }
    Ok(ids)
}

fn node_external(diagram: &Diagram, id: ElementId) -> Option<ExternalId> {
    diagram.node_by_id(id).and_then(|n| n.external_id)
}

/// Upsert every node, then every edge, then delete rows that left the
/// diagram (edges first). Assigned row ids are written into `diagram`
/// and `known` as soon as the store returns them, so a pass that fails
/// halfway never creates the same row twice.
pub async fn push<S: EntityStore>(
    diagram: &mut Diagram,
    store: &S,
    process: RecordId,
    known: &mut KnownRows,
) -> Result<PushStats, SyncError> {
    let mut stats = PushStats::default();

    let mut fresh = Vec::new();
    let mut fresh_rows = Vec::new();
    for node in diagram.nodes() {
        let row = NodeRow::from_node(node, process).to_row()?;
        match node.external_id {
            Some(ext) => {
                store.update(Entity::Node, &[ext], row).await?;
                stats.updated += 1;
            }
            None => {
                fresh.push(node.id);
                fresh_rows.push(row);
            }
        }
    }
    let created = create_rows(store, Entity::Node, fresh_rows).await?;
    for (id, ext) in fresh.into_iter().zip(created) {
        if let Some(mut node) = diagram.node_mut(id) {
            node.set_external_id(Some(ext));
        }
        known.nodes.insert(ext);
        stats.created += 1;
    }

    let mut fresh = Vec::new();
    let mut fresh_rows = Vec::new();
    for edge in diagram.edges() {
        let (Some(source), Some(target)) = (
            node_external(diagram, edge.source),
            node_external(diagram, edge.target),
        ) else {
            log::warn!("relational: edge {} has an endpoint without a row", edge.id);
            stats.skipped += 1;
            continue;
        };
        let row = EdgeRow::from_edge(edge, source, target, process).to_row()?;
        match edge.external_id {
            Some(ext) => {
                store.update(Entity::Edge, &[ext], row).await?;
                stats.updated += 1;
            }
            None => {
                fresh.push(edge.id);
                fresh_rows.push(row);
            }
        }
    }
    let created = create_rows(store, Entity::Edge, fresh_rows).await?;
    for (id, ext) in fresh.into_iter().zip(created) {
        if let Some(mut edge) = diagram.edge_mut(id) {
            edge.set_external_id(Some(ext));
        }
        known.edges.insert(ext);
        stats.created += 1;
    }

    let current = KnownRows::from_diagram(diagram);
    let stale: Vec<ExternalId> = known.edges.difference(&current.edges).copied().collect();
    if !stale.is_empty() {
        store.delete(Entity::Edge, &stale).await?;
        stats.deleted += stale.len();
        known.edges = current.edges.clone();
    }
    let stale: Vec<ExternalId> = known.nodes.difference(&current.nodes).copied().collect();
    if !stale.is_empty() {
        store.delete(Entity::Node, &stale).await?;
        stats.deleted += stale.len();
    }
    *known = current;

    log::debug!(
        "relational: pushed process {process}: {} created, {} updated, {} deleted",
        stats.created,
        stats.updated,
        stats.deleted
    );
    Ok(stats)
}
