//! Inline blob format: the whole diagram serialized into one field value.
//!
//! The canonical shape is `{cells:[...], version:"1.0"}` where each cell is
//! tagged `"type": "vertex" | "edge"`. The older `{nodes:[...], edges:[...]}`
//! shape is accepted on load and written as a derived cache in relational
//! mode.
//!
//! Decoding is split in two: [`parse_blob`] only extracts untyped cell
//! values, so the repair pass can inspect fields that would fail typed
//! deserialization.

use crate::geometry::Point;
use crate::id::{ElementId, ExternalId};
use crate::model::{Diagram, NodeKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const BLOB_VERSION: &str = "1.0";

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("unrecognised blob shape: {0}")]
    Shape(String),
}

// ─── Typed cells ─────────────────────────────────────────────────────────

/// One serialized diagram element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Cell {
    Vertex(VertexCell),
    Edge(EdgeCell),
}

impl Cell {
    pub fn id(&self) -> ElementId {
        match self {
            Cell::Vertex(v) => v.id,
            Cell::Edge(e) => e.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexCell {
    pub id: ElementId,
    pub shape: NodeKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<ExternalId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCell {
    pub id: ElementId,
    pub source: ElementId,
    pub target: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_point: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_point: Option<Point>,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<ExternalId>,
}

/// The versioned blob document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobDocument {
    pub cells: Vec<Cell>,
    pub version: String,
}

// ─── Encoding ────────────────────────────────────────────────────────────

/// Convert a diagram into cells, nodes first. Edge points are written from
/// the endpoints' current geometry.
pub fn to_cells(diagram: &Diagram) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(diagram.nodes().len() + diagram.edges().len());
    for n in diagram.nodes() {
        cells.push(Cell::Vertex(VertexCell {
            id: n.id,
            shape: n.kind,
            x: n.x,
            y: n.y,
            width: n.width,
            height: n.height,
            label: n.label.clone(),
            external_id: n.external_id,
        }));
    }
    for e in diagram.edges() {
        let points = diagram.edge_endpoints(e);
        cells.push(Cell::Edge(EdgeCell {
            id: e.id,
            source: e.source,
            target: e.target,
            source_point: points.map(|(s, _)| s),
            target_point: points.map(|(_, t)| t),
            label: e.label.clone(),
            condition: e.condition.clone(),
            sequence: Some(e.sequence),
            external_id: e.external_id,
        }));
    }
    cells
}

#[must_use]
pub fn to_document(diagram: &Diagram) -> BlobDocument {
    BlobDocument {
        cells: to_cells(diagram),
        version: BLOB_VERSION.to_string(),
    }
}

/// Serialize a diagram as a `{cells, version}` string.
pub fn encode(diagram: &Diagram) -> Result<String, BlobError> {
    Ok(serde_json::to_string(&to_document(diagram))?)
}

/// Serialize a diagram in the legacy `{nodes, edges}` shape.
pub fn encode_legacy(diagram: &Diagram) -> Result<String, BlobError> {
    let nodes: Vec<Value> = diagram
        .nodes()
        .iter()
        .map(|n| {
            json!({
                "id": n.id,
                "recordId": n.external_id,
                "name": n.label,
                "type": n.kind,
                "x": n.x,
                "y": n.y,
            })
        })
        .collect();
    let edges: Vec<Value> = diagram
        .edges()
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "recordId": e.external_id,
                "source": e.source,
                "target": e.target,
                "name": e.label,
                "condition": e.condition.clone().unwrap_or_default(),
                "sequence": e.sequence,
            })
        })
        .collect();
    Ok(serde_json::to_string(&json!({ "nodes": nodes, "edges": edges }))?)
}

// ─── Decoding ────────────────────────────────────────────────────────────

/// Untyped cells extracted from a stored blob, ready for repair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBlob {
    pub cells: Vec<Value>,
    /// Whether the input used the legacy `{nodes, edges}` shape.
    pub legacy: bool,
}

impl RawBlob {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Extract raw cells from a stored field value.
///
/// Blank input yields no cells. A bare top-level array is read as a cell
/// list. Anything else that is not one of the two known shapes is an error.
pub fn parse_blob(text: &str) -> Result<RawBlob, BlobError> {
    if text.trim().is_empty() {
        return Ok(RawBlob::default());
    }
    match serde_json::from_str::<Value>(text)? {
        Value::Array(cells) => Ok(RawBlob {
            cells,
            legacy: false,
        }),
        Value::Object(obj) => parse_object(obj),
        Value::Null => Ok(RawBlob::default()),
        other => Err(BlobError::Shape(format!("expected an object, got {other}"))),
    }
}

fn parse_object(mut obj: Map<String, Value>) -> Result<RawBlob, BlobError> {
    if let Some(cells) = obj.remove("cells") {
        return match cells {
            Value::Array(cells) => Ok(RawBlob {
                cells,
                legacy: false,
            }),
            Value::Null => Ok(RawBlob::default()),
            _ => Err(BlobError::Shape("`cells` is not an array".into())),
        };
    }
    if obj.contains_key("nodes") || obj.contains_key("edges") {
        let mut cells = Vec::new();
        if let Some(Value::Array(nodes)) = obj.remove("nodes") {
            cells.extend(nodes.into_iter().map(legacy_node_to_cell));
        }
        if let Some(Value::Array(edges)) = obj.remove("edges") {
            cells.extend(edges.into_iter().map(legacy_edge_to_cell));
        }
        return Ok(RawBlob {
            cells,
            legacy: true,
        });
    }
    if obj.is_empty() {
        return Ok(RawBlob::default());
    }
    Err(BlobError::Shape(
        "expected `cells` or `nodes`/`edges` keys".into(),
    ))
}

fn take(obj: &mut Map<String, Value>, key: &str) -> Value {
    obj.remove(key).unwrap_or(Value::Null)
}

fn legacy_node_to_cell(value: Value) -> Value {
    let Value::Object(mut n) = value else {
        return value;
    };
    let mut cell = Map::new();
    cell.insert("id".into(), take(&mut n, "id"));
    cell.insert("type".into(), Value::from("vertex"));
    cell.insert("shape".into(), take(&mut n, "type"));
    cell.insert("x".into(), take(&mut n, "x"));
    cell.insert("y".into(), take(&mut n, "y"));
    cell.insert("label".into(), take(&mut n, "name"));
    cell.insert("externalId".into(), take(&mut n, "recordId"));
    Value::Object(cell)
}

fn legacy_edge_to_cell(value: Value) -> Value {
    let Value::Object(mut e) = value else {
        return value;
    };
    let mut cell = Map::new();
    cell.insert("id".into(), take(&mut e, "id"));
    cell.insert("type".into(), Value::from("edge"));
    cell.insert("source".into(), take(&mut e, "source"));
    cell.insert("target".into(), take(&mut e, "target"));
    cell.insert("label".into(), take(&mut e, "name"));
    cell.insert("condition".into(), take(&mut e, "condition"));
    cell.insert("sequence".into(), take(&mut e, "sequence"));
    cell.insert("externalId".into(), take(&mut e, "recordId"));
    Value::Object(cell)
}
