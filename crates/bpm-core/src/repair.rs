//! Load-time repair of untrusted serialized cells.
//!
//! Cells may come from blobs written by older editors or left behind by
//! a partially failed sync. Repair never fails: it drops what cannot be
//! trusted, regenerates ids outside the generated namespace, rewrites
//! edge endpoints to follow regenerated ids, and drops orphans. The
//! result always satisfies the [`Diagram`] invariants.
//!
//! Repair is idempotent: repairing the cells of a repaired diagram
//! yields the same diagram with no actions.

use crate::geometry::{self, Point};
use crate::id::{ElementId, ExternalId, IdKind, RESERVED_DELIMITER, is_conventional, is_valid_raw};
use crate::model::{Diagram, Edge, ModelError, Node, NodeKind, Side};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ─── Report ──────────────────────────────────────────────────────────────

/// One change made while repairing.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairAction {
    /// Cell at `index` had no usable id.
    InvalidId { index: usize, id: Option<String> },
    /// Cell type was neither `vertex` nor `edge`.
    UnknownType { id: String },
    /// Edge endpoints were missing, not strings, or contained the delimiter.
    BadEndpoints { id: String },
    /// A later cell reused an id.
    DuplicateId { id: String },
    /// Id outside the generated namespace was replaced.
    Regenerated { from: String, to: ElementId },
    /// Edge endpoint could not be resolved to a node.
    Orphan { edge: String, endpoint: String },
    /// Edge connected a node to itself.
    SelfLoop { edge: ElementId },
    /// Edge repeated an existing (source, target) connection.
    DuplicateConnection { edge: ElementId },
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { index, id } => match id {
                Some(id) => write!(f, "dropped cell #{index} with invalid id `{id}`"),
                None => write!(f, "dropped cell #{index} without a string id"),
            },
            Self::UnknownType { id } => write!(f, "dropped cell `{id}` of unknown type"),
            Self::BadEndpoints { id } => write!(f, "dropped edge `{id}` with malformed endpoints"),
            Self::DuplicateId { id } => write!(f, "dropped duplicate cell `{id}`"),
            Self::Regenerated { from, to } => write!(f, "regenerated id `{from}` as `{to}`"),
            Self::Orphan { edge, endpoint } => {
                write!(f, "dropped orphan edge `{edge}` (missing node `{endpoint}`)")
            }
            Self::SelfLoop { edge } => write!(f, "dropped self-loop edge `{edge}`"),
            Self::DuplicateConnection { edge } => {
                write!(f, "dropped edge `{edge}` duplicating an existing connection")
            }
        }
    }
}

/// Outcome of [`repair_cells`].
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub diagram: Diagram,
    pub actions: Vec<RepairAction>,
}

impl RepairReport {
    /// True when the repaired diagram differs from the input and should be
    /// saved back.
    pub fn changed(&self) -> bool {
        !self.actions.is_empty()
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Repair raw cells into a valid diagram.
pub fn repair_cells(cells: &[Value]) -> RepairReport {
    let mut actions = Vec::new();

    // Steps 1-3: structural filtering.
    let mut seen = HashSet::new();
    let mut vertices: Vec<(&str, &Map<String, Value>)> = Vec::new();
    let mut edges: Vec<(&str, &Map<String, Value>, &str, &str)> = Vec::new();
    for (index, cell) in cells.iter().enumerate() {
        let Some(obj) = cell.as_object() else {
            record(&mut actions, RepairAction::InvalidId { index, id: None });
            continue;
        };
        let id = match obj.get("id") {
            Some(Value::String(id)) if is_valid_raw(id) => id.as_str(),
            Some(Value::String(id)) => {
                let id = Some(id.clone());
                record(&mut actions, RepairAction::InvalidId { index, id });
                continue;
            }
            _ => {
                record(&mut actions, RepairAction::InvalidId { index, id: None });
                continue;
            }
        };
        let kind = obj.get("type").and_then(Value::as_str);
        if !matches!(kind, Some("vertex" | "edge")) {
            let id = id.to_string();
            record(&mut actions, RepairAction::UnknownType { id });
            continue;
        }
        if !seen.insert(id) {
            let id = id.to_string();
            record(&mut actions, RepairAction::DuplicateId { id });
            continue;
        }
        if kind == Some("vertex") {
            vertices.push((id, obj));
            continue;
        }
        match (endpoint(obj, "source"), endpoint(obj, "target")) {
            (Some(s), Some(t)) => edges.push((id, obj, s, t)),
            _ => {
                let id = id.to_string();
                record(&mut actions, RepairAction::BadEndpoints { id });
            }
        }
    }

    // Step 4: regenerate ids outside the namespace, remembering the mapping.
    let mut diagram = Diagram::new();
    let mut node_ids: HashMap<&str, ElementId> = HashMap::new();
    for (raw, obj) in vertices {
        let id = conform(raw, IdKind::Node, &mut actions);
        node_ids.insert(raw, id);
        let node = vertex_from(id, obj);
        if let Err(e) = diagram.add_node(node) {
            log::warn!("repair: unexpected node rejection: {e}");
        }
    }

    // Steps 5-6: resolve endpoints through the mapping and drop orphans.
    // Delimiter-bearing endpoints were already discarded in step 3.
    for (raw, obj, source, target) in edges {
        let Some(source_id) = resolve(source, &node_ids) else {
            let (edge, endpoint) = (raw.to_string(), source.to_string());
            record(&mut actions, RepairAction::Orphan { edge, endpoint });
            continue;
        };
        let Some(target_id) = resolve(target, &node_ids) else {
            let (edge, endpoint) = (raw.to_string(), target.to_string());
            record(&mut actions, RepairAction::Orphan { edge, endpoint });
            continue;
        };
        let id = conform(raw, IdKind::Edge, &mut actions);
        let edge = edge_from(id, source_id, target_id, obj, &diagram);
        match diagram.add_edge(edge) {
            Ok(()) => {}
            Err(ModelError::SelfLoop(edge)) => {
                record(&mut actions, RepairAction::SelfLoop { edge });
            }
            Err(ModelError::DuplicateEdge { .. }) => {
                record(&mut actions, RepairAction::DuplicateConnection { edge: id });
            }
            Err(e) => log::warn!("repair: unexpected edge rejection: {e}"),
        }
    }

    if !actions.is_empty() {
        log::debug!(
            "repair: {} action(s), {} node(s) and {} edge(s) kept",
            actions.len(),
            diagram.nodes().len(),
            diagram.edges().len()
        );
    }
    RepairReport { diagram, actions }
}

// ─── Helpers ──────────────────────────────────────────────────────────────

fn record(actions: &mut Vec<RepairAction>, action: RepairAction) {
    log::warn!("repair: {action}");
    actions.push(action);
}

fn endpoint<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() && !s.contains(RESERVED_DELIMITER) => Some(s),
        _ => None,
    }
}

fn conform(raw: &str, kind: IdKind, actions: &mut Vec<RepairAction>) -> ElementId {
    if is_conventional(raw, kind) {
        return ElementId::intern(raw);
    }
    let to = ElementId::generate(kind);
    let from = raw.to_string();
    record(actions, RepairAction::Regenerated { from, to });
    to
}

/// Endpoints carrying the delimiter never get here (see [`endpoint`]), so
/// the lookup through the step-4 mapping is exact.
fn resolve(raw: &str, node_ids: &HashMap<&str, ElementId>) -> Option<ElementId> {
    node_ids.get(raw).copied()
}

/// Number from a JSON number or numeric string.
pub(crate) fn number(v: Option<&Value>) -> Option<f32> {
    match v? {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f32| f.is_finite())
}

/// Row id from an integer, a numeric string or a `[id, display_name]` pair.
pub fn external_id(v: Option<&Value>) -> Option<ExternalId> {
    match v? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        _ => None,
    }
    .filter(|id| *id > 0)
    .map(ExternalId)
}

fn string(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str).map(str::to_string)
}

fn vertex_from(id: ElementId, obj: &Map<String, Value>) -> Node {
    let kind = obj
        .get("shape")
        .and_then(Value::as_str)
        .map_or(NodeKind::Task, NodeKind::parse);
    let (default_w, default_h) = geometry::dimensions_for(kind);
    let x = number(obj.get("x")).unwrap_or(0.0);
    let y = number(obj.get("y")).unwrap_or(0.0);
    let mut node = Node::new(id, kind, x, y);
    node.width = number(obj.get("width"))
        .filter(|w| *w > 0.0)
        .unwrap_or(default_w);
    node.height = number(obj.get("height"))
        .filter(|h| *h > 0.0)
        .unwrap_or(default_h);
    node.label = string(obj.get("label")).unwrap_or_default();
    node.external_id = external_id(obj.get("externalId"));
    node
}

fn point(v: Option<&Value>) -> Option<Point> {
    let obj = v?.as_object()?;
    Some(Point::new(number(obj.get("x"))?, number(obj.get("y"))?))
}

/// Cached points map back to the nearest side; the defaults stay implicit.
fn side_from(
    v: Option<&Value>,
    node: ElementId,
    diagram: &Diagram,
    default: Side,
) -> Option<Side> {
    let p = point(v)?;
    let side = geometry::nearest_side(diagram.node_by_id(node)?, p);
    (side != default).then_some(side)
}

fn edge_from(
    id: ElementId,
    source: ElementId,
    target: ElementId,
    obj: &Map<String, Value>,
    diagram: &Diagram,
) -> Edge {
    let mut edge = Edge::new(id, source, target);
    edge.source_side = side_from(obj.get("sourcePoint"), source, diagram, Side::Right);
    edge.target_side = side_from(obj.get("targetPoint"), target, diagram, Side::Left);
    edge.label = string(obj.get("label")).unwrap_or_default();
    edge.condition = string(obj.get("condition")).filter(|c| !c.is_empty());
    if let Some(seq) = obj.get("sequence").and_then(Value::as_i64) {
        edge.sequence = i32::try_from(seq).unwrap_or(edge.sequence);
    }
    edge.external_id = external_id(obj.get("externalId"));
    edge
}
