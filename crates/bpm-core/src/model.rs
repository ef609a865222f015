//! In-memory diagram model for BPM process graphs.
//!
//! A diagram is an ordered list of nodes (process steps) and directed
//! edges (transitions). Order only matters for hit testing: later
//! elements are on top. Ids are unique across nodes and edges, and every
//! edge references two existing, distinct nodes.

use crate::geometry::{self, Point};
use crate::id::{ElementId, ExternalId, is_valid_raw};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

// ─── Errors ──────────────────────────────────────────────────────────────

/// Structural violation rejected by a [`Diagram`] mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("element id `{0}` is already in use")]
    DuplicateId(ElementId),
    #[error("node `{0}` does not exist")]
    UnknownNode(ElementId),
    #[error("edge `{0}` would connect a node to itself")]
    SelfLoop(ElementId),
    #[error("a connection from `{from}` to `{to}` already exists")]
    DuplicateEdge { from: ElementId, to: ElementId },
    #[error("invalid element id `{0}`")]
    InvalidId(String),
}

// ─── Node kinds & sides ──────────────────────────────────────────────────

/// The four fixed node shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Task,
    Gateway,
    End,
}

impl NodeKind {
    /// Lenient parse: unknown or missing shapes are treated as tasks.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "gateway" | "decision" => Self::Gateway,
            "end" => Self::End,
            _ => Self::Task,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Task => "task",
            Self::Gateway => "gateway",
            Self::End => "end",
        }
    }

    /// Label given to freshly created nodes.
    pub fn default_label(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Task => "Task",
            Self::Gateway => "Decision",
            Self::End => "End",
        }
    }

    /// Start and end events are drawn as circles.
    pub fn is_circular(self) -> bool {
        matches!(self, Self::Start | Self::End)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a node an edge docks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Top, Side::Right, Side::Bottom, Side::Left];
}

// ─── Bounds ──────────────────────────────────────────────────────────────

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// AABB overlap with another rectangle.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

// ─── Nodes & edges ───────────────────────────────────────────────────────

/// A process step placed on the canvas. `x`/`y` is the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: ElementId,
    pub kind: NodeKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: String,
    /// Row id in the entity store, absent until the first successful sync.
    pub external_id: Option<ExternalId>,
}

impl Node {
    /// A node of `kind` at `(x, y)` with the kind's fixed size and default label.
    #[must_use]
    pub fn new(id: ElementId, kind: NodeKind, x: f32, y: f32) -> Self {
        let (width, height) = geometry::dimensions_for(kind);
        Self {
            id,
            kind,
            x,
            y,
            width,
            height,
            label: kind.default_label().to_string(),
            external_id: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        self.bounds().contains(px, py)
    }
}

/// A directed transition between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: ElementId,
    pub source: ElementId,
    pub target: ElementId,
    /// Docking side on the source node; `None` means the default (right).
    pub source_side: Option<Side>,
    /// Docking side on the target node; `None` means the default (left).
    pub target_side: Option<Side>,
    pub label: String,
    pub condition: Option<String>,
    pub sequence: i32,
    pub external_id: Option<ExternalId>,
}

impl Edge {
    #[must_use]
    pub fn new(id: ElementId, source: ElementId, target: ElementId) -> Self {
        Self {
            id,
            source,
            target,
            source_side: None,
            target_side: None,
            label: String::new(),
            condition: None,
            sequence: 10,
            external_id: None,
        }
    }

    #[must_use]
    pub fn with_sides(mut self, source_side: Side, target_side: Side) -> Self {
        self.source_side = Some(source_side);
        self.target_side = Some(target_side);
        self
    }

    /// Dock on the given sides, leaving the defaults (source right, target
    /// left) implicit so the edge matches its reloaded form.
    #[must_use]
    pub fn docked(mut self, source_side: Side, target_side: Side) -> Self {
        self.source_side = (source_side != Side::Right).then_some(source_side);
        self.target_side = (target_side != Side::Left).then_some(target_side);
        self
    }

    pub fn touches(&self, node: ElementId) -> bool {
        self.source == node || self.target == node
    }
}

// ─── Write access ────────────────────────────────────────────────────────

/// Mutable handle on a node inside a [`Diagram`]. Reads go through
/// `Deref`; writes are limited to attributes that leave the id index and
/// edge references valid.
#[derive(Debug)]
pub struct NodeMut<'a>(&'a mut Node);

impl Deref for NodeMut<'_> {
    type Target = Node;

    fn deref(&self) -> &Node {
        self.0
    }
}

impl NodeMut<'_> {
    /// Returns whether the node moved.
    pub fn set_position(&mut self, x: f32, y: f32) -> bool {
        if self.0.x == x && self.0.y == y {
            return false;
        }
        self.0.x = x;
        self.0.y = y;
        true
    }

    /// Returns whether the label changed.
    pub fn set_label(&mut self, label: String) -> bool {
        if self.0.label == label {
            return false;
        }
        self.0.label = label;
        true
    }

    pub fn set_external_id(&mut self, external_id: Option<ExternalId>) {
        self.0.external_id = external_id;
    }
}

/// Mutable handle on an edge inside a [`Diagram`]. Id and endpoints are
/// fixed once the edge is added.
#[derive(Debug)]
pub struct EdgeMut<'a>(&'a mut Edge);

impl Deref for EdgeMut<'_> {
    type Target = Edge;

    fn deref(&self) -> &Edge {
        self.0
    }
}

impl EdgeMut<'_> {
    pub fn set_external_id(&mut self, external_id: Option<ExternalId>) {
        self.0.external_id = external_id;
    }
}

// ─── Diagram ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Node(usize),
    Edge(usize),
}

/// Ordered nodes and edges plus an id index.
#[derive(Debug, Clone, Default)]
pub struct Diagram {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<ElementId, Slot>,
}

impl PartialEq for Diagram {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl Diagram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node_by_id(&self, id: ElementId) -> Option<&Node> {
        match self.index.get(&id) {
            Some(Slot::Node(i)) => self.nodes.get(*i),
            _ => None,
        }
    }

    pub fn node_mut(&mut self, id: ElementId) -> Option<NodeMut<'_>> {
        match self.index.get(&id) {
            Some(Slot::Node(i)) => self.nodes.get_mut(*i).map(NodeMut),
            _ => None,
        }
    }

    pub fn edge_by_id(&self, id: ElementId) -> Option<&Edge> {
        match self.index.get(&id) {
            Some(Slot::Edge(i)) => self.edges.get(*i),
            _ => None,
        }
    }

    pub fn edge_mut(&mut self, id: ElementId) -> Option<EdgeMut<'_>> {
        match self.index.get(&id) {
            Some(Slot::Edge(i)) => self.edges.get_mut(*i).map(EdgeMut),
            _ => None,
        }
    }

    /// Append a node on top of everything else.
    pub fn add_node(&mut self, node: Node) -> Result<(), ModelError> {
        if !is_valid_raw(node.id.as_str()) {
            return Err(ModelError::InvalidId(node.id.as_str().to_string()));
        }
        if self.contains(node.id) {
            return Err(ModelError::DuplicateId(node.id));
        }
        self.index.insert(node.id, Slot::Node(self.nodes.len()));
        self.nodes.push(node);
        Ok(())
    }

    /// Append an edge. Endpoints must exist and differ, and the
    /// (source, target) pair must not already be connected.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), ModelError> {
        if !is_valid_raw(edge.id.as_str()) {
            return Err(ModelError::InvalidId(edge.id.as_str().to_string()));
        }
        if self.contains(edge.id) {
            return Err(ModelError::DuplicateId(edge.id));
        }
        for endpoint in [edge.source, edge.target] {
            if self.node_by_id(endpoint).is_none() {
                return Err(ModelError::UnknownNode(endpoint));
            }
        }
        if edge.source == edge.target {
            return Err(ModelError::SelfLoop(edge.id));
        }
        if self.has_connection(edge.source, edge.target) {
            return Err(ModelError::DuplicateEdge {
                from: edge.source,
                to: edge.target,
            });
        }
        self.index.insert(edge.id, Slot::Edge(self.edges.len()));
        self.edges.push(edge);
        Ok(())
    }

    /// Remove a node and every edge that references it. Returns the node
    /// and the cascaded edges, or `None` if `id` is not a node.
    pub fn remove_node(&mut self, id: ElementId) -> Option<(Node, Vec<Edge>)> {
        let Some(Slot::Node(i)) = self.index.get(&id).copied() else {
            return None;
        };
        let node = self.nodes.remove(i);
        let (removed, kept): (Vec<Edge>, Vec<Edge>) =
            std::mem::take(&mut self.edges).into_iter().partition(|e| e.touches(id));
        self.edges = kept;
        self.rebuild_index();
        Some((node, removed))
    }

    pub fn remove_edge(&mut self, id: ElementId) -> Option<Edge> {
        let Some(Slot::Edge(i)) = self.index.get(&id).copied() else {
            return None;
        };
        let edge = self.edges.remove(i);
        self.rebuild_index();
        Some(edge)
    }

    /// Remove a node or edge, whichever `id` names.
    pub fn remove(&mut self, id: ElementId) -> bool {
        match self.index.get(&id) {
            Some(Slot::Node(_)) => self.remove_node(id).is_some(),
            Some(Slot::Edge(_)) => self.remove_edge(id).is_some(),
            None => false,
        }
    }

    pub fn has_connection(&self, source: ElementId, target: ElementId) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    /// Edges touching `node`, in diagram order.
    pub fn edges_of(&self, node: ElementId) -> SmallVec<[&Edge; 4]> {
        self.edges.iter().filter(|e| e.touches(node)).collect()
    }

    /// Resolved start and end coordinates of an edge, from the endpoints'
    /// current geometry. Defaults to source-right and target-left.
    pub fn edge_endpoints(&self, edge: &Edge) -> Option<(Point, Point)> {
        let source = self.node_by_id(edge.source)?;
        let target = self.node_by_id(edge.target)?;
        Some((
            geometry::connection_point(source, edge.source_side.unwrap_or(Side::Right)),
            geometry::connection_point(target, edge.target_side.unwrap_or(Side::Left)),
        ))
    }

    /// Bounding box of every node, or `None` for a diagram without nodes.
    pub fn extent(&self) -> Option<Bounds> {
        let first = self.nodes.first()?.bounds();
        let (mut x0, mut y0) = (first.x, first.y);
        let (mut x1, mut y1) = (first.x + first.width, first.y + first.height);
        for n in &self.nodes[1..] {
            x0 = x0.min(n.x);
            y0 = y0.min(n.y);
            x1 = x1.max(n.x + n.width);
            y1 = y1.max(n.y + n.height);
        }
        Some(Bounds {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.index.clear();
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, n) in self.nodes.iter().enumerate() {
            self.index.insert(n.id, Slot::Node(i));
        }
        for (i, e) in self.edges.iter().enumerate() {
            self.index.insert(e.id, Slot::Edge(i));
        }
    }
}
