//! Hit testing: world point → node, connection point or edge.
//!
//! Later elements are painted on top, so every probe walks the diagram
//! in reverse order and returns the first match.

use crate::path::{EdgeStyle, edge_route};
use bpm_core::geometry::{self, Point};
use bpm_core::id::ElementId;
use bpm_core::model::{Diagram, Node, Side};

/// A connection point under the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointHit {
    pub node: ElementId,
    pub side: Side,
    pub point: Point,
    pub distance: f32,
}

/// Find the topmost node whose bounding box contains `(px, py)`.
/// Returns `None` if no node is hit (background).
pub fn find_node_at(diagram: &Diagram, px: f32, py: f32) -> Option<ElementId> {
    diagram
        .nodes()
        .iter()
        .rev()
        .find(|n| n.contains(px, py))
        .map(|n| n.id)
}

/// Find the topmost node with a connection point within `threshold` of
/// `(px, py)`, returning that node's nearest point.
pub fn find_connection_point_at(
    diagram: &Diagram,
    px: f32,
    py: f32,
    threshold: f32,
) -> Option<PointHit> {
    find_connection_point_where(diagram, px, py, threshold, |_| true)
}

/// Like [`find_connection_point_at`], skipping nodes rejected by `accept`
/// (e.g. the source node while connecting).
pub fn find_connection_point_where(
    diagram: &Diagram,
    px: f32,
    py: f32,
    threshold: f32,
    accept: impl Fn(&Node) -> bool,
) -> Option<PointHit> {
    let cursor = Point::new(px, py);
    diagram
        .nodes()
        .iter()
        .rev()
        .filter(|n| accept(*n))
        .find_map(|n| nearest_point_on(n, cursor, threshold))
}

fn nearest_point_on(node: &Node, cursor: Point, threshold: f32) -> Option<PointHit> {
    geometry::connection_points(node)
        .into_iter()
        .map(|cp| PointHit {
            node: node.id,
            side: cp.side,
            point: cp.point,
            distance: cp.point.distance(cursor),
        })
        .filter(|hit| hit.distance <= threshold)
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Find the topmost edge whose drawn route passes within `threshold` of
/// `(px, py)`.
pub fn find_edge_at(
    diagram: &Diagram,
    px: f32,
    py: f32,
    threshold: f32,
    style: EdgeStyle,
) -> Option<ElementId> {
    let cursor = Point::new(px, py);
    let hit = diagram.edges().iter().rev().find(|e| {
        edge_route(diagram, e, style).is_some_and(|route| route.distance_to(cursor) <= threshold)
    });
    if let Some(e) = hit {
        log::trace!("edge hit {} at ({px}, {py})", e.id);
    }
    hit.map(|e| e.id)
}
