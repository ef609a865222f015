//! Pure geometry helpers: node sizes, connection points, grid snapping
//! and two-point edge routes.

use crate::model::{Node, NodeKind, Side};
use serde::{Deserialize, Serialize};

/// A point in world (or screen) coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A docking location on a node's outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPoint {
    pub side: Side,
    pub point: Point,
}

/// Fixed width and height for each node kind.
pub fn dimensions_for(kind: NodeKind) -> (f32, f32) {
    match kind {
        NodeKind::Start | NodeKind::End => (50.0, 50.0),
        NodeKind::Task => (120.0, 80.0),
        NodeKind::Gateway => (60.0, 60.0),
    }
}

/// Dimensions by serialized shape name. Unknown shapes get task dimensions.
pub fn dimensions_for_shape(shape: &str) -> (f32, f32) {
    dimensions_for(NodeKind::parse(shape))
}

/// The connection point on one side of `node`.
///
/// Rectangular shapes dock on the midpoints of their bounding box edges.
/// Circular shapes (start/end) dock on their enclosing circle, with
/// radius `min(width, height) / 2` around the box centre.
pub fn connection_point(node: &Node, side: Side) -> Point {
    let c = node.bounds().center();
    let (hx, hy) = if node.kind.is_circular() {
        let r = node.width.min(node.height) / 2.0;
        (r, r)
    } else {
        (node.width / 2.0, node.height / 2.0)
    };
    match side {
        Side::Top => Point::new(c.x, c.y - hy),
        Side::Right => Point::new(c.x + hx, c.y),
        Side::Bottom => Point::new(c.x, c.y + hy),
        Side::Left => Point::new(c.x - hx, c.y),
    }
}

/// All four connection points in top, right, bottom, left order.
pub fn connection_points(node: &Node) -> [ConnectionPoint; 4] {
    Side::ALL.map(|side| ConnectionPoint {
        side,
        point: connection_point(node, side),
    })
}

/// The side whose connection point lies closest to `p`.
pub fn nearest_side(node: &Node, p: Point) -> Side {
    let mut best = (Side::Right, f32::INFINITY);
    for cp in connection_points(node) {
        let d = cp.point.distance(p);
        if d < best.1 {
            best = (cp.side, d);
        }
    }
    best.0
}

/// Round `value` to the nearest multiple of `grid` when snapping is enabled.
pub fn snap(value: f32, grid: f32, enabled: bool) -> f32 {
    if enabled && grid > 0.0 {
        (value / grid).round() * grid
    } else {
        value
    }
}

/// Elbow route between two points.
///
/// Horizontal-first when `|dx| > |dy|` strictly, bending at the mean x;
/// otherwise vertical-first, bending at the mean y.
pub fn orthogonal_path(source: Point, target: Point) -> [Point; 4] {
    let dx = target.x - source.x;
    let dy = target.y - source.y;
    if dx.abs() > dy.abs() {
        let mid_x = (source.x + target.x) / 2.0;
        [
            source,
            Point::new(mid_x, source.y),
            Point::new(mid_x, target.y),
            target,
        ]
    } else {
        let mid_y = (source.y + target.y) / 2.0;
        [
            source,
            Point::new(source.x, mid_y),
            Point::new(target.x, mid_y),
            target,
        ]
    }
}

/// Cubic curve `[start, c1, c2, end]` with both control points pushed
/// along x by `min(|dx|, |dy|) / 2`.
pub fn bezier_path(source: Point, target: Point) -> [Point; 4] {
    let offset = (target.x - source.x).abs().min((target.y - source.y).abs()) * 0.5;
    [
        source,
        Point::new(source.x + offset, source.y),
        Point::new(target.x - offset, target.y),
        target,
    ]
}
