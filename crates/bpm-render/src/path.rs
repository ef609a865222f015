//! Edge routes as polylines / cubic curves, exposed as `kurbo::BezPath`
//! for painting and as SVG `d` strings for the host's template.

use bpm_core::geometry::{self, Point};
use bpm_core::model::{Diagram, Edge};
use kurbo::{BezPath, ParamCurveNearest};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Accuracy passed to kurbo's nearest-point solver, in world units.
const NEAREST_ACCURACY: f64 = 1e-3;

/// How edges are routed between their connection points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    /// Elbow route through the midpoint of the dominant axis.
    #[default]
    Orthogonal,
    /// Single cubic curve.
    Bezier,
}

/// A routed edge (or the transient rubber band while connecting).
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRoute {
    pub style: EdgeStyle,
    /// Polyline vertices for orthogonal routes, `[start, c1, c2, end]`
    /// for bezier routes, `[start, end]` for a straight segment.
    pub points: SmallVec<[Point; 4]>,
}

impl EdgeRoute {
    /// Route from `source` to `target` in the given style.
    #[must_use]
    pub fn between(source: Point, target: Point, style: EdgeStyle) -> Self {
        let points = match style {
            EdgeStyle::Orthogonal => geometry::orthogonal_path(source, target),
            EdgeStyle::Bezier => geometry::bezier_path(source, target),
        };
        Self {
            style,
            points: SmallVec::from_buf(points),
        }
    }

    /// A straight segment, used for the rubber band.
    #[must_use]
    pub fn straight(source: Point, target: Point) -> Self {
        let mut points = SmallVec::new();
        points.push(source);
        points.push(target);
        Self {
            style: EdgeStyle::Orthogonal,
            points,
        }
    }

    pub fn start(&self) -> Option<Point> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<Point> {
        self.points.last().copied()
    }

    pub fn to_bez_path(&self) -> BezPath {
        let mut bez = BezPath::new();
        let Some((first, rest)) = self.points.split_first() else {
            return bez;
        };
        bez.move_to(kp(*first));
        match (self.style, rest) {
            (EdgeStyle::Bezier, [c1, c2, end]) => bez.curve_to(kp(*c1), kp(*c2), kp(*end)),
            _ => {
                for p in rest {
                    bez.line_to(kp(*p));
                }
            }
        }
        bez
    }

    /// SVG path data for the route.
    pub fn svg_d(&self) -> String {
        self.to_bez_path().to_svg()
    }

    /// Shortest distance from `p` to the drawn route.
    pub fn distance_to(&self, p: Point) -> f32 {
        let target = kp(p);
        self.to_bez_path()
            .segments()
            .map(|seg| seg.nearest(target, NEAREST_ACCURACY).distance_sq)
            .fold(f64::INFINITY, f64::min)
            .sqrt() as f32
    }
}

fn kp(p: Point) -> kurbo::Point {
    kurbo::Point::new(p.x as f64, p.y as f64)
}

/// Route for one edge from the endpoints' current geometry. `None` when an
/// endpoint is missing.
pub fn edge_route(diagram: &Diagram, edge: &Edge, style: EdgeStyle) -> Option<EdgeRoute> {
    let (source, target) = diagram.edge_endpoints(edge)?;
    Some(EdgeRoute::between(source, target, style))
}
