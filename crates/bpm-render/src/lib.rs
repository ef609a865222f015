pub mod hit;
pub mod path;

pub use hit::{PointHit, find_connection_point_at, find_edge_at, find_node_at};
pub use path::{EdgeRoute, EdgeStyle, edge_route};
