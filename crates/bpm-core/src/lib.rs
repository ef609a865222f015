pub mod blob;
pub mod geometry;
pub mod id;
pub mod lint;
pub mod model;
pub mod repair;
pub mod viewport;

pub use blob::{BlobDocument, BlobError, Cell, EdgeCell, RawBlob, VertexCell, parse_blob};
pub use geometry::{ConnectionPoint, Point};
pub use id::{ElementId, ExternalId, IdKind, RecordId};
pub use lint::{LintDiagnostic, LintSeverity, lint_diagram};
pub use model::*;
pub use repair::{RepairAction, RepairReport, repair_cells};
pub use viewport::Viewport;
