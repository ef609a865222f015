pub mod config;
pub mod error;
pub mod host;
pub mod input;
pub mod interaction;
pub mod listeners;
pub mod pending;
pub mod relational;
pub mod session;
pub mod shortcuts;
pub mod sync;

pub use config::{DragPersistence, EdgeStyle, EditorConfig, EmptyCanvasDrag, PanTrigger, PersistenceMode};
pub use error::{ConfigError, StoreError, SyncError};
pub use host::{Entity, EntityStore, Notifier, NotifyLevel, RecordSource, Row, RowFilter};
pub use input::{InputEvent, Modifiers, PointerButton};
pub use interaction::{EditorCommand, Interaction, InteractionState};
pub use listeners::{ListenerGuard, ListenerHost, ListenerScope};
pub use session::EditorSession;
pub use sync::{DiagramMutation, LoadOutcome, LoadSource, SaveOutcome, SyncEngine};
