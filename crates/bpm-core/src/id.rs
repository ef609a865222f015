use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Process-wide interner backing every [`ElementId`].
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Delimiter reserved by the legacy multi-value encoding. Never valid inside an id.
pub const RESERVED_DELIMITER: char = ',';

/// Prefix of generated node ids.
pub const NODE_PREFIX: &str = "bpm_cell_";

/// Prefix of generated edge ids.
pub const EDGE_PREFIX: &str = "bpm_edge_";

/// Length of the short hex ids the entity store assigns to rows created
/// outside the canvas.
pub const STORE_ID_LEN: usize = 8;

/// Shortest id accepted from serialized input.
pub const MIN_ID_LEN: usize = 3;

/// Interned id of a node or edge. Copies and compares as a `Spur` index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(Spur);

impl ElementId {
    /// Intern a string as an ElementId, or return existing if already interned.
    pub fn intern(s: &str) -> Self {
        ElementId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Fresh node id: `bpm_cell_<uuid>`.
    pub fn new_node() -> Self {
        Self::generate(IdKind::Node)
    }

    /// Fresh edge id: `bpm_edge_<uuid>`.
    pub fn new_edge() -> Self {
        Self::generate(IdKind::Edge)
    }

    /// Generate a unique id in the namespace of `kind`.
    pub fn generate(kind: IdKind) -> Self {
        let uuid = uuid::Uuid::new_v4();
        Self::intern(&format!("{}{}", kind.prefix(), uuid.simple()))
    }

    /// True when the id has the generated shape for `kind`.
    pub fn is_conventional(&self, kind: IdKind) -> bool {
        is_conventional(self.as_str(), kind)
    }
}

/// Which namespace a generated id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Node,
    Edge,
}

impl IdKind {
    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::Node => NODE_PREFIX,
            IdKind::Edge => EDGE_PREFIX,
        }
    }
}

/// Structural validity of a raw id string: long enough, no reserved delimiter.
pub fn is_valid_raw(id: &str) -> bool {
    id.chars().count() >= MIN_ID_LEN && !id.contains(RESERVED_DELIMITER)
}

/// Whether `id` is kept as-is on load: the kind's prefix followed by a
/// 32-digit lowercase hex uuid (see [`ElementId::generate`]), or an
/// 8-digit lowercase hex id assigned by the entity store.
pub fn is_conventional(id: &str, kind: IdKind) -> bool {
    let generated = id
        .strip_prefix(kind.prefix())
        .is_some_and(|rest| rest.len() == 32 && is_lower_hex(rest));
    generated || (id.len() == STORE_ID_LEN && is_lower_hex(id))
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ElementId::intern(&s))
    }
}

/// Row identifier assigned by the external entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(pub i64);

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permanent identity of the parent record that owns a diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
