//! Collaborators supplied by the host application.
//!
//! The editor never talks to storage or UI chrome directly. The host hands
//! a [`RecordSource`] (the parent record's fields and identity), an
//! [`EntityStore`] (node/edge rows) and a [`Notifier`] (transient toasts)
//! to the session. Every storage call is fallible and asynchronous.

#![allow(async_fn_in_trait)]

use crate::error::StoreError;
use bpm_core::id::{ExternalId, RecordId};
use serde_json::{Map, Value, json};
use std::fmt;

/// One store row: field name → value.
pub type Row = Map<String, Value>;

/// The two row collections the relational mode writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Node,
    Edge,
}

impl Entity {
    /// Store model name.
    pub fn model(self) -> &'static str {
        match self {
            Entity::Node => "bpm.node",
            Entity::Edge => "bpm.edge",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model())
    }
}

/// Selects the rows owned by one parent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFilter {
    pub process: RecordId,
}

impl RowFilter {
    pub fn owned_by(process: RecordId) -> Self {
        Self { process }
    }

    /// Search domain form: `[["process_id", "=", id]]`.
    pub fn to_domain(&self) -> Value {
        json!([["process_id", "=", self.process.0]])
    }
}

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// The parent record the diagram belongs to.
pub trait RecordSource {
    /// Current value of a field, `None` when unset.
    fn field_value(&self, name: &str) -> Option<String>;

    async fn update_field(&self, name: &str, value: String) -> Result<(), StoreError>;

    /// Permanent identity, `None` until the parent is first saved.
    fn current_identity(&self) -> Option<RecordId>;
}

/// Row storage for the relational mode.
pub trait EntityStore {
    async fn query(
        &self,
        entity: Entity,
        filter: &RowFilter,
        fields: &[&str],
    ) -> Result<Vec<Row>, StoreError>;

    /// Create rows, returning their ids in input order.
    async fn create(&self, entity: Entity, rows: Vec<Row>) -> Result<Vec<ExternalId>, StoreError>;

    /// Write `patch` to every row in `ids`.
    async fn update(&self, entity: Entity, ids: &[ExternalId], patch: Row)
    -> Result<(), StoreError>;

    async fn delete(&self, entity: Entity, ids: &[ExternalId]) -> Result<(), StoreError>;
}

/// Transient notification sink (toasts).
pub trait Notifier {
    fn notify(&self, message: &str, level: NotifyLevel);
}

/// Store for blob-only deployments: holds no rows and accepts nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStore;

impl EntityStore for NoStore {
    async fn query(&self, _: Entity, _: &RowFilter, _: &[&str]) -> Result<Vec<Row>, StoreError> {
        Ok(Vec::new())
    }

    async fn create(&self, entity: Entity, _: Vec<Row>) -> Result<Vec<ExternalId>, StoreError> {
        Err(StoreError::Rejected(format!("no row store for {entity}")))
    }

    async fn update(&self, entity: Entity, _: &[ExternalId], _: Row) -> Result<(), StoreError> {
        Err(StoreError::Rejected(format!("no row store for {entity}")))
    }

    async fn delete(&self, entity: Entity, _: &[ExternalId]) -> Result<(), StoreError> {
        Err(StoreError::Rejected(format!("no row store for {entity}")))
    }
}
