//! In-memory host collaborators shared by the integration tests.

#![allow(dead_code)]

use bpm_core::id::{ExternalId, RecordId};
use bpm_core::repair::external_id;
use bpm_editor::{
    EditorConfig, EditorSession, Entity, EntityStore, ListenerHost, ListenerScope, Notifier,
    NotifyLevel, RecordSource, Row, RowFilter, StoreError,
};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

pub type Session = EditorSession<FakeRecord, FakeStore, Toasts>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn relational() -> EditorConfig {
    EditorConfig {
        persistence: bpm_editor::PersistenceMode::Relational,
        ..EditorConfig::default()
    }
}

pub fn session(config: EditorConfig, record: FakeRecord, store: FakeStore) -> Session {
    EditorSession::new(config, record, store, Toasts::default()).expect("valid config")
}

/// A session mounted on an 800×600 canvas.
pub async fn mounted(
    config: EditorConfig,
    record: FakeRecord,
    store: FakeStore,
) -> (Session, Rc<ListenerTally>) {
    init_logging();
    let host = Rc::new(ListenerTally::default());
    let mut s = session(config, record, store);
    s.mount(host.clone(), 800.0, 600.0).await;
    (s, host)
}

// ─── Parent record ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRecord {
    fields: RefCell<HashMap<String, String>>,
    identity: Cell<Option<RecordId>>,
    writes: RefCell<Vec<(String, String)>>,
    fail_writes: Cell<bool>,
}

impl FakeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(self, name: &str, value: &str) -> Self {
        self.fields
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_identity(self, id: i64) -> Self {
        self.identity.set(Some(RecordId(id)));
        self
    }

    pub fn set_identity(&self, id: i64) {
        self.identity.set(Some(RecordId(id)));
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.set(on);
    }

    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn field_json(&self, name: &str) -> Value {
        let text = self.field(name).expect("field was written");
        serde_json::from_str(&text).expect("field holds JSON")
    }

    /// Field names written, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.borrow().iter().map(|(n, _)| n.clone()).collect()
    }
}

impl RecordSource for FakeRecord {
    fn field_value(&self, name: &str) -> Option<String> {
        self.field(name)
    }

    async fn update_field(&self, name: &str, value: String) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Backend("record is read-only".into()));
        }
        self.writes
            .borrow_mut()
            .push((name.to_string(), value.clone()));
        self.fields.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn current_identity(&self) -> Option<RecordId> {
        self.identity.get()
    }
}

// ─── Row store ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query(Entity),
    Create(Entity, Vec<Row>),
    Update(Entity, Vec<ExternalId>),
    Delete(Entity, Vec<ExternalId>),
}

pub struct FakeStore {
    nodes: RefCell<BTreeMap<ExternalId, Row>>,
    edges: RefCell<BTreeMap<ExternalId, Row>>,
    next_id: Cell<i64>,
    calls: RefCell<Vec<Call>>,
    reject_creates: Cell<Option<Entity>>,
    offline: Cell<bool>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            nodes: RefCell::default(),
            edges: RefCell::default(),
            next_id: Cell::new(100),
            calls: RefCell::default(),
            reject_creates: Cell::new(None),
            offline: Cell::new(false),
        }
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, entity: Entity) -> &RefCell<BTreeMap<ExternalId, Row>> {
        match entity {
            Entity::Node => &self.nodes,
            Entity::Edge => &self.edges,
        }
    }

    /// Insert a row as if another client had written it.
    pub fn seed(&self, entity: Entity, id: i64, row: Value) {
        let Value::Object(row) = row else {
            panic!("seed rows must be objects");
        };
        self.table(entity).borrow_mut().insert(ExternalId(id), row);
    }

    pub fn row(&self, entity: Entity, id: i64) -> Option<Row> {
        self.table(entity).borrow().get(&ExternalId(id)).cloned()
    }

    pub fn ids(&self, entity: Entity) -> Vec<i64> {
        self.table(entity).borrow().keys().map(|k| k.0).collect()
    }

    /// Reject every create for `entity` (or stop rejecting with `None`).
    pub fn reject_creates(&self, entity: Option<Entity>) {
        self.reject_creates.set(entity);
    }

    pub fn set_offline(&self, on: bool) {
        self.offline.set(on);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Row batches passed to `create` for `entity`.
    pub fn creates(&self, entity: Entity) -> Vec<Vec<Row>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Create(e, rows) if *e == entity => Some(rows.clone()),
                _ => None,
            })
            .collect()
    }

    fn position(&self, wanted: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(wanted)
    }

    pub fn delete_position(&self, entity: Entity) -> Option<usize> {
        self.position(|c| matches!(c, Call::Delete(e, _) if *e == entity))
    }

    pub fn create_position(&self, entity: Entity) -> Option<usize> {
        self.position(|c| matches!(c, Call::Create(e, _) if *e == entity))
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.get() {
            return Err(StoreError::Backend("connection refused".into()));
        }
        Ok(())
    }
}

impl EntityStore for FakeStore {
    async fn query(
        &self,
        entity: Entity,
        filter: &RowFilter,
        _fields: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        self.calls.borrow_mut().push(Call::Query(entity));
        self.check()?;
        let wanted = ExternalId(filter.process.0);
        Ok(self
            .table(entity)
            .borrow()
            .iter()
            .filter(|(_, row)| external_id(row.get("process_id")) == Some(wanted))
            .map(|(id, row)| {
                let mut row = row.clone();
                row.insert("id".into(), Value::from(id.0));
                row
            })
            .collect())
    }

    async fn create(&self, entity: Entity, rows: Vec<Row>) -> Result<Vec<ExternalId>, StoreError> {
        self.calls
            .borrow_mut()
            .push(Call::Create(entity, rows.clone()));
        self.check()?;
        if self.reject_creates.get() == Some(entity) {
            return Err(StoreError::Rejected(format!("{entity}: access denied")));
        }
        let mut table = self.table(entity).borrow_mut();
        Ok(rows
            .into_iter()
            .map(|row| {
                let id = ExternalId(self.next_id.get());
                self.next_id.set(id.0 + 1);
                table.insert(id, row);
                id
            })
            .collect())
    }

    async fn update(
        &self,
        entity: Entity,
        ids: &[ExternalId],
        patch: Row,
    ) -> Result<(), StoreError> {
        self.calls
            .borrow_mut()
            .push(Call::Update(entity, ids.to_vec()));
        self.check()?;
        let mut table = self.table(entity).borrow_mut();
        for id in ids {
            let row = table
                .get_mut(id)
                .ok_or_else(|| StoreError::Backend(format!("{entity} {} does not exist", id.0)))?;
            row.extend(patch.clone());
        }
        Ok(())
    }

    async fn delete(&self, entity: Entity, ids: &[ExternalId]) -> Result<(), StoreError> {
        self.calls
            .borrow_mut()
            .push(Call::Delete(entity, ids.to_vec()));
        self.check()?;
        let mut table = self.table(entity).borrow_mut();
        for id in ids {
            table.remove(id);
        }
        Ok(())
    }
}

// ─── Notifications ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct Toasts(RefCell<Vec<(String, NotifyLevel)>>);

impl Toasts {
    pub fn count(&self, level: NotifyLevel) -> usize {
        self.0.borrow().iter().filter(|(_, l)| *l == level).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl Notifier for Toasts {
    fn notify(&self, message: &str, level: NotifyLevel) {
        self.0.borrow_mut().push((message.to_string(), level));
    }
}

// ─── Listeners ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ListenerTally {
    active: RefCell<Vec<ListenerScope>>,
    attaches: Cell<usize>,
    detaches: Cell<usize>,
}

impl ListenerTally {
    pub fn active(&self) -> Vec<ListenerScope> {
        self.active.borrow().clone()
    }

    pub fn is_active(&self, scope: ListenerScope) -> bool {
        self.active.borrow().contains(&scope)
    }

    pub fn balanced(&self) -> bool {
        self.attaches.get() == self.detaches.get()
    }
}

impl ListenerHost for ListenerTally {
    fn attach(&self, scope: ListenerScope) {
        self.attaches.set(self.attaches.get() + 1);
        self.active.borrow_mut().push(scope);
    }

    fn detach(&self, scope: ListenerScope) {
        self.detaches.set(self.detaches.get() + 1);
        let mut active = self.active.borrow_mut();
        if let Some(i) = active.iter().position(|s| *s == scope) {
            active.remove(i);
        }
    }
}
