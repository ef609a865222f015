//! Integration tests: relational persistence through a mounted session.
//!
//! Rows are the canonical store here. Covers hydration, upserts, stale
//! row deletion order, the pending buffer used before the parent record
//! has an identity, and failures reported without rolling back the canvas.

mod common;

use bpm_core::geometry::Point;
use bpm_core::id::ExternalId;
use bpm_core::model::NodeKind;
use bpm_editor::{Entity, Modifiers, NotifyLevel, PointerButton};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const A: &str = "bpm_cell_0000000000000000000000000000000a";
const B: &str = "bpm_cell_0000000000000000000000000000000b";
const C: &str = "bpm_cell_0000000000000000000000000000000c";
const AB: &str = "bpm_edge_00000000000000000000000000000a0b";
const BC: &str = "bpm_edge_00000000000000000000000000000b0c";

/// Start (1) → Task (2) → End (3) for process 7, plus a row of process 8.
fn seeded_store() -> FakeStore {
    let store = FakeStore::new();
    store.seed(
        Entity::Node,
        1,
        json!({"name": "Begin", "node_type": "start", "position_x": 0, "position_y": 15, "node_id": A, "process_id": [7, "Onboarding"]}),
    );
    store.seed(
        Entity::Node,
        2,
        json!({"name": "Collect documents", "node_type": "task", "position_x": 200, "position_y": 0, "node_id": B, "process_id": 7}),
    );
    store.seed(
        Entity::Node,
        3,
        json!({"name": "Done", "node_type": "end", "position_x": 400, "position_y": 15, "node_id": C, "process_id": 7}),
    );
    store.seed(
        Entity::Node,
        4,
        json!({"name": "Unrelated", "node_type": "task", "position_x": 0, "position_y": 0, "node_id": false, "process_id": 8}),
    );
    store.seed(
        Entity::Edge,
        10,
        json!({"name": false, "condition": false, "sequence": 10, "source_node_id": [1, "Begin"], "target_node_id": [2, "Collect documents"], "edge_id": AB, "process_id": 7}),
    );
    store.seed(
        Entity::Edge,
        11,
        json!({"name": "", "sequence": 20, "source_node_id": 2, "target_node_id": 3, "edge_id": BC, "process_id": 7}),
    );
    store
}

fn external_ids(s: &Session) -> Vec<Option<i64>> {
    s.diagram()
        .nodes()
        .iter()
        .map(|n| n.external_id.map(|e| e.0))
        .collect()
}

// ─── Load ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn rows_hydrate_the_diagram() {
    let record = FakeRecord::new().with_identity(7);
    let (s, _host) = mounted(relational(), record, seeded_store()).await;

    let ids: Vec<&str> = s.diagram().nodes().iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec![A, B, C]);
    assert_eq!(external_ids(&s), vec![Some(1), Some(2), Some(3)]);
    let edges: Vec<(&str, i32)> = s
        .diagram()
        .edges()
        .iter()
        .map(|e| (e.id.as_str(), e.sequence))
        .collect();
    assert_eq!(edges, vec![(AB, 10), (BC, 20)]);
    assert_eq!(s.diagram().edges()[0].label, "");
    assert!(!s.has_deferred_save());
    assert!(s.record().writes().is_empty());
}

#[tokio::test]
async fn no_identity_means_an_empty_canvas() {
    let (s, _host) = mounted(relational(), FakeRecord::new(), seeded_store()).await;
    assert!(s.diagram().is_empty());
    assert!(s.store().calls().is_empty());
}

#[tokio::test]
async fn failed_query_is_reported() {
    let store = seeded_store();
    store.set_offline(true);
    let (s, _host) = mounted(relational(), FakeRecord::new().with_identity(7), store).await;

    assert!(s.diagram().is_empty());
    assert_eq!(s.notifier().count(NotifyLevel::Danger), 1);
}

#[tokio::test]
async fn blob_is_imported_when_there_are_no_rows() {
    let legacy = json!({
        "nodes": [
            {"id": "n1", "recordId": 31, "name": "Begin", "type": "start", "x": 0, "y": 0},
            {"id": "n2", "recordId": 32, "name": "Finish", "type": "end", "x": 200, "y": 0}
        ],
        "edges": [{"id": "e1", "recordId": 40, "source": "n1", "target": "n2"}]
    });
    let record = FakeRecord::new()
        .with_identity(7)
        .with_field("json_definition", &legacy.to_string());
    let (s, _host) = mounted(relational(), record, FakeStore::new()).await;

    assert_eq!(external_ids(&s), vec![Some(100), Some(101)]);
    assert_eq!(s.diagram().edges()[0].external_id, Some(ExternalId(102)));
    let updates = s
        .store()
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Update(..)))
        .count();
    assert_eq!(updates, 0, "stale record ids from the blob are not reused");
    assert_eq!(s.store().ids(Entity::Node), vec![100, 101]);
}

#[tokio::test]
async fn external_reload_picks_up_new_rows() {
    let (mut s, _host) =
        mounted(relational(), FakeRecord::new().with_identity(7), seeded_store()).await;
    s.store().seed(
        Entity::Node,
        5,
        json!({"name": "Audit", "node_type": "task", "position_x": 600, "position_y": 0, "node_id": false, "process_id": 7}),
    );

    assert!(s.on_external_reload().await);
    assert_eq!(s.diagram().nodes().len(), 4);
    assert_eq!(s.diagram().nodes()[3].label, "Audit");
}

#[tokio::test]
async fn store_assigned_element_ids_are_kept() {
    let store = FakeStore::new();
    store.seed(
        Entity::Node,
        1,
        json!({"name": "Intake", "node_type": "task", "position_x": 0, "position_y": 0, "node_id": "a1b2c3d4", "process_id": 7}),
    );
    store.seed(
        Entity::Node,
        2,
        json!({"name": "Done", "node_type": "end", "position_x": 300, "position_y": 0, "node_id": "9f8e7d6c", "process_id": 7}),
    );
    store.seed(
        Entity::Edge,
        10,
        json!({"source_node_id": 1, "target_node_id": 2, "edge_id": "0badcafe", "process_id": 7}),
    );
    let (mut s, _host) = mounted(relational(), FakeRecord::new().with_identity(7), store).await;

    let ids: Vec<&str> = s.diagram().nodes().iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["a1b2c3d4", "9f8e7d6c"]);
    assert_eq!(s.diagram().edges()[0].id.as_str(), "0badcafe");
    assert!(!s.has_deferred_save());

    assert!(s.save().await);
    let row = s.store().row(Entity::Node, 1).unwrap();
    assert_eq!(row["node_id"], json!("a1b2c3d4"));
    let row = s.store().row(Entity::Edge, 10).unwrap();
    assert_eq!(row["edge_id"], json!("0badcafe"));
}

// ─── Save ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_a_node_deletes_edges_first() {
    let (mut s, _host) =
        mounted(relational(), FakeRecord::new().with_identity(7), seeded_store()).await;

    // The task node spans (200, 0)–(320, 80).
    s.pointer_down(260.0, 40.0, PointerButton::Primary, Modifiers::NONE, 0.0);
    s.pointer_up(260.0, 40.0, Modifiers::NONE).await;
    assert_eq!(s.selection().len(), 1);
    s.store().clear_calls();

    assert!(s.key_down("Delete", Modifiers::NONE, false).await);
    assert_eq!(s.diagram().nodes().len(), 2);
    assert!(s.diagram().edges().is_empty());

    let calls = s.store().calls();
    assert!(calls.contains(&Call::Delete(
        Entity::Edge,
        vec![ExternalId(10), ExternalId(11)]
    )));
    assert!(calls.contains(&Call::Delete(Entity::Node, vec![ExternalId(2)])));
    assert!(s.store().delete_position(Entity::Edge) < s.store().delete_position(Entity::Node));
    assert_eq!(s.store().ids(Entity::Node), vec![1, 3, 4]);
    assert!(s.store().ids(Entity::Edge).is_empty());
}

#[tokio::test]
async fn rows_left_off_the_canvas_survive_a_save() {
    let store = seeded_store();
    // Same pair as row 10: only one connection fits on the canvas.
    store.seed(
        Entity::Edge,
        12,
        json!({"name": "again", "source_node_id": 1, "target_node_id": 2, "edge_id": false, "process_id": 7}),
    );
    // Endpoint belongs to process 8.
    store.seed(
        Entity::Edge,
        13,
        json!({"source_node_id": 3, "target_node_id": 4, "edge_id": false, "process_id": 7}),
    );
    let (mut s, _host) = mounted(relational(), FakeRecord::new().with_identity(7), store).await;
    assert_eq!(s.diagram().edges().len(), 2);
    assert!(s.has_deferred_save());

    assert!(s.save().await);
    assert!(
        !s.store()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Delete(..)))
    );
    assert_eq!(s.store().ids(Entity::Edge), vec![10, 11, 12, 13]);
}

#[tokio::test]
async fn moves_are_written_as_updates() {
    let (mut s, _host) =
        mounted(relational(), FakeRecord::new().with_identity(7), seeded_store()).await;

    s.pointer_down(260.0, 40.0, PointerButton::Primary, Modifiers::NONE, 0.0);
    s.pointer_move(300.0, 40.0, Modifiers::NONE);
    s.pointer_up(300.0, 40.0, Modifiers::NONE).await;

    let row = s.store().row(Entity::Node, 2).unwrap();
    assert_eq!(row["position_x"], json!(240.0));
    assert_eq!(row["node_id"], json!(B));
    assert!(s.store().creates(Entity::Node).is_empty());
}

#[tokio::test]
async fn cache_field_mirrors_rows_in_legacy_shape() {
    let config = bpm_editor::EditorConfig {
        cache_field: Some("diagram_cache".into()),
        ..relational()
    };
    let (mut s, _host) = mounted(config, FakeRecord::new().with_identity(7), seeded_store()).await;
    assert!(s.record().field("diagram_cache").is_none());

    s.add_node(NodeKind::Gateway, Some(Point::new(600.0, 100.0)))
        .await
        .unwrap();

    let cache = s.record().field_json("diagram_cache");
    let record_ids: Vec<Value> = cache["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["recordId"].clone())
        .collect();
    assert_eq!(record_ids, vec![json!(1), json!(2), json!(3), json!(100)]);
    assert_eq!(cache["edges"].as_array().map(Vec::len), Some(2));
}

// ─── Pending buffer ─────────────────────────────────────────────────────

#[tokio::test]
async fn pending_elements_are_created_once_the_parent_exists() {
    let (mut s, _host) = mounted(relational(), FakeRecord::new(), FakeStore::new()).await;

    let start = s
        .add_node(NodeKind::Start, Some(Point::new(0.0, 0.0)))
        .await
        .unwrap();
    let task = s
        .add_node(NodeKind::Task, Some(Point::new(200.0, 0.0)))
        .await
        .unwrap();
    // Start's right point is (50, 25); the task's left point is (200, 40).
    s.pointer_down(50.0, 25.0, PointerButton::Primary, Modifiers::NONE, 0.0);
    s.pointer_move(198.0, 40.0, Modifiers::NONE);
    s.pointer_up(200.0, 40.0, Modifiers::NONE).await;

    assert_eq!(s.diagram().edges().len(), 1);
    assert_eq!(s.pending().nodes(), &[start, task]);
    assert_eq!(s.pending().edges().len(), 1);
    assert!(s.store().calls().is_empty());

    s.record().set_identity(7);
    assert!(s.on_identity_available().await);

    let node_batches = s.store().creates(Entity::Node);
    assert_eq!(node_batches.len(), 1);
    assert_eq!(node_batches[0].len(), 2);
    assert_eq!(node_batches[0][0]["node_type"], json!("start"));
    assert_eq!(node_batches[0][1]["process_id"], json!(7));

    let edge_batches = s.store().creates(Entity::Edge);
    assert_eq!(edge_batches.len(), 1);
    assert_eq!(edge_batches[0][0]["source_node_id"], json!(100));
    assert_eq!(edge_batches[0][0]["target_node_id"], json!(101));
    assert!(s.store().create_position(Entity::Node) < s.store().create_position(Entity::Edge));

    assert!(s.pending().is_empty());
    assert_eq!(external_ids(&s), vec![Some(100), Some(101)]);
    assert!(!s.on_identity_available().await, "nothing left to flush");
}

#[tokio::test]
async fn pending_nodes_deleted_before_flush_are_never_created() {
    let (mut s, _host) = mounted(relational(), FakeRecord::new(), FakeStore::new()).await;
    s.add_node(NodeKind::Task, Some(Point::new(0.0, 0.0)))
        .await
        .unwrap();
    let kept = s
        .add_node(NodeKind::Task, Some(Point::new(300.0, 0.0)))
        .await
        .unwrap();
    // The second node is selected after being added; select the first.
    s.pointer_down(60.0, 40.0, PointerButton::Primary, Modifiers::NONE, 0.0);
    s.pointer_up(60.0, 40.0, Modifiers::NONE).await;
    assert!(s.delete_selected().await);
    assert_eq!(s.pending().nodes(), &[kept]);

    s.record().set_identity(7);
    s.on_identity_available().await;
    assert_eq!(s.store().creates(Entity::Node)[0].len(), 1);
}

// ─── Failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_create_keeps_the_node_on_canvas() {
    let store = FakeStore::new();
    store.reject_creates(Some(Entity::Node));
    let (mut s, _host) = mounted(relational(), FakeRecord::new().with_identity(7), store).await;

    let id = s
        .add_node(NodeKind::Task, None)
        .await
        .expect("node is added even when the save fails");
    assert!(s.diagram().contains(id));
    assert_eq!(s.selection(), &[id]);
    assert_eq!(s.notifier().count(NotifyLevel::Danger), 1);
    assert_eq!(s.diagram().nodes()[0].external_id, None);

    s.store().reject_creates(None);
    assert!(s.save().await);
    assert_eq!(s.diagram().nodes()[0].external_id, Some(ExternalId(100)));
}

#[tokio::test]
async fn half_finished_push_does_not_duplicate_rows() {
    let (mut s, _host) = mounted(relational(), FakeRecord::new().with_identity(7), FakeStore::new()).await;
    s.add_node(NodeKind::Task, Some(Point::new(0.0, 0.0)))
        .await
        .unwrap();
    s.add_node(NodeKind::Task, Some(Point::new(300.0, 0.0)))
        .await
        .unwrap();
    assert_eq!(external_ids(&s), vec![Some(100), Some(101)]);

    s.store().reject_creates(Some(Entity::Edge));
    // A's right point (120, 40) to B's left point (300, 40).
    s.pointer_down(120.0, 40.0, PointerButton::Primary, Modifiers::NONE, 0.0);
    s.pointer_up(300.0, 40.0, Modifiers::NONE).await;
    assert_eq!(s.diagram().edges().len(), 1);
    assert_eq!(s.notifier().count(NotifyLevel::Danger), 1);

    s.store().reject_creates(None);
    assert!(s.save().await);
    assert_eq!(s.store().creates(Entity::Node).len(), 2);
    assert_eq!(s.store().ids(Entity::Node), vec![100, 101]);
    assert_eq!(s.store().ids(Entity::Edge), vec![102]);
}

#[tokio::test]
async fn duplicate_connection_warns() {
    let (mut s, _host) =
        mounted(relational(), FakeRecord::new().with_identity(7), seeded_store()).await;
    // Begin's right point is (50, 40); the task's left point is (200, 40).
    s.pointer_down(50.0, 40.0, PointerButton::Primary, Modifiers::NONE, 0.0);
    s.pointer_up(200.0, 40.0, Modifiers::NONE).await;

    assert_eq!(s.diagram().edges().len(), 2);
    assert_eq!(s.notifier().count(NotifyLevel::Warning), 1);
}
