//! Tracing instrumentation tests
//!
//! Every transaction runs inside a `landtable_txn` span with one child span
//! per coordinator step. All tests use the `current_thread` flavor so the
//! thread-local subscriber sees every span.

mod support;

use landtable_backend::TransactionConsistency;
use landtable_state::ReplicaSpec;
use serde_json::json;
use support::{counter_table, span_capture, txn, users_table, Harness};

#[tokio::test(flavor = "current_thread")]
async fn committed_write_produces_step_spans() {
    let harness = Harness::new();
    let table = harness.add_table(users_table());
    let (store, _guard) = span_capture::init_test_tracing();

    harness
        .coordinator()
        .execute(
            harness.workspace.clone(),
            table,
            &txn(json!({
                "ops": [{"type": "create", "row": {"first_name": "Sarah"}}],
                "use_id": false
            })),
            TransactionConsistency::Strict,
        )
        .await
        .expect("commit");

    let root = store.find_span("landtable_txn").expect("landtable_txn span");
    assert_eq!(root.level, tracing::Level::DEBUG);
    assert_eq!(root.field("table"), Some("users"));
    assert_eq!(root.field("op_count"), Some("1"));
    assert_eq!(root.field("consistency"), Some("STRICT"));
    assert_eq!(root.field("read_only"), Some("false"));
    assert_eq!(root.field("lock_mode"), Some("unlocked"));
    assert_eq!(root.field("result_count"), Some("1"));
    assert_eq!(root.field("degraded"), Some("false"));

    for step in ["txn_resolve_primary", "txn_primary_exec", "txn_replicate"] {
        let span = store
            .find_span(step)
            .unwrap_or_else(|| panic!("missing {step} span"));
        assert_eq!(span.parent, Some("landtable_txn"), "{step} parent");
    }
    // The primary is natively isolated
    assert!(!store.has_span("txn_emulation_lock"));
}

#[tokio::test(flavor = "current_thread")]
async fn emulated_backend_records_lock_span() {
    let harness = Harness::new();
    let table = harness.add_table(counter_table(ReplicaSpec::reference("sheet")));
    let (store, _guard) = span_capture::init_test_tracing();

    harness
        .coordinator()
        .execute(
            harness.workspace.clone(),
            table,
            &txn(json!({
                "ops": [{"type": "fetch", "target": {"formula": "TRUE()"}, "limit": 1}],
                "use_id": false
            })),
            TransactionConsistency::Relaxed,
        )
        .await
        .expect("fetch");

    let lock = store
        .find_span("txn_emulation_lock")
        .expect("txn_emulation_lock span");
    assert_eq!(lock.field("mode"), Some("shared"));
    assert_eq!(lock.parent, Some("landtable_txn"));

    let root = store.find_span("landtable_txn").expect("root span");
    assert_eq!(root.field("lock_mode"), Some("shared"));
    assert_eq!(root.field("read_only"), Some("true"));

    // Nothing changed, so nothing to replicate
    assert!(!store.has_span("txn_replicate"));
}

#[tokio::test(flavor = "current_thread")]
async fn aborted_transaction_stops_at_the_failing_step() {
    let harness = Harness::new();
    let table = harness.add_table(users_table().read_only());
    let (store, _guard) = span_capture::init_test_tracing();

    harness
        .coordinator()
        .execute(
            harness.workspace.clone(),
            table,
            &txn(json!({"ops": [{"type": "create", "row": {"first_name": "Sarah"}}]})),
            TransactionConsistency::Strict,
        )
        .await
        .expect_err("read-only table");

    assert_eq!(store.span_names(), vec!["landtable_txn"]);
    let root = store.find_span("landtable_txn").expect("root span");
    assert!(root.field("result_count").is_none());
}
