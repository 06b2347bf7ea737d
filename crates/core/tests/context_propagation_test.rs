use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use traza_core::{
    current, current_transaction_id, run, spawn_in_context, LogMetadata, MemorySink,
    StructuredLogger, TransactionContext,
};

async fn read_after_yield(delay_ms: u64) -> Option<String> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    current().map(|ctx| ctx.transaction_id().to_string())
}

#[tokio::test]
async fn concurrent_sub_operations_observe_the_same_id() {
    let (a, b) = run(TransactionContext::new("T1"), async {
        tokio::join!(read_after_yield(5), read_after_yield(1))
    })
    .await;

    assert_eq!(a.as_deref(), Some("T1"));
    assert_eq!(b.as_deref(), Some("T1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sibling_scopes_never_observe_each_other() {
    let mut handles = Vec::new();
    for i in 0..16 {
        let id = format!("T{i}");
        handles.push(tokio::spawn(run(TransactionContext::new(id.clone()), async move {
            let mut seen = Vec::new();
            for step in 0..5 {
                tokio::time::sleep(Duration::from_millis((i + step) % 3)).await;
                seen.push(current_transaction_id());
            }
            (id, seen)
        })));
    }

    for handle in handles {
        let (id, seen) = handle.await.unwrap();
        assert!(seen.iter().all(|s| s.as_deref() == Some(id.as_str())));
    }
}

#[tokio::test]
async fn spawned_tasks_inherit_through_spawn_in_context() {
    let ids = run(TransactionContext::new("T-parent"), async {
        let first = spawn_in_context(read_after_yield(2));
        let second = spawn_in_context(async {
            spawn_in_context(read_after_yield(1)).await.unwrap()
        });
        (first.await.unwrap(), second.await.unwrap())
    })
    .await;

    assert_eq!(ids.0.as_deref(), Some("T-parent"));
    assert_eq!(ids.1.as_deref(), Some("T-parent"));
}

#[tokio::test]
async fn plain_spawn_does_not_leak_context() {
    let seen = run(TransactionContext::new("T-local"), async {
        tokio::spawn(async { current_transaction_id() }).await.unwrap()
    })
    .await;

    assert!(seen.is_none());
}

#[tokio::test]
async fn logger_entries_keyed_by_transaction_id() {
    let sink = Arc::new(MemorySink::new());
    let logger = StructuredLogger::new("Consumer").with_sink(sink.clone());

    let work = |id: &'static str, logger: StructuredLogger| {
        run(TransactionContext::new(id), async move {
            logger.info("inicio", LogMetadata::new().with_request(&json!({"id": id})));
            tokio::task::yield_now().await;
            logger.info("fin", LogMetadata::new());
        })
    };

    tokio::join!(work("T-a", logger.clone()), work("T-b", logger.clone()));

    for id in ["T-a", "T-b"] {
        let entries = sink.for_transaction(id);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "inicio");
        assert_eq!(entries[0].request, Some(json!({"id": id})));
        assert_eq!(entries[1].message, "fin");
    }
}
