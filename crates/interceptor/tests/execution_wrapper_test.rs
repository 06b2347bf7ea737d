use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;
use serde_json::{json, Value};
use traza_core::envelope::{INTERNAL_ERROR_CODE, INTERNAL_ERROR_MESSAGE};
use traza_core::{
    current_transaction_id, run, ApiErrorEnvelope, LogLevel, SequentialGenerator,
    TransactionContext,
};
use traza_interceptor::{CallArg, Instrumented};
use traza_observability::{ApmTracer, LabelValue, Outcome};
use traza_testing_utils::{
    is_elapsed_format, memory_logger, recording_tracer, ApmEvent, FailingApmBackend,
    RecordingApmBackend,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Payment {
    id: String,
}

#[tokio::test]
async fn success_logs_start_then_success_and_returns_value() {
    let (logger, sink) = memory_logger("PaymentsService");
    let service = Instrumented::new("PaymentsService").with_logger(logger);

    let result = run(TransactionContext::new("T-ok"), async {
        service
            .execute("create", &[CallArg::of(&json!({"amount": 10}))], async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Payment {
                    id: "abc".to_string(),
                })
            })
            .await
    })
    .await;

    assert_eq!(
        result.unwrap(),
        Payment {
            id: "abc".to_string()
        }
    );

    let entries = sink.entries();
    assert_eq!(entries.len(), 2);

    let start = &entries[0];
    assert_eq!(start.level, LogLevel::Info);
    assert_eq!(
        start.message,
        "[Service] Iniciando ejecución del método create en PaymentsService"
    );
    assert_eq!(start.processing_time.as_deref(), Some("0ms"));
    assert_eq!(start.request, Some(json!({"body": {"amount": 10}})));
    assert_eq!(start.transaction_id.as_deref(), Some("T-ok"));

    let done = &entries[1];
    assert_eq!(done.level, LogLevel::Info);
    assert_eq!(
        done.message,
        "[Service] Ejecución exitosa del método create en PaymentsService"
    );
    assert_eq!(done.response, Some(json!({"id": "abc"})));
    assert_eq!(done.method_name.as_deref(), Some("create"));
    assert!(is_elapsed_format(done.processing_time.as_deref().unwrap()));
}

#[tokio::test]
async fn success_response_unwraps_data_field() {
    let (logger, sink) = memory_logger("PaymentsController");
    let controller = Instrumented::new("PaymentsController").with_logger(logger);

    let result = controller
        .execute("list", &[], async {
            Ok(json!({"data": [{"id": "p-1"}], "total": 1}))
        })
        .await
        .unwrap();

    assert_eq!(result["total"], 1);
    assert_eq!(sink.entries()[1].response, Some(json!([{"id": "p-1"}])));
}

#[tokio::test]
async fn raw_failure_becomes_internal_envelope() {
    let (logger, sink) = memory_logger("PaymentsService");
    let service = Instrumented::new("PaymentsService").with_logger(logger);

    let error = run(TransactionContext::new("T-fail"), async {
        service
            .execute::<Value, _>("create", &[], async { Err(anyhow!("boom")) })
            .await
    })
    .await
    .unwrap_err();

    assert_eq!(error.response_code, INTERNAL_ERROR_CODE);
    assert_eq!(error.message, INTERNAL_ERROR_MESSAGE);
    assert!(!error.message.contains("boom"));
    assert_eq!(error.transaction_id, "T-fail");

    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    let failure = &entries[1];
    assert_eq!(failure.level, LogLevel::Error);
    assert_eq!(
        failure.message,
        "[Service] Error en ejecución del método create en PaymentsService: boom"
    );
    let detail = failure.response.as_ref().unwrap();
    assert_eq!(detail["error"], "boom");
    assert_eq!(detail["name"], "Error");
    assert!(detail["stack"].is_array());
}

#[tokio::test]
async fn nested_failure_is_wrapped_exactly_once() {
    let (logger, sink) = memory_logger("App");
    let service =
        Instrumented::new("PaymentsService").with_logger(logger.for_context("PaymentsService"));
    let repository =
        Instrumented::new("PaymentsRepository").with_logger(logger.for_context("PaymentsRepository"));

    let outer = run(TransactionContext::new("T-nested"), async {
        service
            .execute("find", &[CallArg::text("p-1")], async {
                let row: Value = repository
                    .execute("find_by_id", &[CallArg::text("p-1")], async {
                        Err(anyhow!("boom"))
                    })
                    .await?;
                Ok(row)
            })
            .await
    })
    .await
    .unwrap_err();

    assert_eq!(outer.response_code, INTERNAL_ERROR_CODE);
    assert_eq!(outer.message, INTERNAL_ERROR_MESSAGE);
    assert_eq!(outer.transaction_id, "T-nested");

    let errors: Vec<_> = sink
        .entries()
        .into_iter()
        .filter(|entry| entry.level == LogLevel::Error)
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].context.as_deref(), Some("PaymentsRepository"));
    assert!(errors[0].message.ends_with(": boom"));
    assert_eq!(errors[1].context.as_deref(), Some("PaymentsService"));
    assert_eq!(errors[1].response.as_ref().unwrap()["name"], "ApiErrorEnvelope");
    assert!(!errors[1].message.contains("boom"));
}

#[tokio::test]
async fn business_envelope_passes_through_unchanged() {
    let service = Instrumented::new("PaymentsService").with_logger(memory_logger("S").0);
    let raised = ApiErrorEnvelope::not_found("Pago no encontrado").with_transaction_id("T-404");
    let expected = raised.clone();

    let error = service
        .execute::<Value, _>("find", &[], async move { Err(raised.into()) })
        .await
        .unwrap_err();

    assert_eq!(error, expected);
}

async fn explode() -> anyhow::Result<Value> {
    panic!("kaboom")
}

#[tokio::test]
async fn panic_is_contained_as_failure() {
    let (logger, sink) = memory_logger("Widget");
    let widget = Instrumented::new("Widget").with_logger(logger);

    let error = widget
        .execute("explode", &[], explode())
        .await
        .unwrap_err();

    assert_eq!(error.response_code, INTERNAL_ERROR_CODE);
    let detail = sink.entries()[1].response.clone().unwrap();
    assert_eq!(detail["name"], "Panic");
    assert_eq!(detail["error"], "kaboom");
}

#[tokio::test]
async fn wrapper_opens_scope_when_none_active() {
    let (logger, sink) = memory_logger("JobsProvider");
    let provider = Instrumented::new("JobsProvider")
        .with_logger(logger)
        .with_generator(Arc::new(SequentialGenerator::new("tx")));

    let seen = provider
        .execute("tick", &[], async { Ok(current_transaction_id()) })
        .await
        .unwrap();
    assert_eq!(seen.as_deref(), Some("tx-1"));

    provider.execute("tick", &[], async { Ok(()) }).await.unwrap();
    assert_eq!(sink.for_transaction("tx-1").len(), 4);
}

#[tokio::test]
async fn active_scope_takes_precedence_over_cached_id() {
    let (logger, sink) = memory_logger("Widget");
    let widget = Instrumented::new("Widget")
        .with_logger(logger)
        .with_generator(Arc::new(SequentialGenerator::new("tx")));

    widget.execute("a", &[], async { Ok(()) }).await.unwrap();
    run(TransactionContext::new("T-scope"), async {
        widget.execute("b", &[], async { Ok(()) }).await.unwrap();
    })
    .await;

    assert_eq!(sink.for_transaction("tx-1").len(), 2);
    assert_eq!(sink.for_transaction("T-scope").len(), 2);
}

#[tokio::test]
async fn payloads_are_bounded_by_max_log_size() {
    let (logger, sink) = memory_logger("PaymentsService");
    let service =
        Instrumented::new("PaymentsService").with_logger(logger.with_max_log_size(Some(16)));

    service
        .execute("create", &[CallArg::of(&json!({"blob": "x".repeat(200)}))], async {
            Ok("y".repeat(200))
        })
        .await
        .unwrap();

    let entries = sink.entries();
    let request = entries[0].request.as_ref().unwrap().as_str().unwrap();
    let response = entries[1].response.as_ref().unwrap().as_str().unwrap();
    assert!(request.ends_with("... [truncated]"));
    assert!(response.ends_with("... [truncated]"));
}

#[tokio::test]
async fn trace_labels_are_bounded_by_max_log_size() {
    let (tracer, backend) = recording_tracer();
    let (logger, _sink) = memory_logger("PaymentsController");
    let controller = Instrumented::new("PaymentsController")
        .with_logger(logger.with_max_log_size(Some(16)))
        .with_tracer(tracer);

    controller
        .execute(
            "create",
            &[
                CallArg::of(&json!({"blob": "x".repeat(5000)})),
                CallArg::text("z".repeat(5000)),
            ],
            async { Ok(()) },
        )
        .await
        .unwrap();

    let labels = backend.labels_for("Controller.create");
    let body = labels["request_body"].to_string();
    let data = labels["request_data"].to_string();
    assert!(body.chars().count() <= 16 + "... [truncated]".len());
    assert!(body.ends_with("... [truncated]"));
    assert!(body.starts_with("{\"blob\":\"xxxxxxx"));
    assert_eq!(data, format!("{}... [truncated]", "z".repeat(16)));
}

#[tokio::test]
async fn outermost_call_owns_the_trace_transaction() {
    let (tracer, backend) = recording_tracer();
    let controller = Instrumented::new("PaymentsController")
        .with_logger(memory_logger("C").0)
        .with_tracer(tracer.clone());
    let service = Instrumented::new("PaymentsService")
        .with_logger(memory_logger("S").0)
        .with_tracer(tracer);

    run(TransactionContext::new("T-trace"), async {
        controller
            .execute(
                "create",
                &[CallArg::infer(json!({"body": {"a": 1}, "query": {"q": 1}}))],
                async {
                    let id: i64 = service
                        .execute("create", &[CallArg::of(&42)], async { Ok(1) })
                        .await?;
                    Ok(id)
                },
            )
            .await
            .unwrap();
    })
    .await;

    assert_eq!(backend.transactions_started(), vec!["Controller.create"]);
    assert_eq!(backend.spans_started(), vec!["Service.create"]);
    assert!(backend.events().contains(&ApmEvent::SpanStarted {
        name: "Service.create".to_string(),
        span_type: "app".to_string(),
        parent: Some("Controller.create".to_string()),
    }));

    let labels = backend.labels_for("Controller.create");
    assert_eq!(labels["component"], LabelValue::from("Controller"));
    assert_eq!(labels["class"], LabelValue::from("PaymentsController"));
    assert_eq!(labels["method"], LabelValue::from("create"));
    assert_eq!(labels["transaction_id"], LabelValue::from("T-trace"));
    assert_eq!(labels["request_body"], LabelValue::from("{\"a\":1}"));
    assert_eq!(labels["request_query"], LabelValue::from("{\"q\":1}"));

    let span_labels = backend.labels_for("Service.create");
    assert_eq!(span_labels["request_value"], LabelValue::from("42"));

    assert_eq!(backend.end_count("Controller.create"), 1);
    assert_eq!(backend.end_count("Service.create"), 1);
    assert_eq!(backend.outcome_of("Controller.create"), Some(Outcome::Success));
}

#[tokio::test]
async fn failure_is_captured_and_marks_outcome() {
    let (tracer, backend) = recording_tracer();
    let service = Instrumented::new("PaymentsService")
        .with_logger(memory_logger("S").0)
        .with_tracer(tracer);

    let _ = service
        .execute::<(), _>("create", &[], async { Err(anyhow!("boom")) })
        .await;

    assert_eq!(
        backend.captured_errors(),
        vec![("Service.create".to_string(), "boom".to_string())]
    );
    assert_eq!(backend.outcome_of("Service.create"), Some(Outcome::Failure));
    assert_eq!(backend.end_count("Service.create"), 1);
}

#[tokio::test]
async fn inactive_or_failing_backend_never_breaks_execution() {
    let inactive = Instrumented::new("PaymentsService")
        .with_logger(memory_logger("S").0)
        .with_tracer(ApmTracer::new(Arc::new(RecordingApmBackend::inactive())));
    assert_eq!(inactive.execute("a", &[], async { Ok(1) }).await.unwrap(), 1);

    let failing = Instrumented::new("PaymentsService")
        .with_logger(memory_logger("S").0)
        .with_tracer(ApmTracer::new(Arc::new(FailingApmBackend)));
    assert_eq!(failing.execute("a", &[], async { Ok(2) }).await.unwrap(), 2);

    let error = failing
        .execute::<(), _>("b", &[], async { Err(anyhow!("boom")) })
        .await
        .unwrap_err();
    assert_eq!(error.response_code, INTERNAL_ERROR_CODE);
}

#[tokio::test]
async fn concurrent_calls_keep_their_own_ids() {
    let (logger, sink) = memory_logger("PaymentsService");
    let service = Arc::new(Instrumented::new("PaymentsService").with_logger(logger));

    let mut handles = Vec::new();
    for i in 0..8u64 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(run(
            TransactionContext::new(format!("T-{i}")),
            async move {
                service
                    .execute("work", &[CallArg::of(&i)], async move {
                        tokio::time::sleep(Duration::from_millis(8 - i)).await;
                        Ok(current_transaction_id())
                    })
                    .await
            },
        )));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let seen = handle.await.unwrap().unwrap();
        assert_eq!(seen, Some(format!("T-{i}")));
        let entries = sink.for_transaction(&format!("T-{i}"));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request, Some(json!({"value": i})));
    }
}
