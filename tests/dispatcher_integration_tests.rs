mod common;

use common::{assert_no_leak, StubContext};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subagent_guard::{
    DispatchError, DispatcherConfig, FailureClass, SubagentKind, TaskDispatcher, TaskResponse,
};

fn dispatcher(max_concurrent_tasks: usize, timeout: Duration) -> Arc<TaskDispatcher> {
    Arc::new(
        TaskDispatcher::with_defaults(DispatcherConfig::new(max_concurrent_tasks, timeout))
            .expect("valid dispatcher config"),
    )
}

async fn wait_for_active(dispatcher: &TaskDispatcher, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while dispatcher.active_count() != expected {
        assert!(Instant::now() < deadline, "never reached {} active tasks", expected);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_fourth_concurrent_task_hits_limit() {
    let dispatcher = dispatcher(3, Duration::from_secs(10));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let context = StubContext::general().with_delay(Duration::from_millis(300));
                dispatcher.dispatch(&context).await
            })
        })
        .collect();

    wait_for_active(&dispatcher, 3).await;

    let err = dispatcher
        .dispatch(&StubContext::general())
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, DispatchError::CapacityReached { capacity: 3 }));
    assert!(message.contains("limit"));
    assert!(message.contains('3'));

    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.kind, SubagentKind::GeneralPurpose);
    }
    assert_eq!(dispatcher.active_count(), 0);

    // Slots are reusable once released
    assert!(dispatcher.dispatch(&StubContext::general()).await.is_ok());
}

#[tokio::test]
async fn test_active_count_never_exceeds_capacity_under_burst() {
    let dispatcher = dispatcher(3, Duration::from_secs(10));
    let contexts: Vec<_> = (0..12)
        .map(|_| StubContext::general().with_delay(Duration::from_millis(50)))
        .collect();

    let results = join_all(contexts.iter().map(|context| dispatcher.dispatch(context))).await;

    let completed = results.iter().filter(|r| r.is_ok()).count();
    let limited = results
        .iter()
        .filter(|r| matches!(r, Err(DispatchError::CapacityReached { .. })))
        .count();

    assert_eq!(completed, 3);
    assert_eq!(limited, 9);
    assert_eq!(dispatcher.active_count(), 0);

    let stats = dispatcher.get_stats();
    assert_eq!(stats.total_requests, 12);
    assert_eq!(stats.capacity_rejections, 9);
}

#[tokio::test]
async fn test_timeout_is_reported_and_slot_released() {
    let dispatcher = dispatcher(3, Duration::from_millis(100));
    let context = StubContext::general().with_delay(Duration::from_secs(1));

    let started = Instant::now();
    let err = dispatcher.dispatch(&context).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(800));
    assert!(matches!(err, DispatchError::Timeout { .. }));
    assert!(err.to_string().contains("timeout"));
    assert!(err.is_retryable());
    assert_eq!(dispatcher.active_count(), 0);
}

#[tokio::test]
async fn test_internal_failures_use_fixed_phrases() {
    let dispatcher = dispatcher(3, Duration::from_secs(5));

    let cases = [
        ("Internal database connection failed", FailureClass::Internal),
        ("payload Validation rejected by upstream", FailureClass::Validation),
        ("socket timeout after 30s", FailureClass::Timeout),
    ];

    for (raw, expected) in cases {
        let context = StubContext::general().failing_with(raw);
        let err = dispatcher.dispatch(&context).await.unwrap_err();
        assert_eq!(err, DispatchError::Failed(expected));
        assert!(!err.to_string().contains(raw));
    }

    assert_eq!(dispatcher.active_count(), 0);
    assert_eq!(dispatcher.get_stats().failed_requests, 3);
}

#[tokio::test]
async fn test_malicious_input_is_rejected_without_disclosure() {
    let dispatcher = dispatcher(3, Duration::from_secs(5));

    for context in [
        StubContext::new("; rm -rf /", "Do something useful", "general-purpose"),
        StubContext::new("Test task", "please rm -rf / && reboot", "general-purpose"),
        StubContext::new("Test task", "<script>x</script>", "general-purpose"),
        StubContext::new("; rm -rf /", "", "invalid"),
    ] {
        let err = dispatcher.dispatch(&context).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(_)));

        let message = err.to_string();
        assert!(!message.is_empty());
        assert_no_leak(&message);
    }

    assert_eq!(dispatcher.active_count(), 0);
    assert_eq!(dispatcher.get_stats().rejected_requests, 4);
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let dispatcher = dispatcher(3, Duration::from_secs(5));

    let err = dispatcher.dispatch(&StubContext::empty()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Required parameters are missing or invalid"
    );

    let err = dispatcher
        .dispatch(&StubContext::new("", "", ""))
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("required"));
}

#[tokio::test]
async fn test_unknown_kind_is_rejected_by_validation() {
    let dispatcher = dispatcher(3, Duration::from_secs(5));
    let context = StubContext::new("Test task", "Do something useful", "invalid-type");

    let err = dispatcher.dispatch(&context).await.unwrap_err();

    assert!(matches!(err, DispatchError::Rejected(_)));
    assert!(err.to_string().contains("general-purpose"));
    assert!(!err.to_string().contains("invalid-type"));
    assert_eq!(dispatcher.active_count(), 0);
}

#[tokio::test]
async fn test_response_envelope() {
    let dispatcher = dispatcher(3, Duration::from_secs(5));

    let ok = TaskResponse::from(dispatcher.dispatch(&StubContext::general()).await);
    assert!(ok.success);
    assert_eq!(
        ok.output.as_deref(),
        Some("Sub-agent (general-purpose) completed task: Test task\nGeneral-purpose agent completed: handled: Do something useful")
    );
    assert!(ok.error.is_none());

    let rejected = TaskResponse::from(
        dispatcher
            .dispatch(&StubContext::new("Test task", "echo $HOME", "general-purpose"))
            .await,
    );
    assert!(!rejected.success);
    assert_eq!(
        rejected.error.as_deref(),
        Some("Invalid characters detected in input")
    );
}

#[tokio::test]
async fn test_repeated_dispatch_is_idempotent() {
    let dispatcher = dispatcher(3, Duration::from_secs(5));
    let context = StubContext::new("Configure it", "Show the git branch", "statusline-setup");

    let first = dispatcher.dispatch(&context).await.unwrap();
    let second = dispatcher.dispatch(&context).await.unwrap();

    assert_eq!(first.output, second.output);
    assert_eq!(first.audit, second.audit);
    assert_ne!(first.task_id, second.task_id);
}

#[tokio::test]
async fn test_cancel_all_releases_running_tasks() {
    let dispatcher = dispatcher(3, Duration::from_secs(30));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let context = StubContext::general().with_delay(Duration::from_secs(20));
                dispatcher.dispatch(&context).await
            })
        })
        .collect();

    wait_for_active(&dispatcher, 2).await;
    assert_eq!(dispatcher.active_tasks().len(), 2);
    assert_eq!(dispatcher.cancel_all(), 2);

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap_err(), DispatchError::Cancelled);
    }
    assert_eq!(dispatcher.active_count(), 0);
}

#[tokio::test]
async fn test_fractional_timeout_from_seconds() {
    let config = DispatcherConfig::with_timeout_secs(3, 0.1).unwrap();
    let dispatcher = TaskDispatcher::with_defaults(config).unwrap();
    let context = StubContext::general().with_delay(Duration::from_millis(200));

    let started = Instant::now();
    let err = dispatcher.dispatch(&context).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(200));
    assert!(err.to_string().contains("timeout"));
    assert!(dispatcher.active_tasks().is_empty());
}
