//! Tests for the recording transport decorator.

use super::*;
use crate::provider::InMemoryConfig;
use crate::providers::InMemoryProvider;

fn recording_over_memory() -> (RecordingTransport, QueueName) {
    let memory = InMemoryProvider::new(InMemoryConfig {
        queues: vec!["orders".to_string(), "orders-dlq".to_string()],
        ..Default::default()
    });
    (
        RecordingTransport::new(Arc::new(memory)),
        QueueName::new("orders".to_string()).unwrap(),
    )
}

/// Verify that calls are recorded in order with queue names and bodies
#[tokio::test]
async fn test_calls_recorded_in_order() {
    let (transport, queue) = recording_over_memory();
    let url = transport.resolve_url(&queue).await.unwrap();

    transport
        .send_message(&url, &OutgoingMessage::new("a"))
        .await
        .unwrap();
    let request = ReceiveRequest::new(5)
        .unwrap()
        .with_visibility_timeout(VisibilityTimeout::new(60).unwrap());
    let batch = transport.receive_messages(&url, &request).await.unwrap();
    transport
        .delete_message(&url, &batch[0].receipt_handle)
        .await
        .unwrap();

    assert_eq!(
        transport.calls(),
        vec![
            TransportCall::ResolveUrl {
                queue: "orders".to_string()
            },
            TransportCall::Send {
                queue: "orders".to_string(),
                body: "a".to_string()
            },
            TransportCall::Receive {
                queue: "orders".to_string(),
                max_messages: 5,
                visibility_timeout: Some(60),
                wait_time: None
            },
            TransportCall::Delete {
                queue: "orders".to_string(),
                body: Some("a".to_string())
            },
        ]
    );
}

/// Verify that a counted fault fails only the requested number of calls
#[tokio::test]
async fn test_fail_times() {
    let (transport, queue) = recording_over_memory();
    transport.fail_times(TransportOperation::ResolveUrl, 1);

    assert!(transport.resolve_url(&queue).await.is_err());
    assert!(transport.resolve_url(&queue).await.is_ok());
    assert_eq!(transport.count(TransportOperation::ResolveUrl), 2);
}

/// Verify that a permanent fault keeps failing until cleared
#[tokio::test]
async fn test_fail_always_and_clear() {
    let (transport, _) = recording_over_memory();
    transport.fail_always(TransportOperation::ListQueues);

    for _ in 0..3 {
        let result = transport.list_queue_urls().await;
        assert!(matches!(result, Err(QueueError::ConnectionFailed { .. })));
    }

    transport.clear_faults();
    assert_eq!(transport.list_queue_urls().await.unwrap().len(), 2);
}

/// Verify that targeted faults only hit calls involving the named body or queue
#[tokio::test]
async fn test_fail_matching_by_body_and_queue() {
    let (transport, queue) = recording_over_memory();
    let url = transport.resolve_url(&queue).await.unwrap();
    let dlq = transport
        .resolve_url(&QueueName::new("orders-dlq".to_string()).unwrap())
        .await
        .unwrap();

    transport.fail_matching(TransportOperation::Send, "poison");
    transport.fail_matching(TransportOperation::ApproximateCount, "orders-dlq");

    assert!(transport
        .send_message(&url, &OutgoingMessage::new("poison"))
        .await
        .is_err());
    assert!(transport
        .send_message(&url, &OutgoingMessage::new("fine"))
        .await
        .is_ok());
    assert!(transport.approximate_message_count(&dlq).await.is_err());
    assert_eq!(transport.approximate_message_count(&url).await.unwrap(), 1);
}

/// Verify that failed calls are still recorded
#[tokio::test]
async fn test_failed_calls_recorded() {
    let (transport, queue) = recording_over_memory();
    transport.fail_always(TransportOperation::ResolveUrl);

    let _ = transport.resolve_url(&queue).await;

    assert_eq!(
        transport.calls_for(TransportOperation::ResolveUrl),
        vec![TransportCall::ResolveUrl {
            queue: "orders".to_string()
        }]
    );

    transport.clear_calls();
    assert!(transport.calls().is_empty());
}
