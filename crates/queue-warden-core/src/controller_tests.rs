//! Tests for the lifecycle controller.

use super::*;
use crate::error::ProcessingError;
use crate::processor::{FnProcessor, RejectMatching};
use crate::settings::{HandlingSettings, PollSettings};
use queue_warden_runtime::{
    InMemoryConfig, InMemoryProvider, RecordingTransport, TransportCall, TransportOperation,
};
use std::time::Duration;

fn name(value: &str) -> QueueName {
    QueueName::new(value.to_string()).unwrap()
}

struct Harness {
    memory: Arc<InMemoryProvider>,
    recording: Arc<RecordingTransport>,
    controller: LifecycleController,
}

impl Harness {
    /// Queues `orders` and `orders-dlq`, both known to the directory
    fn new() -> Self {
        let memory = Arc::new(InMemoryProvider::new(InMemoryConfig {
            queues: vec!["orders".to_string(), "orders-dlq".to_string()],
            ..Default::default()
        }));
        let recording = Arc::new(RecordingTransport::new(memory.clone()));
        let directory = Arc::new(QueueDirectory::with_names([
            name("orders"),
            name("orders-dlq"),
        ]));
        let controller = LifecycleController::new(recording.clone(), directory);

        Self {
            memory,
            recording,
            controller,
        }
    }

    fn with_processor(mut self, processor: Arc<dyn MessageProcessor>) -> Self {
        self.controller = self.controller.with_processor(processor);
        self
    }

    fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.controller = self.controller.with_settings(settings);
        self
    }

    async fn seed(&self, bodies: &[&str]) {
        let url = self.memory.resolve_url(&name("orders")).await.unwrap();
        for body in bodies {
            self.memory
                .send_message(&url, &OutgoingMessage::new(*body))
                .await
                .unwrap();
        }
    }

    fn bodies(&self, queue: &str) -> Vec<String> {
        self.memory.message_bodies(&name(queue)).unwrap()
    }
}

fn wide_handling() -> LifecycleSettings {
    LifecycleSettings {
        handling: HandlingSettings {
            batch_size: 10,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn reject_b() -> Arc<dyn MessageProcessor> {
    Arc::new(FnProcessor::new(|message: &ReceivedMessage| {
        if message.body == "b" {
            Err(ProcessingError::rejected("b is not acceptable"))
        } else {
            Ok(())
        }
    }))
}

// ============================================================================
// Queue Operation Tests
// ============================================================================

mod queue_operation_tests {
    use super::*;

    /// Verify that listing refreshes the directory from the transport
    #[tokio::test]
    async fn test_list_queues_refreshes_directory() {
        let harness = Harness::new();
        harness.memory.create_queue(&name("billing")).unwrap();

        let names = harness.controller.list_queues().await.unwrap();

        assert_eq!(names, vec![name("billing"), name("orders"), name("orders-dlq")]);
        assert!(harness.controller.directory().is_valid("billing"));
        assert_eq!(harness.recording.count(TransportOperation::ListQueues), 1);
    }

    /// Verify that send, count and URL resolution work on known queues
    #[tokio::test]
    async fn test_send_and_count() {
        let harness = Harness::new();

        let mut attributes = HashMap::new();
        attributes.insert("tenant".to_string(), "acme".to_string());
        harness
            .controller
            .send_message("orders", "hello", attributes)
            .await
            .unwrap();

        assert_eq!(
            harness
                .controller
                .approximate_message_count("orders")
                .await
                .unwrap(),
            1
        );
        let url = harness.controller.queue_url("orders").await.unwrap();
        assert!(url.as_str().ends_with("/orders"));
    }

    /// Verify that unknown queues are refused before any transport call
    #[tokio::test]
    async fn test_unknown_queue_refused() {
        let harness = Harness::new();

        let result = harness
            .controller
            .send_message("ordres", "hello", HashMap::new())
            .await;

        assert!(matches!(result, Err(LifecycleError::InvalidQueue { .. })));
        assert!(harness.recording.calls().is_empty());
    }
}

// ============================================================================
// Drain Tests
// ============================================================================

mod drain_tests {
    use super::*;

    /// Verify that an unknown queue is reported as an outcome, not an error
    #[tokio::test]
    async fn test_unknown_queue_is_outcome() {
        let harness = Harness::new();

        for queue in ["", "  ", "missing"] {
            let outcome = harness.controller.receive_once(queue, 5, 60).await.unwrap();
            assert_eq!(
                outcome,
                DrainOutcome::InvalidQueue {
                    queue: queue.to_string()
                }
            );
        }
        assert!(harness.recording.calls().is_empty());
    }

    /// Verify that every message is extended to 30 seconds and then deleted
    #[tokio::test]
    async fn test_drain_extends_then_deletes_everything() {
        let harness = Harness::new();
        harness.seed(&["a", "b", "c"]).await;

        let outcome = harness.controller.drain("orders").await.unwrap();

        let DrainOutcome::Drained(report) = outcome else {
            panic!("expected a drained batch");
        };
        assert_eq!(report.received(), 3);
        assert_eq!(report.deleted(), 3);
        assert!(harness.bodies("orders").is_empty());

        let receive = &harness.recording.calls_for(TransportOperation::Receive)[0];
        assert_eq!(
            receive,
            &TransportCall::Receive {
                queue: "orders".to_string(),
                max_messages: 5,
                visibility_timeout: Some(60),
                wait_time: None,
            }
        );
        for call in harness.recording.calls_for(TransportOperation::ChangeVisibility) {
            assert!(matches!(call, TransportCall::ChangeVisibility { timeout: 30, .. }));
        }
        assert_eq!(harness.recording.count(TransportOperation::ChangeVisibility), 3);
    }

    /// Verify that a failed extension does not stop the delete
    #[tokio::test]
    async fn test_extension_failure_still_deletes() {
        let harness = Harness::new();
        harness.seed(&["a", "b"]).await;
        harness
            .recording
            .fail_matching(TransportOperation::ChangeVisibility, "a");

        let outcome = harness.controller.receive_once("orders", 5, 60).await.unwrap();

        let DrainOutcome::Drained(report) = outcome else {
            panic!("expected a drained batch");
        };
        assert_eq!(report.deleted(), 2);
    }

    /// Verify that out-of-range arguments are configuration errors
    #[tokio::test]
    async fn test_invalid_arguments() {
        let harness = Harness::new();

        assert!(matches!(
            harness.controller.receive_once("orders", 0, 60).await,
            Err(LifecycleError::Configuration { .. })
        ));
        assert!(matches!(
            harness.controller.receive_once("orders", 5, 50_000).await,
            Err(LifecycleError::Configuration { .. })
        ));
    }
}

// ============================================================================
// Batch Handling Tests
// ============================================================================

mod handling_tests {
    use super::*;

    /// Verify that successes are deleted and failures extended and dead-lettered
    #[tokio::test]
    async fn test_process_and_handle_failures() {
        let harness = Harness::new()
            .with_processor(reject_b())
            .with_settings(wide_handling());
        harness.seed(&["a", "b", "c"]).await;

        let report = harness
            .controller
            .process_and_handle_failures("orders", "orders-dlq")
            .await
            .unwrap();

        assert_eq!(
            report.bodies_where(|o| matches!(o, MessageOutcome::Deleted)),
            vec!["a", "c"]
        );
        assert_eq!(
            report.bodies_where(|o| matches!(o, MessageOutcome::Redirected { .. })),
            vec!["b"]
        );
        assert_eq!(
            harness.recording.calls_for(TransportOperation::ChangeVisibility),
            vec![TransportCall::ChangeVisibility {
                queue: "orders".to_string(),
                body: Some("b".to_string()),
                timeout: 60,
            }]
        );
        assert_eq!(harness.bodies("orders"), vec!["b".to_string()]);
        assert_eq!(harness.bodies("orders-dlq"), vec!["b".to_string()]);
    }

    /// Verify that the default handling batch is two messages
    #[tokio::test]
    async fn test_default_batch_size() {
        let harness = Harness::new();
        harness.seed(&["a", "b", "c"]).await;

        let report = harness.controller.mark_as_read("orders").await.unwrap();

        assert_eq!(report.received(), 2);
        assert_eq!(
            harness.recording.calls_for(TransportOperation::Receive),
            vec![TransportCall::Receive {
                queue: "orders".to_string(),
                max_messages: 2,
                visibility_timeout: Some(30),
                wait_time: Some(20),
            }]
        );
    }

    /// Verify that redirecting never deletes and leaves originals in place
    #[tokio::test]
    async fn test_retry_and_redirect_never_deletes() {
        let harness = Harness::new();
        harness.seed(&["a", "b"]).await;

        let report = harness
            .controller
            .retry_and_redirect("orders", "orders-dlq")
            .await
            .unwrap();

        assert_eq!(report.redirected(), 2);
        assert_eq!(harness.recording.count(TransportOperation::Delete), 0);
        assert_eq!(harness.recording.count(TransportOperation::ChangeVisibility), 2);
        assert_eq!(harness.bodies("orders"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(harness.bodies("orders-dlq"), vec!["a".to_string(), "b".to_string()]);
    }

    /// Verify that mark-as-read only deletes
    #[tokio::test]
    async fn test_mark_as_read_only_deletes() {
        let harness = Harness::new();
        harness.seed(&["a", "b"]).await;

        let report = harness.controller.mark_as_read("orders").await.unwrap();

        assert_eq!(report.deleted(), 2);
        assert_eq!(harness.recording.count(TransportOperation::Delete), 2);
        assert_eq!(harness.recording.count(TransportOperation::ChangeVisibility), 0);
        assert_eq!(harness.recording.count(TransportOperation::Send), 0);
    }

    /// Verify that one failed delete does not stop the rest of the batch
    #[tokio::test]
    async fn test_delete_failure_isolated() {
        let harness = Harness::new();
        harness.seed(&["a", "b"]).await;
        harness.recording.fail_matching(TransportOperation::Delete, "a");

        let report = harness.controller.mark_as_read("orders").await.unwrap();

        assert_eq!(report.deleted(), 1);
        assert!(matches!(
            report.messages[0].outcome,
            MessageOutcome::Unresolved {
                step: LifecycleStep::Delete,
                ..
            }
        ));
        assert_eq!(harness.bodies("orders"), vec!["a".to_string()]);
    }

    /// Verify that a delete failing after successful processing is dead-lettered
    #[tokio::test]
    async fn test_unconfirmed_delete_takes_failure_path() {
        let harness = Harness::new();
        harness.seed(&["a"]).await;
        harness.recording.fail_always(TransportOperation::Delete);

        let report = harness
            .controller
            .process_and_handle_failures("orders", "orders-dlq")
            .await
            .unwrap();

        match &report.messages[0].outcome {
            MessageOutcome::Redirected { reason, .. } => {
                assert!(reason.starts_with("delete failed after processing"))
            }
            other => panic!("expected Redirected, got {:?}", other),
        }
        assert_eq!(harness.bodies("orders-dlq"), vec!["a".to_string()]);
    }

    /// Verify that a failed extension is recorded and the copy still sent
    #[tokio::test]
    async fn test_extension_failure_still_redirects() {
        let harness = Harness::new();
        harness.seed(&["a"]).await;
        harness
            .recording
            .fail_always(TransportOperation::ChangeVisibility);

        let report = harness
            .controller
            .retry_and_redirect("orders", "orders-dlq")
            .await
            .unwrap();

        assert!(matches!(
            report.messages[0].outcome,
            MessageOutcome::Redirected {
                visibility_extended: false,
                ..
            }
        ));
        assert_eq!(harness.bodies("orders-dlq"), vec!["a".to_string()]);
    }

    /// Verify that a failed dead-letter send aborts the batch
    #[tokio::test]
    async fn test_dead_letter_failure_aborts_batch() {
        let harness = Harness::new();
        harness.seed(&["a", "b"]).await;
        harness.recording.fail_always(TransportOperation::Send);

        let result = harness
            .controller
            .retry_and_redirect("orders", "orders-dlq")
            .await;

        assert!(matches!(result, Err(LifecycleError::DlqDispatch { .. })));
        assert_eq!(harness.recording.count(TransportOperation::Send), 1);
        assert_eq!(harness.bodies("orders"), vec!["a".to_string(), "b".to_string()]);
    }

    /// Verify that an unknown dead-letter queue is refused before receiving
    #[tokio::test]
    async fn test_unknown_dead_letter_queue() {
        let harness = Harness::new();
        harness.seed(&["a"]).await;

        let result = harness
            .controller
            .process_and_handle_failures("orders", "orders-dlq2")
            .await;

        match result {
            Err(LifecycleError::InvalidQueue { queue_name }) => assert_eq!(queue_name, "orders-dlq2"),
            other => panic!("expected InvalidQueue, got {:?}", other),
        }
        assert_eq!(harness.recording.count(TransportOperation::Receive), 0);
    }

    /// Verify that a regex processor routes matching bodies to the dead-letter queue
    #[tokio::test]
    async fn test_reject_matching_processor() {
        let harness = Harness::new()
            .with_processor(Arc::new(RejectMatching::new("^poison").unwrap()))
            .with_settings(wide_handling());
        harness.seed(&["poison-1", "ok"]).await;

        let report = harness
            .controller
            .process_and_handle_failures("orders", "orders-dlq")
            .await
            .unwrap();

        assert_eq!(report.deleted(), 1);
        assert_eq!(harness.bodies("orders-dlq"), vec!["poison-1".to_string()]);
    }
}

// ============================================================================
// Polling Tests
// ============================================================================

mod poll_tests {
    use super::*;

    fn poll_with_dlq() -> LifecycleSettings {
        LifecycleSettings {
            poll: PollSettings {
                dead_letter_queue: Some("orders-dlq".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Verify that cancelling during a blocked long-poll ends the loop
    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_long_poll() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();

        let controller = harness.controller.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { controller.poll_forever("orders", token).await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.iterations, 0);
        assert_eq!(harness.recording.count(TransportOperation::Receive), 1);
    }

    /// Verify that a zero long-poll wait is refused before any receive is issued
    #[tokio::test(start_paused = true)]
    async fn test_poll_refuses_zero_wait() {
        let harness = Harness::new().with_settings(LifecycleSettings {
            poll: PollSettings {
                wait_time_seconds: 0,
                ..Default::default()
            },
            ..Default::default()
        });

        let result = harness
            .controller
            .poll_forever("orders", CancellationToken::new())
            .await;

        assert!(matches!(result, Err(LifecycleError::Configuration { .. })));
        assert_eq!(harness.recording.count(TransportOperation::Receive), 0);
    }

    /// Verify that polled messages are processed, deleted or dead-lettered
    #[tokio::test(start_paused = true)]
    async fn test_poll_processes_batches() {
        let harness = Harness::new()
            .with_processor(reject_b())
            .with_settings(poll_with_dlq());
        harness.seed(&["a", "b", "c"]).await;
        let cancel = CancellationToken::new();

        let controller = harness.controller.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { controller.poll_forever("orders", token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.received, 3);
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.redirected, 1);
        assert_eq!(harness.bodies("orders"), vec!["b".to_string()]);
        assert_eq!(harness.bodies("orders-dlq"), vec!["b".to_string()]);

        let receive = &harness.recording.calls_for(TransportOperation::Receive)[0];
        assert_eq!(
            receive,
            &TransportCall::Receive {
                queue: "orders".to_string(),
                max_messages: 10,
                visibility_timeout: None,
                wait_time: Some(20),
            }
        );
    }

    /// Verify that failures without a dead-letter queue are left for redelivery
    #[tokio::test(start_paused = true)]
    async fn test_poll_without_dead_letter_queue() {
        let harness = Harness::new().with_processor(reject_b());
        harness.seed(&["a", "b"]).await;
        let cancel = CancellationToken::new();

        let controller = harness.controller.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { controller.poll_forever("orders", token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(harness.recording.count(TransportOperation::Send), 0);
        assert_eq!(harness.bodies("orders"), vec!["b".to_string()]);
    }

    /// Verify that an already-cancelled token issues no receive
    #[tokio::test]
    async fn test_pre_cancelled_token() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = harness
            .controller
            .poll_forever("orders", cancel)
            .await
            .unwrap();

        assert_eq!(summary, PollSummary::default());
        assert_eq!(harness.recording.count(TransportOperation::Receive), 0);
    }

    /// Verify that a receive error ends the loop with that error
    #[tokio::test]
    async fn test_receive_error_returned() {
        let harness = Harness::new();
        harness.recording.fail_always(TransportOperation::Receive);

        let result = harness
            .controller
            .poll_forever("orders", CancellationToken::new())
            .await;

        assert!(matches!(result, Err(LifecycleError::Transport(_))));
    }

    /// Verify that polling an unknown queue fails before any transport call
    #[tokio::test]
    async fn test_poll_unknown_queue() {
        let harness = Harness::new();

        let result = harness
            .controller
            .poll_forever("nope", CancellationToken::new())
            .await;

        assert!(matches!(result, Err(LifecycleError::InvalidQueue { .. })));
        assert!(harness.recording.calls().is_empty());
    }
}
