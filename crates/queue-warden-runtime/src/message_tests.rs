//! Tests for message types and domain identifiers.

use super::*;

// ============================================================================
// QueueName Tests
// ============================================================================

mod queue_name_tests {
    use super::*;

    /// Verify that typical queue names are accepted
    #[test]
    fn test_valid_queue_names() {
        for name in ["orders", "orders-dlq", "Orders_2024", "a", "events.fifo"] {
            assert!(QueueName::new(name.to_string()).is_ok(), "{} should be valid", name);
        }
    }

    /// Verify that names breaking the character or length rules are rejected
    #[test]
    fn test_invalid_queue_names() {
        let too_long = "q".repeat(81);
        for name in ["", "orders dlq", "orders/dlq", ".fifo", "ordérs", too_long.as_str()] {
            assert!(
                QueueName::new(name.to_string()).is_err(),
                "{:?} should be invalid",
                name
            );
        }
    }

    /// Verify that the maximum length is inclusive
    #[test]
    fn test_queue_name_length_boundary() {
        let name = "q".repeat(80);
        assert!(QueueName::new(name).is_ok());
    }

    /// Verify that FIFO suffix detection works
    #[test]
    fn test_fifo_detection() {
        let fifo: QueueName = "events.fifo".parse().unwrap();
        let standard: QueueName = "events".parse().unwrap();

        assert!(fifo.is_fifo());
        assert!(!standard.is_fifo());
    }

    /// Verify that queue names deserialize through validation
    #[test]
    fn test_queue_name_deserialization_validates() {
        let name: QueueName = serde_json::from_str("\"orders\"").unwrap();
        assert_eq!(name.as_str(), "orders");

        let invalid: Result<QueueName, _> = serde_json::from_str("\"bad name\"");
        assert!(invalid.is_err());
    }
}

// ============================================================================
// QueueUrl Tests
// ============================================================================

mod queue_url_tests {
    use super::*;

    /// Verify that the queue name is taken from the last path segment
    #[test]
    fn test_queue_name_from_url() {
        let url = QueueUrl::new(
            "https://sqs.us-east-1.amazonaws.com/123456789012/orders-dlq".to_string(),
        )
        .unwrap();

        assert_eq!(url.queue_name().unwrap().as_str(), "orders-dlq");
    }

    /// Verify that a trailing slash does not hide the queue name
    #[test]
    fn test_queue_name_from_url_with_trailing_slash() {
        let url = QueueUrl::new("http://localhost:9324/000000000000/orders/".to_string()).unwrap();

        assert_eq!(url.queue_name().unwrap().as_str(), "orders");
    }

    /// Verify that blank URLs are rejected
    #[test]
    fn test_blank_url_rejected() {
        assert!(QueueUrl::new(String::new()).is_err());
        assert!(QueueUrl::new("   ".to_string()).is_err());
    }
}

// ============================================================================
// Identifier Tests
// ============================================================================

mod identifier_tests {
    use super::*;

    /// Verify that generated message IDs are unique
    #[test]
    fn test_message_id_generation() {
        let first = MessageId::new();
        let second = MessageId::new();

        assert_ne!(first, second);
        assert!(!first.as_str().is_empty());
    }

    /// Verify that parsing an empty message ID fails
    #[test]
    fn test_message_id_parse_requires_value() {
        assert!("".parse::<MessageId>().is_err());
        assert_eq!("abc".parse::<MessageId>().unwrap().as_str(), "abc");
    }

    /// Verify that receipt handles are required and abbreviated in debug output
    #[test]
    fn test_receipt_handle_debug_is_abbreviated() {
        assert!(ReceiptHandle::new(String::new()).is_err());

        let handle = ReceiptHandle::new("AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a".to_string()).unwrap();
        let debug = format!("{:?}", handle);

        assert!(debug.contains("AQEBwJnKyrHi..."));
        assert!(!debug.contains("SLy0a"));
    }

    /// Verify that short receipt handles are shown in full
    #[test]
    fn test_short_receipt_handle_not_truncated() {
        let handle = ReceiptHandle::new("r-1".to_string()).unwrap();
        assert_eq!(handle.abbreviated(), "r-1");
    }
}

// ============================================================================
// Timing Tests
// ============================================================================

mod timing_tests {
    use super::*;

    /// Verify visibility timeout bounds
    #[test]
    fn test_visibility_timeout_bounds() {
        assert!(VisibilityTimeout::new(0).is_ok());
        assert!(VisibilityTimeout::new(43_200).is_ok());
        assert!(VisibilityTimeout::new(43_201).is_err());

        let timeout = VisibilityTimeout::new(60).unwrap();
        assert_eq!(timeout.as_duration(), Duration::from_secs(60));
        assert_eq!(timeout.to_string(), "60s");
    }

    /// Verify wait time bounds
    #[test]
    fn test_wait_time_bounds() {
        assert!(WaitTime::new(0).is_ok());
        assert!(WaitTime::new(20).is_ok());
        assert!(WaitTime::new(21).is_err());
    }
}

// ============================================================================
// Message Tests
// ============================================================================

mod message_tests {
    use super::*;

    /// Verify that outgoing messages collect attributes
    #[test]
    fn test_outgoing_message_builder() {
        let message = OutgoingMessage::new("order-17")
            .with_attribute("source", "checkout")
            .with_attribute("priority", "high");

        assert_eq!(message.body, "order-17");
        assert_eq!(message.attributes.len(), 2);
        assert_eq!(message.attributes.get("source").unwrap(), "checkout");
    }

    /// Verify that a received message can be forwarded with identical content
    #[test]
    fn test_received_message_to_outgoing() {
        let mut attributes = HashMap::new();
        attributes.insert("trace".to_string(), "t-1".to_string());

        let received = ReceivedMessage {
            message_id: MessageId::new(),
            receipt_handle: ReceiptHandle::new("receipt".to_string()).unwrap(),
            body: "payload".to_string(),
            attributes: attributes.clone(),
            receive_count: 3,
            message_group_id: None,
        };

        let outgoing = received.to_outgoing();
        assert_eq!(outgoing.body, "payload");
        assert_eq!(outgoing.attributes, attributes);
        assert_eq!(outgoing.message_group_id, None);
        assert_eq!(
            outgoing.deduplication_id.as_deref(),
            Some(received.message_id.as_str())
        );
    }

    /// Verify that serialized received messages omit the receipt handle
    #[test]
    fn test_received_message_serialization_skips_receipt() {
        let received = ReceivedMessage {
            message_id: "m-1".parse().unwrap(),
            receipt_handle: ReceiptHandle::new("secret-receipt".to_string()).unwrap(),
            body: "payload".to_string(),
            attributes: HashMap::new(),
            receive_count: 1,
            message_group_id: None,
        };

        let json = serde_json::to_string(&received).unwrap();
        assert!(json.contains("payload"));
        assert!(!json.contains("secret-receipt"));
    }
}

// ============================================================================
// ReceiveRequest Tests
// ============================================================================

mod receive_request_tests {
    use super::*;

    /// Verify batch size limits
    #[test]
    fn test_batch_size_limits() {
        assert!(ReceiveRequest::new(0).is_err());
        assert!(ReceiveRequest::new(1).is_ok());
        assert!(ReceiveRequest::new(10).is_ok());
        assert!(ReceiveRequest::new(11).is_err());
    }

    /// Verify that builder methods set the optional timing fields
    #[test]
    fn test_receive_request_builder() {
        let request = ReceiveRequest::new(5)
            .unwrap()
            .with_visibility_timeout(VisibilityTimeout::new(60).unwrap())
            .with_wait_time(WaitTime::new(20).unwrap());

        assert_eq!(request.max_messages, 5);
        assert_eq!(request.visibility_timeout.unwrap().as_secs(), 60);
        assert_eq!(request.wait_time.unwrap().as_secs(), 20);
    }
}
