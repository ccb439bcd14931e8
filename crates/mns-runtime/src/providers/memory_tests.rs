//! Tests for the in-memory transport.

use super::*;

fn queue_name(name: &str) -> QueueName {
    QueueName::new(name).unwrap()
}

fn topic_name(name: &str) -> TopicName {
    TopicName::new(name).unwrap()
}

// ============================================================================
// Receive and Delete
// ============================================================================

mod receive_and_delete {
    use super::*;

    /// A message sent to a queue is received with a receipt handle.
    #[tokio::test]
    async fn test_receive_returns_sent_message() {
        let transport = InMemoryTransport::default();
        let queue = transport.queue(&queue_name("orders"));

        let sent_id = transport.send_raw(&queue_name("orders"), "body-1").unwrap();
        let received = queue
            .receive(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("message should be delivered");

        assert_eq!(received.message_id, sent_id);
        assert_eq!(received.body, "body-1");
        assert_eq!(received.dequeue_count, 1);
        assert!(!received.receipt_handle.handle().is_empty());
    }

    /// An empty queue returns nothing once the wait window elapses.
    #[tokio::test(start_paused = true)]
    async fn test_receive_from_empty_queue_times_out() {
        let transport = InMemoryTransport::default();
        let queue = transport.queue(&queue_name("orders"));

        let started = Instant::now();
        let received = queue.receive(Duration::from_secs(5)).await.unwrap();

        assert!(received.is_none());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    /// A zero wait polls once without blocking.
    #[tokio::test]
    async fn test_zero_wait_returns_immediately() {
        let transport = InMemoryTransport::default();
        let queue = transport.queue(&queue_name("orders"));

        assert!(queue.receive(Duration::ZERO).await.unwrap().is_none());
    }

    /// A long-polling receiver wakes up when a message arrives.
    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_send() {
        let transport = InMemoryTransport::default();
        let queue = transport.queue(&queue_name("orders"));

        let sender = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            sender.send_raw(&queue_name("orders"), "late").unwrap();
        });

        let started = Instant::now();
        let received = queue.receive(Duration::from_secs(30)).await.unwrap();

        assert_eq!(received.map(|m| m.body), Some("late".to_string()));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    /// Messages are delivered in the order they were sent.
    #[tokio::test]
    async fn test_messages_delivered_in_send_order() {
        let transport = InMemoryTransport::default();
        let name = queue_name("orders");
        let queue = transport.queue(&name);

        for body in ["one", "two", "three"] {
            transport.send_raw(&name, body).unwrap();
        }

        let mut bodies = Vec::new();
        while let Some(m) = queue.receive(Duration::ZERO).await.unwrap() {
            bodies.push(m.body);
        }

        assert_eq!(bodies, vec!["one", "two", "three"]);
    }

    /// Deleting with a valid receipt removes the message for good.
    #[tokio::test]
    async fn test_delete_removes_message() {
        let transport = InMemoryTransport::default();
        let name = queue_name("orders");
        let queue = transport.queue(&name);
        transport.send_raw(&name, "body").unwrap();

        let received = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(transport.in_flight_count(&name), 1);

        queue.delete(&received.receipt_handle).await.unwrap();

        assert_eq!(transport.in_flight_count(&name), 0);
        assert_eq!(transport.pending_count(&name), 0);
    }

    /// Deleting twice fails the second time.
    #[tokio::test]
    async fn test_delete_unknown_receipt_fails() {
        let transport = InMemoryTransport::default();
        let name = queue_name("orders");
        let queue = transport.queue(&name);
        transport.send_raw(&name, "body").unwrap();

        let received = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        queue.delete(&received.receipt_handle).await.unwrap();

        match queue.delete(&received.receipt_handle).await {
            Err(MnsError::MessageNotFound { receipt }) => {
                assert_eq!(receipt, received.receipt_handle.handle());
            }
            other => panic!("Expected MessageNotFound, got: {:?}", other),
        }
    }
}

// ============================================================================
// Visibility Timeout
// ============================================================================

mod visibility_timeout {
    use super::*;

    fn transport_with_visibility(secs: u64) -> InMemoryTransport {
        InMemoryTransport::new(InMemoryConfig {
            visibility_timeout: Duration::from_secs(secs),
            ..InMemoryConfig::default()
        })
    }

    /// A received message is hidden from other receivers.
    #[tokio::test(start_paused = true)]
    async fn test_received_message_is_hidden() {
        let transport = transport_with_visibility(10);
        let name = queue_name("orders");
        let queue = transport.queue(&name);
        transport.send_raw(&name, "body").unwrap();

        assert!(queue.receive(Duration::ZERO).await.unwrap().is_some());
        assert!(queue.receive(Duration::ZERO).await.unwrap().is_none());
        assert_eq!(transport.pending_count(&name), 0);
    }

    /// An undeleted message comes back after the visibility timeout with a
    /// higher dequeue count.
    #[tokio::test(start_paused = true)]
    async fn test_undeleted_message_is_redelivered() {
        let transport = transport_with_visibility(10);
        let name = queue_name("orders");
        let queue = transport.queue(&name);
        let sent_id = transport.send_raw(&name, "body").unwrap();

        let first = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        let second = queue
            .receive(Duration::from_secs(30))
            .await
            .unwrap()
            .expect("message should reappear after visibility timeout");

        assert_eq!(second.message_id, sent_id);
        assert_eq!(second.dequeue_count, 2);
        assert!(second.is_redelivery());
        assert_ne!(first.receipt_handle, second.receipt_handle);
        assert_eq!(first.first_dequeued_at, second.first_dequeued_at);
    }

    /// A receipt handle stops working once its visibility timeout lapsed.
    #[tokio::test(start_paused = true)]
    async fn test_delete_after_visibility_timeout_fails() {
        let transport = transport_with_visibility(10);
        let name = queue_name("orders");
        let queue = transport.queue(&name);
        transport.send_raw(&name, "body").unwrap();

        let received = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let result = queue.delete(&received.receipt_handle).await;
        assert!(matches!(result, Err(MnsError::MessageNotFound { .. })));
        assert_eq!(transport.pending_count(&name), 1);
    }

    /// Redelivered messages are handed out before newer ones.
    #[tokio::test(start_paused = true)]
    async fn test_redelivered_message_goes_first() {
        let transport = transport_with_visibility(10);
        let name = queue_name("orders");
        let queue = transport.queue(&name);
        transport.send_raw(&name, "old").unwrap();

        queue.receive(Duration::ZERO).await.unwrap().unwrap();
        transport.send_raw(&name, "new").unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let next = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(next.body, "old");
    }
}

// ============================================================================
// Limits
// ============================================================================

mod limits {
    use super::*;

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let transport = InMemoryTransport::new(InMemoryConfig {
            max_message_size: 4,
            ..InMemoryConfig::default()
        });

        let result = transport.send_raw(&queue_name("orders"), "12345");
        assert!(matches!(
            result,
            Err(MnsError::MessageTooLarge {
                size: 5,
                max_size: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_send() {
        let transport = InMemoryTransport::new(InMemoryConfig {
            max_queue_size: 1,
            ..InMemoryConfig::default()
        });
        let name = queue_name("orders");

        transport.send_raw(&name, "a").unwrap();
        match transport.send_raw(&name, "b") {
            Err(MnsError::ProviderError { code, .. }) => assert_eq!(code, "QueueFull"),
            other => panic!("Expected ProviderError, got: {:?}", other),
        }
    }
}

// ============================================================================
// Topics
// ============================================================================

mod topics {
    use super::*;

    /// Publishing returns a message id and the created status.
    #[tokio::test]
    async fn test_publish_returns_receipt() {
        let transport = InMemoryTransport::default();
        let topic = transport.topic(&topic_name("alerts"));

        let receipt = topic.publish("body".to_string(), "urgent").await.unwrap();

        assert_eq!(receipt.status_code, 201);
        let published = transport.published(&topic_name("alerts"));
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].message_id, receipt.message_id);
        assert_eq!(published[0].filter_tag, "urgent");
    }

    /// Publishes fan out to every matching subscription.
    #[tokio::test]
    async fn test_publish_fans_out_to_subscribed_queues() {
        let transport = InMemoryTransport::default();
        let alerts = topic_name("alerts");
        transport.subscribe(&alerts, &queue_name("pager"), None);
        transport.subscribe(&alerts, &queue_name("audit"), None);

        transport
            .topic(&alerts)
            .publish("body".to_string(), "")
            .await
            .unwrap();

        assert_eq!(transport.pending_count(&queue_name("pager")), 1);
        assert_eq!(transport.pending_count(&queue_name("audit")), 1);
    }

    /// A subscription with a filter tag only receives matching publishes.
    #[tokio::test]
    async fn test_filter_tag_limits_delivery() {
        let transport = InMemoryTransport::default();
        let alerts = topic_name("alerts");
        let pager = queue_name("pager");
        transport.subscribe(&alerts, &pager, Some("urgent"));

        let topic = transport.topic(&alerts);
        topic.publish("low".to_string(), "info").await.unwrap();
        topic.publish("high".to_string(), "urgent").await.unwrap();
        topic.publish("none".to_string(), "").await.unwrap();

        let queue = transport.queue(&pager);
        let received = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(received.body, "high");
        assert!(queue.receive(Duration::ZERO).await.unwrap().is_none());
    }

    /// A topic without subscriptions accepts and drops publishes.
    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let transport = InMemoryTransport::default();
        let result = transport
            .topic(&topic_name("nobody-listens"))
            .publish("body".to_string(), "")
            .await;

        assert!(result.is_ok());
    }

    /// A topic and a queue with the same name do not interfere.
    #[tokio::test]
    async fn test_topic_and_queue_namespaces_are_independent() {
        let transport = InMemoryTransport::default();
        transport
            .topic(&topic_name("orders"))
            .publish("to-topic".to_string(), "")
            .await
            .unwrap();

        assert_eq!(transport.pending_count(&queue_name("orders")), 0);
    }

    /// A full subscriber rejects the publish for every subscriber, so a
    /// retried publish is not duplicated in the queues that had room.
    #[tokio::test]
    async fn test_full_subscriber_rejects_whole_publish() {
        let transport = InMemoryTransport::new(InMemoryConfig {
            max_queue_size: 1,
            ..InMemoryConfig::default()
        });
        let alerts = topic_name("alerts");
        let audit = queue_name("audit");
        let pager = queue_name("pager");
        transport.subscribe(&alerts, &audit, None);
        transport.subscribe(&alerts, &pager, None);
        transport.send_raw(&pager, "backlog").unwrap();

        let result = transport
            .topic(&alerts)
            .publish("body".to_string(), "")
            .await;

        match result {
            Err(MnsError::ProviderError { code, .. }) => assert_eq!(code, "QueueFull"),
            other => panic!("Expected ProviderError, got: {:?}", other),
        }
        assert_eq!(transport.pending_count(&audit), 0);
        assert_eq!(transport.pending_count(&pager), 1);
        assert!(transport.published(&alerts).is_empty());
    }

    /// Subscribing the same queue twice still delivers one copy.
    #[tokio::test]
    async fn test_duplicate_subscription_delivers_once() {
        let transport = InMemoryTransport::default();
        let alerts = topic_name("alerts");
        let pager = queue_name("pager");
        transport.subscribe(&alerts, &pager, None);
        transport.subscribe(&alerts, &pager, Some("urgent"));

        transport
            .topic(&alerts)
            .publish("body".to_string(), "urgent")
            .await
            .unwrap();

        assert_eq!(transport.pending_count(&pager), 1);
    }

    #[tokio::test]
    async fn test_oversized_publish_rejected() {
        let transport = InMemoryTransport::new(InMemoryConfig {
            max_message_size: 3,
            ..InMemoryConfig::default()
        });

        let result = transport
            .topic(&topic_name("alerts"))
            .publish("toolong".to_string(), "")
            .await;

        assert!(matches!(result, Err(MnsError::MessageTooLarge { .. })));
        assert!(transport.published(&topic_name("alerts")).is_empty());
    }
}

#[test]
fn test_transport_name() {
    assert_eq!(InMemoryTransport::default().name(), "memory");
}
