use std::time::Duration;

use dotalytics_core::job::{JobMessage, JobType};
use dotalytics_core::traits::{BrokerDelivery, MessageBroker};

use crate::integration::common::setup_test_broker;

fn test_message(job_id: i64) -> JobMessage {
    JobMessage {
        job_id,
        job_type: JobType::IngestMatches,
        target: None,
    }
}

#[tokio::test]
async fn publish_then_consume_and_ack() {
    let (broker, _container) = setup_test_broker("test-publish-consume").await;

    broker.publish(&test_message(1)).await.unwrap();

    let delivery = broker
        .next_delivery()
        .await
        .unwrap()
        .expect("a delivery should arrive");
    let received: JobMessage = serde_json::from_slice(delivery.payload()).unwrap();
    assert_eq!(received, test_message(1));

    delivery.ack().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(broker.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn wire_format_is_plain_json() {
    let (broker, _container) = setup_test_broker("test-wire-format").await;

    let message = JobMessage {
        job_id: 42,
        job_type: JobType::IngestHeroes,
        target: Some("pro".to_string()),
    };
    broker.publish(&message).await.unwrap();

    let delivery = broker.next_delivery().await.unwrap().unwrap();
    let body = std::str::from_utf8(delivery.payload()).unwrap().to_string();
    delivery.ack().await.unwrap();

    assert_eq!(body, r#"{"jobId":42,"type":"IngestHeroes","target":"pro"}"#);
}

#[tokio::test]
async fn nack_with_requeue_redelivers() {
    let (broker, _container) = setup_test_broker("test-nack-requeue").await;

    broker.publish(&test_message(7)).await.unwrap();

    let delivery = broker.next_delivery().await.unwrap().unwrap();
    delivery.nack(true).await.unwrap();

    let redelivery = broker.next_delivery().await.unwrap().unwrap();
    let received: JobMessage = serde_json::from_slice(redelivery.payload()).unwrap();
    assert_eq!(received.job_id, 7);
    redelivery.ack().await.unwrap();
}

#[tokio::test]
async fn nack_without_requeue_drops() {
    let (broker, _container) = setup_test_broker("test-nack-drop").await;

    broker.publish(&test_message(9)).await.unwrap();

    let delivery = broker.next_delivery().await.unwrap().unwrap();
    delivery.nack(false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(broker.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn queue_depth_counts_ready_messages() {
    let (broker, _container) = setup_test_broker("test-queue-depth").await;

    broker.publish(&test_message(1)).await.unwrap();
    broker.publish(&test_message(2)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(broker.queue_depth().await.unwrap(), 2);
}

#[tokio::test]
async fn prefetch_holds_one_unacked_delivery() {
    let (broker, _container) = setup_test_broker("test-prefetch").await;

    broker.publish(&test_message(1)).await.unwrap();
    broker.publish(&test_message(2)).await.unwrap();

    let first = broker.next_delivery().await.unwrap().unwrap();

    // With the first delivery unacked, the second message stays ready
    // on the queue instead of being pushed to this consumer.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(broker.queue_depth().await.unwrap(), 1);

    first.ack().await.unwrap();
    let second = broker.next_delivery().await.unwrap().unwrap();
    second.ack().await.unwrap();
}
