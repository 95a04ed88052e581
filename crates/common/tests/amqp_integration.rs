#![cfg(feature = "integration-tests")]

use common::amqp::{ConnectionManager, ExponentialBackoff, LapinConnector, Subscription};
use common::domain::{ExchangeKind, OutboundMessage, PublishOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::rabbitmq::RabbitMq;
use tokio::sync::mpsc;

async fn setup_broker() -> (ContainerAsync<RabbitMq>, ConnectionManager) {
    let rabbitmq = RabbitMq::default().start().await.unwrap();
    let host = rabbitmq.get_host().await.unwrap();
    let port = rabbitmq.get_host_port_ipv4(5672).await.unwrap();
    let url = format!("amqp://guest:guest@{}:{}/%2f", host, port);

    let backoff = ExponentialBackoff::new(
        Duration::from_millis(200),
        2.0,
        Duration::from_secs(2),
        Duration::from_secs(30),
    );
    let manager = ConnectionManager::new(Arc::new(LapinConnector::new(url)), Box::new(backoff));

    let (signal_tx, mut signal_rx) = mpsc::channel(4);
    manager.start(signal_tx).await.unwrap();
    assert_eq!(signal_rx.recv().await, Some(true));

    (rabbitmq, manager)
}

#[tokio::test]
async fn test_direct_exchange_round_trip() {
    let (_container, manager) = setup_broker().await;

    let (tx, mut rx) = mpsc::channel(8);
    manager
        .on_message(
            &Subscription::new("it-devices", "devices", ExchangeKind::Direct, "device.register"),
            tx,
        )
        .await
        .unwrap();

    manager
        .publish_persistent_message(
            "devices",
            ExchangeKind::Direct,
            "device.register",
            &json!({"id": "fbe64efa6c7f717e", "name": "lamp"}),
            &PublishOptions::default()
                .with_authorization("tok")
                .with_correlation_id("cid-1"),
        )
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(msg.exchange, "devices");
    assert_eq!(msg.routing_key, "device.register");
    assert_eq!(msg.authorization(), Some("tok"));
    assert_eq!(msg.correlation_id.as_deref(), Some("cid-1"));

    let body: serde_json::Value = serde_json::from_slice(msg.body.as_ref().unwrap()).unwrap();
    assert_eq!(body["name"], "lamp");

    manager.stop().await;
}

#[tokio::test]
async fn test_fanout_and_reply_queue_share_destination() {
    let (_container, manager) = setup_broker().await;

    let (tx, mut rx) = mpsc::channel(8);
    manager
        .on_message(
            &Subscription::new("it-data-sent", "data.sent", ExchangeKind::Fanout, ""),
            tx.clone(),
        )
        .await
        .unwrap();
    manager
        .on_message(
            &Subscription::new("it-replies", "devices", ExchangeKind::Direct, "it-replies"),
            tx,
        )
        .await
        .unwrap();

    manager
        .publish_persistent_message(
            "data.sent",
            ExchangeKind::Fanout,
            "any.key",
            &json!({"id": "fbe64efa6c7f717e", "data": []}),
            &PublishOptions::default(),
        )
        .await
        .unwrap();

    let reply = OutboundMessage::reply("it-replies", "cid-2", &json!({"error": null})).unwrap();
    manager
        .publish_persistent_message(
            &reply.exchange,
            reply.kind,
            &reply.routing_key,
            &reply.payload,
            &reply.options,
        )
        .await
        .unwrap();

    let mut exchanges = Vec::new();
    for _ in 0..2 {
        let msg = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        exchanges.push(msg.exchange);
    }
    exchanges.sort();

    // default-exchange deliveries report an empty exchange name
    assert_eq!(exchanges, vec!["".to_string(), "data.sent".to_string()]);

    manager.stop().await;
}
