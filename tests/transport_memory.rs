// tests/transport_memory.rs

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use rpc_envelope::{
    // ---
    create_memory_transport_with_hub,
    Address,
    CorrelationId,
    DeliveryMode,
    Frame,
    MemoryHub,
    Subscription,
    TraceContext,
};

#[tokio::test]
async fn memory_subscribe_then_publish_delivers() {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let transport = create_memory_transport_with_hub("mstpd", hub)
        .await
        .expect("failed to create memory transport");
    assert_eq!(transport.transport_id(), "mstpd");

    let address = Address::from("test.address");

    let mut sub = transport
        .subscribe(address.clone().into())
        .await
        .expect("subscribe failed");

    let payload = Bytes::from_static(b"hello");
    let trace = TraceContext::root().header();

    let frame = Frame::call(
        address.clone(),
        payload.clone(),
        CorrelationId::generate().as_str().into(),
        Address::from("responses/mstpd"),
        Some(trace.clone()),
    );

    // ---
    // Act
    // ---
    transport.publish(frame).await.expect("publish failed");

    // ---
    // Assert
    // ---
    let received = timeout(Duration::from_millis(100), sub.inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription channel closed unexpectedly");

    assert_eq!(received.payload, payload);
    assert_eq!(received.address, address);
    assert_eq!(received.delivery_mode, DeliveryMode::RequestReply);
    assert_eq!(received.trace, Some(trace));
}

#[tokio::test]
async fn memory_publish_without_subscriber_is_dropped() {
    // ---
    let hub = MemoryHub::new();
    let transport = create_memory_transport_with_hub("lonely", hub)
        .await
        .expect("failed to create memory transport");

    let frame = Frame::oneway(Address::from("nobody.home"), Bytes::new(), None);
    transport.publish(frame).await.expect("publish failed");
}

#[tokio::test]
async fn memory_hubs_are_isolated() {
    // ---
    let a = create_memory_transport_with_hub("a", MemoryHub::new())
        .await
        .expect("failed to create memory transport");
    let b = create_memory_transport_with_hub("b", MemoryHub::new())
        .await
        .expect("failed to create memory transport");

    let mut sub = b
        .subscribe(Subscription::from("shared.address"))
        .await
        .expect("subscribe failed");

    a.publish(Frame::oneway(
        Address::from("shared.address"),
        Bytes::from_static(b"x"),
        None,
    ))
    .await
    .expect("publish failed");

    let res = timeout(Duration::from_millis(50), sub.inbox.recv()).await;
    assert!(res.is_err(), "frame crossed hubs");
}

#[tokio::test]
async fn memory_close_ends_subscriptions() {
    // ---
    let hub = MemoryHub::new();
    let transport = create_memory_transport_with_hub("closer", hub)
        .await
        .expect("failed to create memory transport");

    let mut sub = transport
        .subscribe(Subscription::from("requests/svc"))
        .await
        .expect("subscribe failed");

    transport.close().await.expect("close failed");

    let next = timeout(Duration::from_millis(100), sub.inbox.recv())
        .await
        .expect("inbox did not close");
    assert!(next.is_none());
}

#[tokio::test]
async fn memory_rejects_empty_node_id() {
    // ---
    let res = create_memory_transport_with_hub("", MemoryHub::new()).await;
    assert!(res.is_err());
}
