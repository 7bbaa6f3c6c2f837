use super::*;

#[tokio::test]
async fn test_round_trip_both_directions() {
    let (mut left, mut right) = port_pair::<String, u32>("test");

    left.send("hello".to_string()).unwrap();
    right.send(7).unwrap();

    assert_eq!(right.recv().await.as_deref(), Some("hello"));
    assert_eq!(left.recv().await, Some(7));
}

#[tokio::test]
async fn test_ends_have_distinct_ids() {
    let (left, right) = port_pair::<(), ()>("ids");
    assert_ne!(left.id(), right.id());
    assert_eq!(left.sender.id(), left.receiver.id());
}

#[tokio::test]
async fn test_disconnect_fails_later_sends() {
    let (left, right) = port_pair::<u32, u32>("disconnect");

    right.disconnect();

    assert_eq!(left.send(1), Err(ChannelError::Disconnected));
    assert_eq!(right.send(1), Err(ChannelError::Disconnected));
    assert!(!left.sender.is_connected());
}

#[tokio::test]
async fn test_queued_messages_drain_before_none() {
    let (left, mut right) = port_pair::<u32, u32>("drain");

    left.send(1).unwrap();
    left.send(2).unwrap();
    left.disconnect();

    assert_eq!(right.recv().await, Some(1));
    assert_eq!(right.recv().await, Some(2));
    assert_eq!(right.recv().await, None);
}

#[tokio::test]
async fn test_dropping_receiver_disconnects_pair() {
    let (left, right) = port_pair::<u32, u32>("drop");
    let (right_sender, right_receiver) = right.split();

    drop(right_receiver);

    assert!(left.send(1).is_err());
    assert!(right_sender.send(1).is_err());
}

#[tokio::test]
async fn test_recv_wakes_on_remote_disconnect() {
    let (left, mut right) = port_pair::<u32, u32>("wake");

    let waiter = tokio::spawn(async move { right.recv().await });
    tokio::task::yield_now().await;
    left.disconnect();

    assert_eq!(waiter.await.unwrap(), None);
}

#[tokio::test]
async fn test_closed_resolves_after_disconnect() {
    let (left, right) = port_pair::<u32, u32>("closed");
    let sender = left.sender.clone();

    right.disconnect();
    tokio::time::timeout(std::time::Duration::from_secs(1), sender.closed())
        .await
        .expect("closed() should resolve");
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (left, _right) = port_pair::<u32, u32>("idempotent");
    left.disconnect();
    left.disconnect();
    assert!(!left.sender.is_connected());
}
