use proxima_client::ClientError;
use proxima_client::signaling::{
    ConnectionState, DefaultPlatformProbe, SignalingClient, SignalingEvent, SignalingOutput,
};
use proxima_core::{ClientFrame, Payload, PeerId, ServerFrame, Target};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::integration::init_tracing;
use crate::utils::{FakeConnector, client_config, open_envelope, recv_within};

#[tokio::test]
async fn test_ready_after_first_message() {
    init_tracing();
    let (connector, mut sessions) = FakeConnector::new();
    let (tx, mut events) = mpsc::unbounded_channel();
    let client = SignalingClient::new(
        client_config("alice"),
        connector.clone(),
        Arc::new(DefaultPlatformProbe),
        tx,
    );

    assert_eq!(
        client.send_broadcast(Payload::Close),
        Err(ClientError::NotConnected)
    );

    client
        .connect("room", "1234", vec![PeerId::from("bob")])
        .expect("connect failed");
    let mut relay = recv_within(&mut sessions).await.expect("no connection attempt");

    let Some(ClientFrame::Join(join)) = recv_within(&mut relay.from_client).await else {
        panic!("first frame was not a join");
    };
    assert_eq!(join.peer_id, PeerId::from("alice"));
    assert_eq!(join.room_name, "room");
    assert_eq!(join.room_password, "1234");
    assert_eq!(join.players_in_instance, vec![PeerId::from("bob")]);

    assert!(matches!(
        recv_within(&mut events).await,
        Some(SignalingEvent::Connected)
    ));
    // an empty room says nothing, so the client is not ready yet
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(matches!(
        client.connect("room", "", Vec::new()),
        Err(ClientError::AlreadyConnected)
    ));

    relay
        .to_client
        .send(ServerFrame::Message(open_envelope("alice", &[], false)))
        .unwrap();
    assert!(matches!(
        recv_within(&mut events).await,
        Some(SignalingEvent::Ready)
    ));
    assert!(matches!(
        recv_within(&mut events).await,
        Some(SignalingEvent::Message(_))
    ));
    assert_eq!(client.state(), ConnectionState::Ready);

    client.send_broadcast(Payload::Close).expect("broadcast failed");
    let Some(ClientFrame::Message(envelope)) = recv_within(&mut relay.from_client).await else {
        panic!("broadcast not forwarded");
    };
    assert_eq!(envelope.from, PeerId::from("alice"));
    assert_eq!(envelope.target, Target::All);

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        recv_within(&mut events).await,
        Some(SignalingEvent::Disconnected(None))
    ));
    assert_eq!(connector.attempts(), 1);
}
