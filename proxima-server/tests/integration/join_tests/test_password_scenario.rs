use proxima_core::PeerId;
use proxima_core::utils::{REASON_INCORRECT_PASSWORD, REASON_ROOM_NOT_FOUND};
use proxima_server::ServerConfig;

use crate::integration::init_tracing;
use crate::utils::{SIGNAL_TIMEOUT_MS, TestPeer, join_request, spawn_server};

#[tokio::test]
async fn test_password_scenario() {
    init_tracing();
    let addr = spawn_server(ServerConfig::default())
        .await
        .expect("Failed to start relay");

    // Private rooms belong to the peer whose id equals the room name; that
    // owner creates the room and sets its password. A stranger joining first
    // is refused, see test_stranger_before_owner_rejected.
    let mut a = TestPeer::join(addr, join_request("r1", "r1", "1234"))
        .await
        .expect("A failed to connect");
    let open = a.expect_open().await.expect("A got no open");
    assert!(open.connections.is_empty());

    let mut b = TestPeer::join(addr, join_request("B", "r1", "1234"))
        .await
        .expect("B failed to connect");
    let open = b.expect_open().await.expect("B got no open");
    assert_eq!(open.connections.len(), 1);
    assert_eq!(open.connections[0].peer_id, PeerId::from("r1"));

    let mut c = TestPeer::join(addr, join_request("C", "r1", "wrong"))
        .await
        .expect("C failed to connect");
    let reason = c.expect_disconnect().await.expect("C was not rejected");
    assert_eq!(reason, REASON_INCORRECT_PASSWORD);
    assert!(c.next_frame(SIGNAL_TIMEOUT_MS).await.unwrap().is_none());

    // C never showed up for the members
    a.expect_open().await.expect("A should hear about B");
    a.expect_silence().await.expect("A should not hear about C");
}

#[tokio::test]
async fn test_missing_room_rejected() {
    init_tracing();
    let addr = spawn_server(ServerConfig::default())
        .await
        .expect("Failed to start relay");

    let mut peer = TestPeer::join(addr, join_request("A", "nowhere", ""))
        .await
        .expect("Failed to connect");
    let reason = peer.expect_disconnect().await.expect("Join was not rejected");
    assert_eq!(reason, REASON_ROOM_NOT_FOUND);
}

#[tokio::test]
async fn test_stranger_before_owner_rejected() {
    init_tracing();
    let addr = spawn_server(ServerConfig::default())
        .await
        .expect("Failed to start relay");

    let mut a = TestPeer::join(addr, join_request("A", "r1", "1234"))
        .await
        .expect("A failed to connect");
    let reason = a.expect_disconnect().await.expect("A was not rejected");
    assert_eq!(reason, REASON_ROOM_NOT_FOUND);

    let mut owner = TestPeer::join(addr, join_request("r1", "r1", "1234"))
        .await
        .expect("Owner failed to connect");
    let open = owner.expect_open().await.expect("Owner got no open");
    assert!(open.connections.is_empty());

    let mut a = TestPeer::join(addr, join_request("A", "r1", "1234"))
        .await
        .expect("A failed to reconnect");
    let open = a.expect_open().await.expect("A got no open");
    assert_eq!(open.connections[0].peer_id, PeerId::from("r1"));
}
