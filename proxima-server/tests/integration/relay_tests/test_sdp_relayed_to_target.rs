use proxima_core::{Payload, PeerId, SessionDescription, SignalEnvelope};
use proxima_server::ServerConfig;

use crate::integration::init_tracing;
use crate::utils::{TestPeer, join_request, spawn_server};

#[tokio::test]
async fn test_sdp_relayed_to_target() {
    init_tracing();
    let addr = spawn_server(ServerConfig::default())
        .await
        .expect("Failed to start relay");

    let mut a = TestPeer::join(addr, join_request("room", "room", ""))
        .await
        .expect("A failed to connect");
    a.expect_open().await.expect("A got no open");
    let mut b = TestPeer::join(addr, join_request("B", "room", ""))
        .await
        .expect("B failed to connect");
    b.expect_open().await.expect("B got no open");
    let mut c = TestPeer::join(addr, join_request("C", "room", ""))
        .await
        .expect("C failed to connect");
    c.expect_open().await.expect("C got no open");
    a.expect_open().await.expect("A not told about B");
    a.expect_open().await.expect("A not told about C");
    b.expect_open().await.expect("B not told about C");

    let offer = SessionDescription::offer("v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n");
    b.send_envelope(SignalEnvelope::direct(
        PeerId::from("somebody-else"),
        PeerId::from("room"),
        Payload::Sdp { sdp: offer.clone() },
    ))
    .await
    .expect("Send failed");

    let received = a.expect_envelope().await.expect("A got no sdp");
    assert_eq!(received.from, PeerId::from("B"));
    assert_eq!(received.payload, Payload::Sdp { sdp: offer });

    // unicast stays unicast
    c.expect_silence().await.expect("C saw a unicast envelope");
}
