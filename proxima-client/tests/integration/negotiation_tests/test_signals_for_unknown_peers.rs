use proxima_client::negotiation::NegotiationState;
use proxima_core::{IceCandidate, Payload, PeerId, SessionDescription};

use crate::integration::init_tracing;
use crate::utils::{direct, engine_harness, open_envelope, wait_until};

fn candidate() -> IceCandidate {
    IceCandidate {
        candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".to_owned(),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}

#[tokio::test]
async fn test_unknown_sender_is_dropped() {
    init_tracing();
    let h = engine_harness("alice");

    for payload in [
        Payload::Sdp {
            sdp: SessionDescription::offer("v=0"),
        },
        Payload::Sdp {
            sdp: SessionDescription::answer("v=0"),
        },
        Payload::Ice { ice: candidate() },
        Payload::Close,
    ] {
        h.engine
            .handle_envelope(direct("ghost", "alice", payload))
            .await;
    }

    assert!(h.engine.peers().is_empty());
    assert_eq!(h.links.created(), 0);
    assert!(h.signaling.sent().is_empty());
    assert!(h.sink.removed().is_empty());
}

#[tokio::test]
async fn test_early_ice_failure_is_swallowed() {
    init_tracing();
    let h = engine_harness("bob");
    let alice = PeerId::from("alice");
    h.links.set_fail_ice(true);

    h.engine
        .handle_envelope(open_envelope("bob", &["alice"], true))
        .await;
    // arrives before the offer: no remote description yet
    h.engine
        .handle_envelope(direct("alice", "bob", Payload::Ice { ice: candidate() }))
        .await;

    let link = h.links.wait_link("alice").await;
    assert!(h.engine.peer(&alice).is_some());
    assert_eq!(link.closes(), 0);
    assert!(h.sink.removed().is_empty());

    h.engine
        .handle_envelope(direct(
            "alice",
            "bob",
            Payload::Sdp {
                sdp: SessionDescription::offer("v=0"),
            },
        ))
        .await;
    assert_eq!(h.engine.peer(&alice).unwrap().state, NegotiationState::Stable);

    // the same failure once negotiation is stable ends the peer
    h.engine
        .handle_envelope(direct("alice", "bob", Payload::Ice { ice: candidate() }))
        .await;
    assert!(h.engine.peer(&alice).is_none());
    assert_eq!(link.closes(), 1);
    assert_eq!(h.sink.removed(), vec![alice]);
}

#[tokio::test]
async fn test_remote_candidates_reach_the_link() {
    init_tracing();
    let h = engine_harness("bob");
    h.engine
        .handle_envelope(open_envelope("bob", &["alice"], true))
        .await;
    for _ in 0..3 {
        h.engine
            .handle_envelope(direct("alice", "bob", Payload::Ice { ice: candidate() }))
            .await;
    }
    let link = h.links.wait_link("alice").await;
    assert_eq!(link.candidates(), 3);
    assert_eq!(h.links.created(), 1);
}

#[tokio::test]
async fn test_close_removes_peer() {
    init_tracing();
    let h = engine_harness("alice");
    let bob = PeerId::from("bob");
    h.engine
        .handle_envelope(open_envelope("alice", &["bob", "carol"], false))
        .await;
    let link = h.links.wait_link("bob").await;

    h.engine
        .handle_envelope(direct("bob", "alice", Payload::Close))
        .await;
    assert!(h.engine.peer(&bob).is_none());
    assert_eq!(h.engine.peers().len(), 1);
    assert!(wait_until(|| link.closes() == 1).await);

    // a second close for the same peer is a no-op
    h.engine
        .handle_envelope(direct("bob", "alice", Payload::Close))
        .await;
    assert_eq!(link.closes(), 1);
    assert_eq!(h.sink.removed(), vec![bob]);
}

#[tokio::test]
async fn test_cancelled_engine_ignores_signals() {
    init_tracing();
    let h = engine_harness("alice");
    h.cancel.cancel();

    h.engine
        .handle_envelope(open_envelope("alice", &["bob"], false))
        .await;
    assert!(h.engine.peers().is_empty());
    assert_eq!(h.links.created(), 0);
}
