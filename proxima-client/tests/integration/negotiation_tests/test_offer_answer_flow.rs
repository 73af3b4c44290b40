use proxima_client::negotiation::{NegotiationState, PeerEvent};
use proxima_core::{
    AudioState, Payload, PeerId, PeerSummary, SdpKind, SessionDescription, SignalEnvelope,
};

use crate::integration::init_tracing;
use crate::utils::{direct, engine_harness, open_envelope, wait_until};

#[tokio::test]
async fn test_impolite_side_offers() {
    init_tracing();
    let h = engine_harness("alice");
    let bob = PeerId::from("bob");
    let mut events = h.engine.subscribe();

    h.engine
        .handle_envelope(open_envelope("alice", &["bob", "alice"], false))
        .await;

    // the record exists as soon as the open is handled
    let info = h.engine.peer(&bob).expect("bob not registered");
    assert!(!info.polite);
    assert_eq!(h.engine.peers().len(), 1);
    assert!(matches!(
        events.try_recv(),
        Ok(PeerEvent::Added { polite: false, .. })
    ));
    assert_eq!(h.sink.added(), vec![bob.clone()]);

    assert!(wait_until(|| !h.signaling.sent_to("bob").is_empty()).await);
    let sent = h.signaling.sent_to("bob");
    let Payload::Sdp { sdp } = &sent[0] else {
        panic!("expected an offer, got {:?}", sent[0]);
    };
    assert_eq!(sdp.kind, SdpKind::Offer);
    assert_eq!(
        h.engine.peer(&bob).unwrap().state,
        NegotiationState::AwaitingAnswer
    );

    // configured STUN plus the TURN server from the relay's open
    let link = h.links.wait_link("bob").await;
    assert_eq!(link.ice_servers.len(), 2);
    assert!(link.ice_servers[1].username.is_some());

    h.engine
        .handle_envelope(direct(
            "bob",
            "alice",
            Payload::Sdp {
                sdp: SessionDescription::answer("v=0"),
            },
        ))
        .await;
    assert_eq!(h.engine.peer(&bob).unwrap().state, NegotiationState::Stable);

    // a repeated open for a live peer changes nothing
    h.engine
        .handle_envelope(open_envelope("alice", &["bob"], false))
        .await;
    assert_eq!(h.links.created(), 1);
    assert_eq!(link.offers(), 1);
}

#[tokio::test]
async fn test_polite_side_only_answers() {
    init_tracing();
    let h = engine_harness("bob");
    let alice = PeerId::from("alice");

    h.engine
        .handle_envelope(open_envelope("bob", &["alice"], true))
        .await;
    let link = h.links.wait_link("alice").await;
    assert_eq!(link.offers(), 0);
    assert!(h.signaling.sent_to("alice").is_empty());
    assert_eq!(h.engine.peer(&alice).unwrap().state, NegotiationState::Idle);

    h.engine
        .handle_envelope(direct(
            "alice",
            "bob",
            Payload::Sdp {
                sdp: SessionDescription::offer("v=0"),
            },
        ))
        .await;

    let sent = h.signaling.sent_to("alice");
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], Payload::Sdp { sdp } if sdp.kind == SdpKind::Answer));
    assert_eq!(h.engine.peer(&alice).unwrap().state, NegotiationState::Stable);
    assert_eq!(h.links.created(), 1);
}

#[tokio::test]
async fn test_impolite_side_ignores_offers() {
    init_tracing();
    let h = engine_harness("alice");
    let bob = PeerId::from("bob");

    h.engine
        .handle_envelope(open_envelope("alice", &["bob"], false))
        .await;
    assert!(wait_until(|| h.signaling.sent_to("bob").len() == 1).await);

    h.engine
        .handle_envelope(direct(
            "bob",
            "alice",
            Payload::Sdp {
                sdp: SessionDescription::offer("v=0"),
            },
        ))
        .await;
    assert_eq!(h.signaling.sent_to("bob").len(), 1);
    assert_eq!(
        h.engine.peer(&bob).unwrap().state,
        NegotiationState::AwaitingAnswer
    );
}

#[tokio::test]
async fn test_update_tracks_audio_state() {
    init_tracing();
    let h = engine_harness("alice");
    let bob = PeerId::from("bob");
    h.engine
        .handle_envelope(open_envelope("alice", &["bob"], true))
        .await;
    let mut events = h.engine.subscribe();

    let muted = AudioState {
        mic_muted: true,
        deafened: false,
    };
    let mut summary = PeerSummary::new(bob.clone(), "player");
    summary.audio_state = muted;
    h.engine
        .handle_envelope(SignalEnvelope::broadcast(
            bob.clone(),
            Payload::Update {
                connections: vec![summary],
            },
        ))
        .await;

    assert_eq!(h.engine.peer(&bob).unwrap().audio_state, muted);
    assert_eq!(
        events.try_recv().ok(),
        Some(PeerEvent::Updated {
            peer_id: bob.clone(),
            audio_state: muted,
        })
    );

    // summaries about someone else are not the sender's to give
    let mut spoof = PeerSummary::new(PeerId::from("carol"), "player");
    spoof.audio_state.deafened = true;
    h.engine
        .handle_envelope(SignalEnvelope::broadcast(
            bob.clone(),
            Payload::Update {
                connections: vec![spoof],
            },
        ))
        .await;
    assert_eq!(h.engine.peer(&bob).unwrap().audio_state, muted);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_local_candidates_are_relayed() {
    init_tracing();
    let h = engine_harness("alice");
    h.engine
        .handle_envelope(open_envelope("alice", &["bob"], true))
        .await;
    let link = h.links.wait_link("bob").await;

    link.events
        .send(proxima_client::negotiation::TransportEvent::CandidateGenerated(
            PeerId::from("bob"),
            proxima_core::IceCandidate {
                candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".to_owned(),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
                username_fragment: None,
            },
        ))
        .await
        .unwrap();

    assert!(
        wait_until(|| h
            .signaling
            .sent_to("bob")
            .iter()
            .any(|p| matches!(p, Payload::Ice { .. })))
        .await
    );
}
