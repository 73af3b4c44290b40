use proxima_client::negotiation::TransportEvent;
use proxima_client::{ClientError, SessionEvent};
use proxima_core::{ClientFrame, Payload, PeerId, SdpKind, VOICE_SAMPLES_PER_FRAME};

use super::session_harness;
use crate::integration::init_tracing;
use crate::utils::{next_matching, recv_within, wait_until};

#[tokio::test]
async fn test_join_negotiates_and_leave_releases_everything() {
    init_tracing();
    let mut h = session_harness("alice");
    let mut relay = h.join_with(&["bob"], false).await;
    assert!(h.session.is_joined());
    assert_eq!(h.audio.output_opens(), 1);

    let peers = h.session.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, PeerId::from("bob"));

    // the offer goes out through the relay
    let Some(ClientFrame::Message(offer)) = recv_within(&mut relay.from_client).await else {
        panic!("no offer sent");
    };
    assert!(matches!(offer.payload, Payload::Sdp { ref sdp } if sdp.kind == SdpKind::Offer));

    assert!(matches!(
        h.session.join("room", "", Vec::new()).await,
        Err(ClientError::AlreadyConnected)
    ));

    let link = h.links.wait_link("bob").await;
    h.session.leave().await;
    assert!(!h.session.is_joined());
    assert!(h.session.peers().is_empty());
    assert_eq!(link.closes(), 1);
    assert_eq!(h.audio.output_closes(), 1);
    assert!(
        next_matching(&mut h.events, |e| matches!(e, SessionEvent::Disconnected(None)))
            .await
            .is_some()
    );

    // a second leave has nothing left to do
    h.session.leave().await;
    assert_eq!(h.audio.output_closes(), 1);
}

#[tokio::test]
async fn test_captured_audio_reaches_open_channels() {
    init_tracing();
    let mut h = session_harness("alice");
    let _relay = h.join_with(&["bob"], false).await;
    let bob = PeerId::from("bob");

    let link = h.links.wait_link("bob").await;
    link.events
        .send(TransportEvent::DataChannelReady(bob.clone()))
        .await
        .unwrap();
    assert!(
        wait_until(|| h
            .session
            .peers()
            .first()
            .is_some_and(|p| p.channel_open))
        .await
    );

    h.session.set_transmit(true).unwrap();
    assert!(h.audio.feed(&vec![0.2; VOICE_SAMPLES_PER_FRAME * 2]));
    assert!(wait_until(|| link.sent() == 2).await);

    // released transmit stops the microphone
    h.session.set_transmit(false).unwrap();
    assert!(!h.audio.feed(&[0.2; 16]));
    assert_eq!(h.audio.input_closes(), 1);

    h.session.leave().await;
}

#[tokio::test]
async fn test_relay_close_removes_peer_from_mixer() {
    init_tracing();
    let mut h = session_harness("alice");
    let relay = h.join_with(&["bob"], true).await;
    let bob = PeerId::from("bob");

    let link = h.links.wait_link("bob").await;
    let frame = proxima_core::encode_frame(&proxima_core::AudioFrame::from_samples(&[100; 960]))
        .unwrap();
    link.events
        .send(TransportEvent::Message(bob.clone(), frame))
        .await
        .unwrap();
    assert!(wait_until(|| h.session.mixer().has_channel(&bob)).await);

    relay
        .to_client
        .send(proxima_core::ServerFrame::Message(
            proxima_core::SignalEnvelope::direct(
                bob.clone(),
                PeerId::from("alice"),
                Payload::Close,
            ),
        ))
        .unwrap();
    assert!(wait_until(|| !h.session.mixer().has_channel(&bob)).await);
    assert!(h.session.peers().is_empty());

    h.session.leave().await;
}
