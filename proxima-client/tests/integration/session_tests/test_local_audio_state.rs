use proxima_core::{AudioState, ClientFrame, Payload, PeerId, Target};

use super::session_harness;
use crate::integration::init_tracing;
use crate::utils::{recv_within, wait_until};

async fn next_update(
    relay: &mut crate::utils::RelayHandle,
) -> Option<(Target, AudioState)> {
    while let Some(frame) = recv_within(&mut relay.from_client).await {
        if let ClientFrame::Message(envelope) = frame {
            if let Payload::Update { connections } = envelope.payload {
                return Some((envelope.target, connections[0].audio_state));
            }
        }
    }
    None
}

#[tokio::test]
async fn test_mute_is_published_and_silences_playback() {
    init_tracing();
    let mut h = session_harness("alice");
    let mut relay = h.join_with(&["bob"], true).await;
    let bob = PeerId::from("bob");
    h.positions.set("bob", 1.0);
    assert!(wait_until(|| h.session.mixer().effective_gain(&bob) == 1.0).await);

    h.session.set_muted(true).unwrap();
    assert!(h.session.audio_state().mic_muted);
    let (target, state) = next_update(&mut relay).await.expect("no update sent");
    assert_eq!(target, Target::All);
    assert!(state.mic_muted);
    assert!(!state.deafened);
    assert_eq!(h.session.mixer().effective_gain(&bob), 0.0);

    h.session.set_deafened(true).unwrap();
    let (_, state) = next_update(&mut relay).await.expect("no update sent");
    assert!(state.mic_muted && state.deafened);

    h.session.set_muted(false).unwrap();
    h.session.set_deafened(false).unwrap();
    assert_eq!(h.session.mixer().effective_gain(&bob), 1.0);

    h.session.leave().await;
}

#[tokio::test]
async fn test_loopback_monitors_without_transmitting() {
    init_tracing();
    let mut h = session_harness("alice");
    let _relay = h.join_with(&["bob"], true).await;
    let bob = PeerId::from("bob");

    h.session.set_loopback(true).unwrap();
    assert_eq!(h.audio.input_opens(), 1);
    assert_eq!(h.session.mixer().effective_gain(&bob), 0.0);

    // muting does not close a loopback capture
    h.session.set_muted(true).unwrap();
    assert_eq!(h.audio.input_closes(), 0);

    h.session.leave().await;
    assert_eq!(h.audio.input_closes(), 1);
    h.session.set_muted(false).unwrap();
    assert_eq!(h.session.mixer().effective_gain(&bob), 1.0);
}

#[tokio::test]
async fn test_speaking_follows_the_microphone() {
    init_tracing();
    let h = session_harness("alice");
    let alice = PeerId::from("alice");
    assert!(!h.session.is_speaking(&alice));

    h.session.set_transmit(true).unwrap();
    let loud: Vec<f32> = (0..960).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
    h.audio.feed(&loud);
    assert!(h.session.is_speaking(&alice));

    h.session.set_transmit(false).unwrap();
    assert!(!h.session.is_speaking(&alice));
}
