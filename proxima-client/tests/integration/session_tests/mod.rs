mod test_join_and_leave;
mod test_local_audio_state;
mod test_spatial_gain;

use proxima_client::audio::BuiltinProcessing;
use proxima_client::clock::SystemClock;
use proxima_client::signaling::DefaultPlatformProbe;
use proxima_client::{SessionDeps, SessionEvent, VoiceSession};
use proxima_core::{ClientFrame, PeerId, ServerFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::utils::{
    FakeAudioBackend, FakeConnector, FakeLinkFactory, FixedPositions, RelayHandle, client_config,
    next_matching, open_envelope, recv_within,
};

pub struct SessionHarness {
    pub session: VoiceSession,
    pub events: broadcast::Receiver<SessionEvent>,
    pub relays: mpsc::UnboundedReceiver<RelayHandle>,
    pub links: Arc<FakeLinkFactory>,
    pub audio: FakeAudioBackend,
    pub positions: Arc<FixedPositions>,
}

pub fn session_harness(local: &str) -> SessionHarness {
    let (connector, relays) = FakeConnector::new();
    let links = Arc::new(FakeLinkFactory::default());
    let audio = FakeAudioBackend::default();
    let positions = Arc::new(FixedPositions::default());

    let mut config = client_config(local);
    config.volume.tick = Duration::from_millis(20);
    let session = VoiceSession::new(
        config,
        SessionDeps {
            connector,
            probe: Arc::new(DefaultPlatformProbe),
            links: links.clone(),
            audio: Arc::new(audio.clone()),
            processing: Arc::new(BuiltinProcessing),
            positions: positions.clone(),
            clock: Arc::new(SystemClock),
        },
    );
    let events = session.subscribe();
    SessionHarness {
        session,
        events,
        relays,
        links,
        audio,
        positions,
    }
}

impl SessionHarness {
    /// Joins, answers the join with an `open` naming `peers`, and waits until
    /// the session reports itself ready.
    pub async fn join_with(&mut self, peers: &[&str], be_polite: bool) -> RelayHandle {
        self.session
            .join("room", "", Vec::new())
            .await
            .expect("join failed");
        let mut relay = recv_within(&mut self.relays)
            .await
            .expect("session never connected");
        assert!(matches!(
            recv_within(&mut relay.from_client).await,
            Some(ClientFrame::Join(_))
        ));

        let local = self.session.local_id().to_string();
        relay
            .to_client
            .send(ServerFrame::Message(open_envelope(&local, peers, be_polite)))
            .unwrap();
        assert!(
            next_matching(&mut self.events, |e| matches!(e, SessionEvent::Ready))
                .await
                .is_some()
        );
        for peer in peers {
            let id = PeerId::from(*peer);
            assert!(
                next_matching(&mut self.events, |e| matches!(
                    e,
                    SessionEvent::Peer(proxima_client::negotiation::PeerEvent::Added { peer_id, .. })
                        if *peer_id == id
                ))
                .await
                .is_some(),
                "{peer} never added"
            );
        }
        relay
    }
}
