use proxima_core::PeerId;

use super::session_harness;
use crate::integration::init_tracing;
use crate::utils::wait_until;

#[tokio::test]
async fn test_distance_drives_peer_gain() {
    init_tracing();
    let mut h = session_harness("alice");
    h.positions.set("bob", 50.0);
    let _relay = h.join_with(&["bob", "carol"], true).await;
    let (bob, carol) = (PeerId::from("bob"), PeerId::from("carol"));

    // beyond max distance is silent, an unknown position is silent too
    assert!(wait_until(|| h.session.mixer().effective_gain(&bob) == 0.0).await);
    assert!(wait_until(|| h.session.mixer().effective_gain(&carol) == 0.0).await);

    h.positions.set("bob", 1.0);
    assert!(wait_until(|| h.session.mixer().effective_gain(&bob) == 1.0).await);

    h.positions.set("carol", 10.0);
    assert!(
        wait_until(|| {
            let gain = h.session.mixer().effective_gain(&carol);
            gain > 0.0 && gain < 1.0
        })
        .await
    );

    h.session.leave().await;
}
