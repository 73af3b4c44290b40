use proxima_client::ClientError;
use proxima_client::signaling::{ConnectionState, DefaultPlatformProbe, SignalingClient};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::utils::{FakeConnector, RejectingProbe, client_config};

#[tokio::test]
async fn test_probe_failure_skips_transport() {
    let (connector, _sessions) = FakeConnector::new();
    let (tx, mut events) = mpsc::unbounded_channel();
    let client = SignalingClient::new(
        client_config("alice"),
        connector.clone(),
        Arc::new(RejectingProbe),
        tx,
    );

    let err = client.connect("room", "", Vec::new()).unwrap_err();
    assert!(matches!(err, ClientError::PlatformUnsupported(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_non_websocket_url_is_rejected() {
    let (connector, _sessions) = FakeConnector::new();
    let (tx, _events) = mpsc::unbounded_channel();
    let mut config = client_config("alice");
    config.relay_url = "http://relay.test/ws".to_owned();
    let client = SignalingClient::new(config, connector.clone(), Arc::new(DefaultPlatformProbe), tx);

    assert!(matches!(
        client.connect("room", "", Vec::new()),
        Err(ClientError::PlatformUnsupported(_))
    ));
    assert_eq!(connector.attempts(), 0);
}
