use crate::ClientError;

/// Runs before every transport attempt. A failure is final for that `connect`.
pub trait PlatformProbe: Send + Sync {
    fn check(&self, relay_url: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPlatformProbe;

impl PlatformProbe for DefaultPlatformProbe {
    fn check(&self, relay_url: &str) -> Result<(), ClientError> {
        let scheme = relay_url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("ws") | Some("wss")) {
            return Err(ClientError::PlatformUnsupported(format!(
                "relay url '{relay_url}' is not a ws:// or wss:// url"
            )));
        }
        if running_under_wine() {
            return Err(ClientError::PlatformUnsupported(
                "WebRTC data channels are not available under Wine".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(windows)]
fn running_under_wine() -> bool {
    std::env::vars_os().any(|(key, _)| key.to_string_lossy().starts_with("WINE"))
}

#[cfg(not(windows))]
fn running_under_wine() -> bool {
    false
}
