//! Time-limited TURN credentials in the shared-secret scheme understood by coturn.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use proxima_core::IceServerConfig;
use sha1::Sha1;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone)]
pub struct TurnIssuer {
    secret: String,
    urls: Vec<String>,
    label: String,
    ttl: Duration,
}

impl TurnIssuer {
    pub fn new(secret: String, urls: Vec<String>, label: String, ttl: Duration) -> Self {
        Self {
            secret,
            urls,
            label,
            ttl,
        }
    }

    pub fn issue(&self) -> Result<IceServerConfig, hmac::digest::InvalidLength> {
        self.issue_at(SystemTime::now())
    }

    /// Username is `"<expiry epoch seconds>:<label>"`, credential is
    /// `base64(HMAC-SHA1(secret, username))`.
    pub fn issue_at(&self, now: SystemTime) -> Result<IceServerConfig, hmac::digest::InvalidLength> {
        let expiry = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(self.ttl)
            .as_secs();
        let username = format!("{expiry}:{}", self.label);

        let mut mac = HmacSha1::new_from_slice(self.secret.as_bytes())?;
        mac.update(username.as_bytes());
        let credential = STANDARD.encode(mac.finalize().into_bytes());

        Ok(IceServerConfig {
            urls: self.urls.clone(),
            username: Some(username),
            credential: Some(credential),
        })
    }
}
