use crate::VolumeConfig;
use crate::audio::Mixer;
use crate::clock::Clock;
use crate::negotiation::NegotiationEngine;
use async_trait::async_trait;
use proxima_core::PeerId;
use proxima_core::volume::{FalloffParams, SuppressionGate, SuppressionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MIN_TICK: Duration = Duration::from_millis(10);

/// World-state queries owned by the host application.
#[async_trait]
pub trait PositionOracle: Send + Sync {
    /// Distance from the local listener to each of `peers`. Peers left out of
    /// the map have no known position and are not heard.
    async fn distances(&self, peers: &[PeerId]) -> HashMap<PeerId, f32>;

    fn suppression(&self, _peer: &PeerId) -> SuppressionState {
        SuppressionState::default()
    }
}

/// Periodically turns positions into per-peer mixer gains.
pub struct VolumeUpdater {
    tick: Duration,
    falloff: FalloffParams,
    gate: SuppressionGate,
    oracle: Arc<dyn PositionOracle>,
    engine: NegotiationEngine,
    mixer: Arc<Mixer>,
    clock: Arc<dyn Clock>,
}

impl VolumeUpdater {
    pub fn new(
        config: &VolumeConfig,
        oracle: Arc<dyn PositionOracle>,
        engine: NegotiationEngine,
        mixer: Arc<Mixer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tick: config.tick.max(MIN_TICK),
            falloff: config.falloff(),
            gate: SuppressionGate::new(config.suppression_grace),
            oracle,
            engine,
            mixer,
            clock,
        }
    }

    /// One pass over every known peer. Returns how many gains were set.
    pub async fn recompute(&self) -> usize {
        let peers: Vec<PeerId> = self.engine.peers().into_iter().map(|p| p.id).collect();
        if peers.is_empty() {
            return 0;
        }
        let distances = self.oracle.distances(&peers).await;
        let now = self.clock.now();

        for peer_id in &peers {
            let gain = distances
                .get(peer_id)
                .map_or(0.0, |d| self.falloff.gain(*d));
            let gain = self.gate.apply(gain, self.oracle.suppression(peer_id), now);
            self.mixer.set_gain(peer_id, gain);
        }
        peers.len()
    }

    /// Ticks until cancelled. A slow pass is abandoned at the next tick rather
    /// than overlapping with it.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if tokio::time::timeout(self.tick, self.recompute()).await.is_err() {
                debug!("Volume pass exceeded {:?}, skipped", self.tick);
            }
        }
        debug!("Volume updater stopped");
    }
}
