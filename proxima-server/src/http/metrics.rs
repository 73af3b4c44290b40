use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Relay counters exposed on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub connections: IntGauge,
    pub rooms: IntGauge,
    pub messages: IntCounterVec,
    pub join_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let connections = IntGauge::new("proxima_connections", "Peers currently joined")?;
        let rooms = IntGauge::new("proxima_rooms", "Rooms with at least one member")?;
        let messages = IntCounterVec::new(
            Opts::new("proxima_messages_total", "Relay envelopes received by action"),
            &["action"],
        )?;
        let join_failures = IntCounterVec::new(
            Opts::new("proxima_join_failures_total", "Rejected joins by reason"),
            &["reason"],
        )?;

        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(rooms.clone()))?;
        registry.register(Box::new(messages.clone()))?;
        registry.register(Box::new(join_failures.clone()))?;

        Ok(Self {
            registry,
            connections,
            rooms,
            messages,
            join_failures,
        })
    }

    pub fn record_message(&self, action: &str) {
        self.messages.with_label_values(&[action]).inc();
    }

    pub fn record_join_failure(&self, reason: &str) {
        self.join_failures.with_label_values(&[reason]).inc();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> prometheus::Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
