//! Distance attenuation curves and the distance-independent suppression gate.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Falloff curve family. Ordered from flattest to steepest default response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum FalloffKind {
    None,
    #[default]
    InverseDistance,
    ExponentialDistance,
    LinearDistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FalloffParams {
    pub min_distance: f32,
    pub max_distance: f32,
    pub falloff_factor: f32,
    pub kind: FalloffKind,
}

impl Default for FalloffParams {
    fn default() -> Self {
        Self {
            min_distance: 1.0,
            max_distance: 20.0,
            falloff_factor: 1.0,
            kind: FalloffKind::default(),
        }
    }
}

impl FalloffParams {
    pub fn gain(&self, distance: f32) -> f32 {
        gain(
            distance,
            self.min_distance,
            self.max_distance,
            self.falloff_factor,
            self.kind,
        )
    }
}

/// Gain in `[0, 1]` for a listener `distance` away from a speaker.
///
/// Any arithmetic fault (zero-width range, negative base, NaN input) yields `1.0`:
/// a misconfigured curve stays audible instead of silently muting everyone.
pub fn gain(
    distance: f32,
    min_distance: f32,
    max_distance: f32,
    falloff_factor: f32,
    kind: FalloffKind,
) -> f32 {
    if kind == FalloffKind::None {
        return 1.0;
    }

    let min = f64::from(min_distance);
    let max = f64::from(max_distance);
    let factor = f64::from(falloff_factor);

    // f64::clamp panics on an inverted or NaN range
    if !(min <= max) {
        return 1.0;
    }
    let d = f64::from(distance).clamp(min, max);

    let raw = match kind {
        FalloffKind::None => 1.0,
        FalloffKind::InverseDistance => {
            let scale = smoothing(d, min, max);
            min / (min + factor * (d - min)) * scale
        }
        FalloffKind::ExponentialDistance => {
            let scale = smoothing(d, min, max);
            (d / min).powf(-factor) * scale
        }
        FalloffKind::LinearDistance => 1.0 - factor * (d - min) / (max - min),
    };

    if !raw.is_finite() {
        return 1.0;
    }
    raw.clamp(0.0, 1.0) as f32
}

fn smoothing(d: f64, min: f64, max: f64) -> f64 {
    ((max - d) / (max - min)).powf(d / max)
}

/// Per-peer input to [`SuppressionGate`], supplied by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppressionState {
    pub suppressed: bool,
    /// When `suppressed` last flipped.
    pub changed_at: Option<Instant>,
}

/// Forces gain to zero while a peer is in a suppressed state (for example dead)
/// and for `grace` after it leaves that state.
#[derive(Debug, Clone, Copy)]
pub struct SuppressionGate {
    pub grace: Duration,
}

impl SuppressionGate {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn apply(&self, gain: f32, state: SuppressionState, now: Instant) -> f32 {
        if state.suppressed {
            return 0.0;
        }
        match state.changed_at {
            Some(at) if now.saturating_duration_since(at) < self.grace => 0.0,
            _ => gain,
        }
    }
}
