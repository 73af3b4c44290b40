mod capture;
mod device;
mod jitter;
mod mixer;
mod processing;
mod resample;

#[cfg(feature = "webrtc-apm")]
mod apm;

pub use capture::*;
pub use device::*;
pub use jitter::*;
pub use mixer::*;
pub use processing::*;
pub use resample::*;

#[cfg(feature = "webrtc-apm")]
pub use apm::*;

use std::sync::Arc;

/// Processing stages used when the caller does not inject its own.
pub fn default_processing() -> Arc<dyn ProcessingFactory> {
    #[cfg(feature = "webrtc-apm")]
    {
        Arc::new(ApmProcessing)
    }
    #[cfg(not(feature = "webrtc-apm"))]
    {
        Arc::new(BuiltinProcessing)
    }
}
