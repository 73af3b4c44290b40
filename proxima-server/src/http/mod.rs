mod introspection;
mod metrics;

pub use introspection::*;
pub use metrics::*;
