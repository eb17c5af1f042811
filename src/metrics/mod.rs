//! Device metrics: data structures, status normalization and point emission.
//!
//! Raw payloads from Shelly Cloud are turned into a [`CanonicalMetric`] by the
//! normalizer, and every poll outcome becomes a [`MetricPoint`] in the emitter.

pub mod data;
pub mod emitter;
pub mod normalizer;

// Re-export commonly used items
pub use data::{CanonicalMetric, FieldValue, MetricPoint, PollOutcome, RawStatus};
pub use emitter::{build_point, emit};
pub use normalizer::{normalize, normalize_detailed, CapabilityShape, Normalized};
