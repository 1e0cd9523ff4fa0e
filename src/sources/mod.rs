//! Endpoint health tracking and source selection.
//!
//! Every endpoint is either available or not. Real request outcomes and
//! periodic liveness probes move it between the two, and selection prefers
//! the available endpoint with the best blend of success rate and latency.

mod health;
mod registry;

pub use health::EndpointHealth;
pub use registry::{HealthCheckSummary, Selection, SelectionPreference, SourceRegistry};
