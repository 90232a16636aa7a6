//! Integration tests for Tricolor
//!
//! These tests drive the public API of `tricolor-core` and `tricolor-sim`
//! together: buffer admission through the black box, the running exchange
//! on a paused clock, lossy transit, concurrent arrivals and the canned
//! scenario catalog.

#[path = "style.rs"]
mod style;

#[path = "integration/buffer_accounting.rs"]
mod buffer_accounting;
#[path = "integration/concurrent_arrivals.rs"]
mod concurrent_arrivals;
#[path = "integration/exchange_lifecycle.rs"]
mod exchange_lifecycle;
#[path = "integration/scenario_catalog.rs"]
mod scenario_catalog;
#[path = "integration/transit_faults.rs"]
mod transit_faults;
