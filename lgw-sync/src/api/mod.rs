//! HTTP API for the synchronization engine
//!
//! The operator surface: trigger and cancel runs, browse the run ledger and
//! its validation reports, inspect schedules, and follow engine events over
//! SSE.

pub mod health;
pub mod runs;
pub mod schedules;
pub mod sse;
pub mod sync;

pub use health::health_routes;
pub use runs::run_routes;
pub use schedules::schedule_routes;
pub use sse::event_stream;
pub use sync::sync_routes;
