//! screencache Display - Consumer Display Decisions
//!
//! Turns cache state into one of four display outcomes, schedules the single
//! advisory re-check after a stale display, and memoizes decisions so
//! re-renders never re-trigger cache reads.

pub mod policy;
pub mod recheck;
pub mod session;
pub mod telemetry;

pub use policy::{decide, DisplayDecision, DisplayPolicy, Treatment};
pub use recheck::{RecheckFired, RecheckTimer};
pub use session::DisplaySession;
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
