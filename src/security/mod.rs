//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → guard.rs (read? pass through)
//!     → rate_limit.rs (per-IP write window)
//!     → catalog.rs (record cap on catalog inserts)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Rate check strictly precedes the catalog check
//! - Limiter state sits behind a trait so tests inject a clock and store
//! - Catalog cap is best-effort: read-then-insert is not atomic

pub mod catalog;
pub mod guard;
pub mod rate_limit;

pub use catalog::CatalogCap;
pub use guard::{write_guard_middleware, GuardDecision, WriteGuard};
pub use rate_limit::{Clock, ManualClock, MemoryRateStore, RateStore, SystemClock, WindowPolicy, WriteLimiter};
