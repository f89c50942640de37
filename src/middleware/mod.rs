//! Server middleware
//!
//! Provides logging hooks and bandwidth limiting.

pub mod logging;
pub mod rate_limit;

pub use logging::LoggingHooks;
pub use rate_limit::{BandwidthLimiter, RateLimit};
