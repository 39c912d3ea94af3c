//! Rate limiter adapters.
//!
//! Implementations of the `CapabilityRateLimiter` port.
//!
//! ## Available Adapters
//!
//! - `SlidingWindowRateLimiter` - In-memory, per-key sliding window with burst control
//!
//! ## Usage
//!
//! ```ignore
//! use conductor::adapters::rate_limiter::SlidingWindowRateLimiter;
//!
//! let limiter = Arc::new(SlidingWindowRateLimiter::new(Duration::from_secs(1)));
//! let registry = CapabilityRegistry::new(limiter);
//! ```

mod in_memory;

pub use in_memory::{SlidingWindowRateLimiter, DEFAULT_BURST_INTERVAL};
