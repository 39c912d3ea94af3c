//! Provider adapters.
//!
//! Implementations of the `ProviderAdapter` port.
//!
//! ## Available Adapters
//!
//! - `MockProviderAdapter` - Scripted responses, injected errors and delays

mod mock_provider;

pub use mock_provider::{MockProviderAdapter, MockResponse};
