//! Completion provider implementations for Swarmline.
//!
//! All providers implement the `swarmline_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryingProvider};
pub use router::{ProviderRouter, build_from_config};
