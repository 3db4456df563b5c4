//! Prelude module - Commonly used types for quick imports
//!
//! Re-exports the types most callers need, so a single
//! `use modelgate::prelude::*;` is enough to build and use a dispatcher.

// Core types - always available
pub use crate::config::{AppConfig, LlmConfig};
pub use crate::dispatcher::{Dispatcher, DispatcherConfig};
pub use crate::error::GateError;
pub use crate::registry::ConcurrencyRegistry;
pub use crate::types::{ChatCompletionResponse, ChatMessage, Conversation, ResponseFormat, Role};

// Feature-gated exports
#[cfg(feature = "telemetry")]
pub use crate::telemetry::init_logging;

#[cfg(feature = "monitoring")]
pub use crate::telemetry::Metrics;
