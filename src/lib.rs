//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! ModelGate - Per-model concurrency gating for chat completion calls
//!
//! Sends OpenAI-style `/chat/completions` requests to an upstream inference
//! service while bounding the number of in-flight calls for each model key.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use modelgate::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`Dispatcher`] - Performs one gated outbound call per request
//! - [`ConcurrencyRegistry`] - Maps a model key to its permit pool
//! - [`PermitPool`] - Bounded counting semaphore for one key
//! - [`AppConfig`] / [`LlmConfig`] - YAML / TOML configuration
//! - [`GateError`] - Error types
//!
//! ## Extensions (feature-gated)
//!
//! - Logging subscriber setup (requires `telemetry` feature)
//! - Prometheus metrics (requires `monitoring` feature)
//! - Interactive chat binary (requires `cli` feature)
//!
//! # Examples
//!
//! ```rust,no_run
//! use modelgate::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GateError> {
//!     let config = AppConfig::load("config/dev.yml")?;
//!     let registry = Arc::new(ConcurrencyRegistry::from_config(&config.llm_config));
//!     let dispatcher = Dispatcher::from_config(&config.llm_config, registry)?;
//!
//!     let response = dispatcher
//!         .chat_completion(
//!             &config.llm_config.model,
//!             vec![ChatMessage::user("hello")],
//!             0.0,
//!             config.llm_config.max_token,
//!             None,
//!         )
//!         .await?;
//!     println!("{}", response.first_content().unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod prelude;

pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod log_redaction;
pub mod pool;
pub mod prompt;
pub mod registry;
#[cfg(any(feature = "telemetry", feature = "monitoring"))]
pub mod telemetry;
pub mod transport;
pub mod types;

// 重新导出常用类型
pub use config::{AppConfig, LlmConfig, LogConfig, LogFormat};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::GateError;
pub use pool::{Permit, PermitPool};
pub use prompt::{build_analysis_prompt, TableSample};
pub use registry::{ConcurrencyRegistry, InitSummary, PoolStats};
#[cfg(feature = "telemetry")]
pub use telemetry::init_logging;
#[cfg(feature = "monitoring")]
pub use telemetry::Metrics;
pub use transport::{CompletionTransport, HttpTransport, TransportResponse};
pub use types::{
    ApiErrorBody, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    Conversation, ResponseFormat, Role, Usage,
};
