//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for ModelGate.
//!
//! All magic numbers used by the registry and the dispatcher live here.

/// Path appended to the configured base URL for every completion call.
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Default number of in-flight calls allowed per model key.
///
/// Used when neither `default_concurrency` nor a per-key override is set.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on a single HTTP round trip, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 240;

/// Upper bound on waiting for a free permit, in seconds.
///
/// A value of `0` in configuration disables the bound.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 300;

/// Response format type sent when the caller does not pick one.
pub const DEFAULT_RESPONSE_FORMAT: &str = "text";

/// Default `max_tokens` for completion calls.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Longest upstream body (in characters) kept in an error message.
pub const MAX_ERROR_BODY_CHARS: usize = 512;

// ============================================================================
// Table analysis prompt
// ============================================================================

/// Number of sample rows included in a table analysis prompt.
pub const ANALYSIS_SAMPLE_ROWS: usize = 5;

/// System prompt used for table analysis calls.
pub const ANALYST_SYSTEM_PROMPT: &str = "You are a professional data analyst.";

// ============================================================================
// Metrics
// ============================================================================

/// Histogram buckets (seconds) for upstream request latency.
pub const REQUEST_LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 240.0];

/// Histogram buckets (seconds) for permit wait time.
pub const PERMIT_WAIT_BUCKETS: &[f64] = &[0.0001, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0];
