//! Hosted completion client used to draft candidate changes.
//!
//! One request per pipeline run: no retries, no streaming. Quota and billing
//! failures are classified separately so callers can surface an actionable
//! message instead of a generic failure.
mod responses;
mod types;

pub use responses::{extract_output_text, ResponsesClient, ResponsesConfig};
pub use types::{
    CompletionClient, CompletionError, CompletionRequest, CompletionResponse, CompletionUsage,
    INSUFFICIENT_QUOTA_ERROR_CODE,
};
