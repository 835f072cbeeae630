use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider error code reported when the account has no remaining credit.
pub const INSUFFICIENT_QUOTA_ERROR_CODE: &str = "insufficient_quota";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Single-shot completion request.
pub struct CompletionRequest {
    pub model: String,
    pub input: String,
    pub temperature: f32,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CompletionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Text payload reduced from the provider response envelope.
pub struct CompletionResponse {
    pub text: String,
    pub status: Option<String>,
    pub usage: CompletionUsage,
}

#[derive(Debug, Error)]
/// Failures surfaced by a `CompletionClient`.
pub enum CompletionError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion endpoint returned non-success status {status}: {body}")]
    HttpStatus {
        status: u16,
        body: String,
        error_code: Option<String>,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// True for rate/billing blocks that need a credential fix rather than a retry.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            Self::HttpStatus {
                status, error_code, ..
            } => *status == 429 || error_code.as_deref() == Some(INSUFFICIENT_QUOTA_ERROR_CODE),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

#[async_trait]
/// Trait contract for hosted completion backends.
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, CompletionError>;
}
