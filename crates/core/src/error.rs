//! Error types for the Stride domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Stride operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model transport errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Rule errors ---
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    // --- Collaborator errors (delta, retrieval) ---
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    // --- Command bus errors ---
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    // --- Snapshot consistency ---
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Caller cancellation ---
    #[error("Operation cancelled")]
    Cancelled,

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model returned empty content")]
    EmptyContent,

    #[error("Model response did not match the expected shape: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Short machine-readable classification, persisted on call records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiError { .. } => "api_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::AuthenticationFailed(_) => "authentication",
            Self::NotConfigured(_) => "not_configured",
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::EmptyContent => "empty_content",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("rule {rule_id} failed: {reason}")]
    Evaluation { rule_id: String, reason: String },

    #[error("rule {rule_id} is missing data: {detail}")]
    MissingData { rule_id: String, detail: String },
}

#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("{service} failed: {reason}")]
    Failed { service: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum CommandError {
    #[error("Unsupported command: {0}")]
    Unsupported(String),

    #[error("Command rejected: {reason}")]
    Rejected { reason: String },

    #[error("Command transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    #[error("{kind} '{id}' references missing {missing_kind} '{missing_id}'")]
    DanglingReference {
        kind: String,
        id: String,
        missing_kind: String,
        missing_id: String,
    },

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: String, id: String },
}
