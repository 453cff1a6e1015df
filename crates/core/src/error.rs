//! Error types for the Roleplayer domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Roleplayer operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Protocol errors ---
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised while rendering a conversation into a prompt.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("No role configuration for role '{0}'")]
    MissingRoleConfig(String),

    #[error("Unsupported tool message name '{0}', expected 'plugin' or 'interpreter'")]
    UnknownToolName(String),

    #[error("Message with role '{0}' carries an action call; only tool messages may")]
    UnexpectedAction(String),

    #[error("Unknown placeholder '{{{placeholder}}}' in template '{template}'")]
    UnknownPlaceholder {
        template: String,
        placeholder: String,
    },

    #[error("Unterminated placeholder in template '{0}'")]
    UnterminatedPlaceholder(String),

    #[error("Failed to render JSON: {0}")]
    Render(String),
}

/// Errors raised inside an action. The executor turns these into a failed
/// `ActionReturn`; they never escape the turn loop.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("Invalid action arguments: {0}")]
    InvalidArguments(String),

    #[error("Action execution failed: {action}: {reason}")]
    ExecutionFailed { action: String, reason: String },

    #[error("HTTP error in {action}: {reason}")]
    Http { action: String, reason: String },

    #[error("Action timed out: {action} after {timeout_secs}s")]
    Timeout { action: String, timeout_secs: u64 },
}
