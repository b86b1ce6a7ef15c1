//! Error types for the chatgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Identity service unreachable: {0}")]
    Network(String),

    #[error("Identity service returned an unreadable response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("tool with name '{0}' does not exist")]
    UnknownTool(String),

    #[error("invalid JSON in arguments: {arguments}")]
    MalformedArguments { tool_name: String, arguments: String },

    #[error("duplicate tool name: {0}")]
    DuplicateName(String),
}

#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("capability server {server} unreachable: {reason}")]
    Unreachable { server: String, reason: String },

    #[error("capability server {server} answered with status {status}")]
    BadStatus { server: String, status: u16 },

    #[error("capability server {server} sent an invalid payload: {reason}")]
    InvalidPayload { server: String, reason: String },

    #[error("capability server task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    #[error("'{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("'{field}' must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        value: i64,
        min: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_error_names_server() {
        let err = CapabilityError::BadStatus {
            server: "http://caps.local/v1".into(),
            status: 503,
        };
        assert!(err.to_string().contains("caps.local"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn tool_error_text_is_model_facing() {
        let err = ToolError::UnknownTool("weather".into());
        assert_eq!(err.to_string(), "tool with name 'weather' does not exist");

        let err = ToolError::MalformedArguments {
            tool_name: "ping_pong".into(),
            arguments: "{oops".into(),
        };
        assert_eq!(err.to_string(), "invalid JSON in arguments: {oops");
    }

    #[test]
    fn request_error_displays_range() {
        let err = RequestError::OutOfRange {
            field: "temperature",
            value: 3.0,
            min: 0.0,
            max: 2.0,
        };
        assert!(err.to_string().contains("temperature"));
        assert!(err.to_string().contains('3'));
    }
}
