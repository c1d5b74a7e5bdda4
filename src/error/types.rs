// src/error/types.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Malformed realtime event: {0}")]
    InvalidEvent(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl AppError {
    /// Transport failures and server-side errors are worth retrying;
    /// client errors (4xx) and decode failures are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Transport(_) | AppError::Timeout | AppError::Io(_) => true,
            AppError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::Timeout;
        }
        if let Some(status) = err.status() {
            return AppError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        AppError::Transport(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_retryable() {
        assert!(AppError::Transport("connection reset".to_string()).is_retryable());
        assert!(AppError::Timeout.is_retryable());
    }

    #[test]
    fn test_client_errors_are_terminal() {
        let not_found = AppError::Status {
            status: 404,
            message: "not found".to_string(),
        };
        assert!(!not_found.is_retryable());

        let unavailable = AppError::Status {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(unavailable.is_retryable());
    }
}
