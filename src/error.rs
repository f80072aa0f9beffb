use thiserror::Error;

/// Type alias for Result with UnsubError
pub type Result<T> = std::result::Result<T, UnsubError>;

/// Error types for the unsubscribe pipeline
///
/// The taxonomy separates failures by how the pipeline reacts to them:
/// - `Parse` is recovered locally (the candidate is dropped, the message
///   is still processed)
/// - `Network` is transient and eligible for a single retry
/// - `Rejection` is a definitive 4xx answer and is never retried
/// - `Collaborator` is a mailbox API failure; fatal during fetching,
///   isolated per sender group during execute/dispose
#[derive(Error, Debug)]
pub enum UnsubError {
    /// Malformed unsubscribe target or header token
    #[error("malformed unsubscribe target: {0}")]
    Parse(String),

    /// Transient network failure (timeout, connection reset, 5xx)
    #[error("network error: {0}")]
    Network(String),

    /// Definitive rejection from the remote endpoint (4xx)
    #[error("unsubscribe rejected with HTTP {status}")]
    Rejection { status: u16 },

    /// Mailbox API failure (search, fetch, mutate or send)
    #[error("mailbox error: {message}")]
    Collaborator { message: String, transient: bool },

    /// Authentication failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Run cancelled by the user
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UnsubError {
    /// Check if the error is transient and eligible for a retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UnsubError::Network(_) | UnsubError::Collaborator { transient: true, .. }
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Build a non-transient collaborator error
    pub fn collaborator(message: impl Into<String>) -> Self {
        UnsubError::Collaborator {
            message: message.into(),
            transient: false,
        }
    }
}

impl From<google_gmail1::Error> for UnsubError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with a non-success status code
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                UnsubError::Collaborator {
                    message,
                    // 429 and 5xx resolve on their own; 4xx does not
                    transient: status_code == 429 || (500..=599).contains(&status_code),
                }
            }
            // Request not understood by the server
            google_gmail1::Error::BadRequest(ref err) => UnsubError::Collaborator {
                message: format!("bad request: {}", err),
                transient: false,
            },
            // Network/connection errors - transient
            google_gmail1::Error::HttpError(ref err) => UnsubError::Collaborator {
                message: format!("connection error: {}", err),
                transient: true,
            },
            // IO errors - transient
            google_gmail1::Error::Io(err) => UnsubError::Collaborator {
                message: err.to_string(),
                transient: true,
            },
            // All other errors
            _ => UnsubError::Collaborator {
                message: error.to_string(),
                transient: false,
            },
        }
    }
}

impl From<reqwest::Error> for UnsubError {
    fn from(error: reqwest::Error) -> Self {
        // Status-bearing responses are classified by the executor before
        // they reach this conversion; everything else is transport failure.
        UnsubError::Network(error.to_string())
    }
}
