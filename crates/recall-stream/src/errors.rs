/// Caller-visible message for any transport-level failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to retrieve a response.";

/// Errors raised by a `Transport` while opening or reading the response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (connect failure, DNS, TLS, etc.).
    #[error("request failed: {message}")]
    Request { message: String },
    /// The upstream answered with a non-success status.
    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// Reading the body stream failed mid-way.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    /// Creates a request-level error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a body read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Request { message } | Self::Status { message, .. } | Self::Read { message } => {
                message
            }
        }
    }
}

/// Why a raw event payload was dropped instead of classified.
///
/// Dropped records are logged and skipped; they never fail a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    /// Payload is not valid JSON or is missing a required field.
    #[error("malformed record: {0}")]
    Malformed(String),
    /// Payload carries a `type` this client does not know.
    #[error("unknown record type: {0}")]
    UnknownType(String),
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty query).
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport failure surfaced outside a running session.
    #[error(transparent)]
    Transport(TransportError),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        ClientError::Transport(value)
    }
}
