//! Error types used throughout sgsync
//!
//! Two families live here:
//!
//! - [`SgsyncError`]: setup-time failures (configuration, client
//!   construction). Never produced by a remote operation.
//! - [`RequestError`]: the result model of every remote operation. A
//!   [`RequestResult`] is either the decoded value or a `RequestError`, and
//!   [`RequestError::status_code`] yields the HTTP-like status the failure is
//!   reported under.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status reported for failures that never reached (or never left) the
/// remote side: preconditions, transport failures, encode/decode errors.
pub const INTERNAL_STATUS: u16 = 500;

/// Status reported when the remote signals the caller is going too fast.
pub const RATE_LIMITED_STATUS: u16 = 429;

/// Status reported for a not-found condition surfaced as an error.
pub const NOT_FOUND_STATUS: u16 = 404;

/// Main setup-time error type for sgsync
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SgsyncError {
    /// Missing or invalid settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP client could not be set up.
    #[error("Network error: {0}")]
    Network(String),

    /// Anything else that stops startup.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for setup-time operations
pub type Result<T> = std::result::Result<T, SgsyncError>;

/// Result of a remote operation.
pub type RequestResult<T> = std::result::Result<T, RequestError>;

/// Remote call being performed, embedded in every [`RequestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `POST /subusers`
    CreateSubuser,
    /// `GET /subusers?username=`
    ReadSubuser,
    /// `PATCH /subusers/{username}`
    UpdateSubuser,
    /// `PUT /subusers/{username}/ips`
    UpdateSubuserIps,
    /// `DELETE /subusers/{username}`
    DeleteSubuser,
    /// `POST /api_keys`
    CreateApiKey,
    /// `GET /api_keys/{id}`
    ReadApiKey,
    /// `PUT /api_keys/{id}`
    UpdateApiKey,
    /// `DELETE /api_keys/{id}`
    DeleteApiKey,
}

impl Operation {
    /// Stable label for log fields.
    pub fn label(self) -> &'static str {
        match self {
            Self::CreateSubuser => "subuser.create",
            Self::ReadSubuser => "subuser.read",
            Self::UpdateSubuser => "subuser.update",
            Self::UpdateSubuserIps => "subuser.update_ips",
            Self::DeleteSubuser => "subuser.delete",
            Self::CreateApiKey => "api_key.create",
            Self::ReadApiKey => "api_key.read",
            Self::UpdateApiKey => "api_key.update",
            Self::DeleteApiKey => "api_key.delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CreateSubuser => "creating subuser",
            Self::ReadSubuser => "reading subuser",
            Self::UpdateSubuser => "updating subuser",
            Self::UpdateSubuserIps => "updating subuser ips",
            Self::DeleteSubuser => "deleting subuser",
            Self::CreateApiKey => "creating API key",
            Self::ReadApiKey => "reading API key",
            Self::UpdateApiKey => "updating API key",
            Self::DeleteApiKey => "deleting API key",
        };
        f.write_str(text)
    }
}

/// Named precondition failures, detected before any request is issued.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Empty subuser username.
    #[error("username is required")]
    UsernameRequired,

    /// Empty subuser email.
    #[error("email is required")]
    EmailRequired,

    /// Empty subuser password.
    #[error("password is required")]
    PasswordRequired,

    /// A subuser needs at least one sending IP.
    #[error("at least one ip is required")]
    IpsRequired,

    /// Empty API key name.
    #[error("name is required")]
    NameRequired,

    /// Empty API key identifier.
    #[error("api key id is required")]
    ApiKeyIdRequired,
}

/// Category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request did not complete within the client timeout
    Timeout,
    /// DNS resolution or TCP/TLS connection failed
    Connect,
    /// The request could not be built or sent
    Request,
    /// The response body could not be read
    Body,
}

/// The request itself could not complete; no HTTP status is available.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Client-side description.
    pub message: String,
}

impl TransportError {
    /// Transport failure of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// The client timeout elapsed.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// No connection could be made.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }
}

/// Failure of a single remote operation.
///
/// Every variant except [`RequestError::Precondition`] names the operation
/// and the identifier it targeted, so a surfaced error can be diagnosed
/// without re-running the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Local validation failed; nothing was sent.
    #[error(transparent)]
    Precondition(#[from] Precondition),

    /// The request did not complete.
    #[error("failed {operation} '{target}': {source}")]
    Transport {
        operation: Operation,
        target: String,
        #[source]
        source: TransportError,
    },

    /// The remote answered with a non-success status.
    #[error("failed {operation} '{target}', status: {status}, response: {body}")]
    Rejected { operation: Operation, target: String, status: u16, body: String },

    /// A success response whose body did not decode.
    #[error("failed parsing response of {operation} '{target}': {message}")]
    Decode { operation: Operation, target: String, message: String },

    /// The request body could not be serialized.
    #[error("failed encoding request for {operation} '{target}': {message}")]
    Encode { operation: Operation, target: String, message: String },

    /// The entity was not found when re-read after a write.
    #[error("failed {operation} '{target}': entity not found after write")]
    Missing { operation: Operation, target: String },
}

impl RequestError {
    /// Wrap a transport failure.
    pub fn transport(operation: Operation, target: &str, source: TransportError) -> Self {
        Self::Transport { operation, target: target.to_string(), source }
    }

    /// Remote rejection with its status and body.
    pub fn rejected(operation: Operation, target: &str, status: u16, body: &str) -> Self {
        Self::Rejected { operation, target: target.to_string(), status, body: body.to_string() }
    }

    /// Undecodable response.
    pub fn decode(operation: Operation, target: &str, message: impl fmt::Display) -> Self {
        Self::Decode { operation, target: target.to_string(), message: message.to_string() }
    }

    /// Unserializable request.
    pub fn encode(operation: Operation, target: &str, message: impl fmt::Display) -> Self {
        Self::Encode { operation, target: target.to_string(), message: message.to_string() }
    }

    /// Entity missing after a write.
    pub fn missing(operation: Operation, target: &str) -> Self {
        Self::Missing { operation, target: target.to_string() }
    }

    /// Status code this failure is reported under.
    ///
    /// Only remote rejections carry the remote's status; decode failures are
    /// internal even when the remote answered 2xx.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Rejected { status, .. } => *status,
            Self::Missing { .. } => NOT_FOUND_STATUS,
            Self::Precondition(_)
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::Encode { .. } => INTERNAL_STATUS,
        }
    }

    /// True only for a remote rejection with status 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status == RATE_LIMITED_STATUS)
    }

    /// The operation that failed, if the failure got past preconditions.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Precondition(_) => None,
            Self::Transport { operation, .. }
            | Self::Rejected { operation, .. }
            | Self::Decode { operation, .. }
            | Self::Encode { operation, .. }
            | Self::Missing { operation, .. } => Some(*operation),
        }
    }

    /// Stable label suitable for log fields.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Transport { .. } => "transport",
            Self::Rejected { .. } if self.is_rate_limited() => "rate_limited",
            Self::Rejected { .. } => "rejected",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::Missing { .. } => "missing",
        }
    }
}
