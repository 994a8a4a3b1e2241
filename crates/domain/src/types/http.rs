//! Types crossing the transport boundary.

use std::fmt;

/// HTTP verbs used by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Upper-case verb as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw response returned by a transport: status plus undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body as text, possibly empty.
    pub body: String,
}

impl RawResponse {
    /// Response with the given status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    /// Any status below 300 counts as success.
    pub fn is_success(&self) -> bool {
        self.status < 300
    }
}

/// Successful delete: either the entity was removed now or it was already
/// absent. Both satisfy an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// This call removed the entity.
    Deleted,
    /// The entity was already gone (404).
    AlreadyAbsent,
}

impl DeleteOutcome {
    /// Whether this call removed the entity.
    pub fn removed(self) -> bool {
        matches!(self, Self::Deleted)
    }
}
