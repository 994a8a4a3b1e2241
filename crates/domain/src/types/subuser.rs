//! Subuser entity, write payloads, and tracked state.
//!
//! A subuser is identified by its username, which the caller chooses at
//! creation time. Reads look it up by that username.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Subuser as decoded from the remote API.
///
/// The create response carries the system-assigned tokens and credit
/// allocation; the list endpoint used for reads carries `id` and
/// `disabled`. Every field is defaulted so both shapes decode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Subuser {
    /// Remote numeric id (`user_id` in create responses).
    #[serde(default, alias = "user_id")]
    pub id: u64,
    /// Unique login name.
    #[serde(default)]
    pub username: String,
    /// Contact address.
    #[serde(default)]
    pub email: String,
    /// Whether sending is disabled.
    #[serde(default)]
    pub disabled: bool,
    /// Assigned sending IPs, when the response lists them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
    /// Returned by create only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signup_session_token: Option<String>,
    /// Returned by create only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_token: Option<String>,
    /// Returned by create only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_allocation: Option<CreditAllocation>,
}

/// Credit allocation assigned to a subuser on creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreditAllocation {
    /// Allocation kind, e.g. `unlimited`.
    #[serde(rename = "type", default)]
    pub allocation_type: String,
}

/// Declared fields for a subuser, as supplied by the host.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubuserSpec {
    /// Unique login name; also the identifier.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Initial password. Cannot be read back.
    pub password: String,
    /// Sending IPs; at least one.
    pub ips: BTreeSet<String>,
    /// Disable sending after creation.
    #[serde(default)]
    pub disabled: bool,
}

impl fmt::Debug for SubuserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubuserSpec")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("ips", &self.ips)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Body of `POST /subusers`.
#[derive(Serialize)]
pub struct CreateSubuserRequest<'a> {
    /// Login name.
    pub username: &'a str,
    /// Contact address.
    pub email: &'a str,
    /// Initial password.
    pub password: &'a str,
    /// Sending IPs.
    pub ips: Vec<&'a str>,
}

/// Partial update of a subuser. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubuserUpdate {
    /// New disabled flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl SubuserUpdate {
    /// Update that only sets the disabled flag.
    pub fn disabled(value: bool) -> Self {
        Self { disabled: Some(value) }
    }

    /// True when no field is supplied.
    pub fn is_empty(&self) -> bool {
        self.disabled.is_none()
    }
}

/// Everything the host tracks about one subuser between runs.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubuserState {
    /// Identifier.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Carried from the last write; empty after import.
    #[serde(default)]
    pub password: String,
    /// Sending IPs.
    #[serde(default)]
    pub ips: BTreeSet<String>,
    /// Whether sending is disabled.
    #[serde(default)]
    pub disabled: bool,
    /// Remote numeric id.
    #[serde(default)]
    pub user_id: u64,
    /// Carried from create.
    #[serde(default)]
    pub signup_session_token: Option<String>,
    /// Carried from create.
    #[serde(default)]
    pub authorization_token: Option<String>,
    /// Carried from create.
    #[serde(default)]
    pub credit_allocation_type: Option<String>,
}

impl SubuserState {
    /// Build state from a decoded entity.
    ///
    /// Fields the remote does not echo back (password, and ips when the
    /// response omits them) are taken from `carried` when present.
    pub fn from_remote(remote: &Subuser, carried: Option<&SubuserState>) -> Self {
        let ips = if remote.ips.is_empty() {
            carried.map(|state| state.ips.clone()).unwrap_or_default()
        } else {
            remote.ips.iter().cloned().collect()
        };

        Self {
            username: remote.username.clone(),
            email: remote.email.clone(),
            password: carried.map(|state| state.password.clone()).unwrap_or_default(),
            ips,
            disabled: remote.disabled,
            user_id: remote.id,
            signup_session_token: remote
                .signup_session_token
                .clone()
                .or_else(|| carried.and_then(|state| state.signup_session_token.clone())),
            authorization_token: remote
                .authorization_token
                .clone()
                .or_else(|| carried.and_then(|state| state.authorization_token.clone())),
            credit_allocation_type: remote
                .credit_allocation
                .as_ref()
                .map(|allocation| allocation.allocation_type.clone())
                .or_else(|| carried.and_then(|state| state.credit_allocation_type.clone())),
        }
    }

    /// Declared-only view used to carry fields across a create.
    pub fn declared(spec: &SubuserSpec) -> Self {
        Self {
            username: spec.username.clone(),
            email: spec.email.clone(),
            password: spec.password.clone(),
            ips: spec.ips.clone(),
            disabled: spec.disabled,
            ..Self::default()
        }
    }
}

impl fmt::Debug for SubuserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubuserState")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("ips", &self.ips)
            .field("disabled", &self.disabled)
            .field("user_id", &self.user_id)
            .field(
                "signup_session_token",
                &self.signup_session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("authorization_token", &self.authorization_token.as_ref().map(|_| "<redacted>"))
            .field("credit_allocation_type", &self.credit_allocation_type)
            .finish()
    }
}
