//! API key entity and write payloads.
//!
//! API keys are identified by the remote-assigned `api_key_id`. The secret
//! is only returned once, by create, so the tracked state keeps it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// API key as decoded from the remote API.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiKey {
    /// Remote identifier.
    #[serde(default)]
    pub api_key_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Secret; only present in the create response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("api_key_id", &self.api_key_id)
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Declared fields for an API key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiKeySpec {
    /// Display name.
    pub name: String,
    /// Requested scopes. Empty lets the remote pick its default.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Body of `POST /api_keys`.
#[derive(Debug, Serialize)]
pub struct CreateApiKeyRequest<'a> {
    /// Display name.
    pub name: &'a str,
    /// Requested scopes; omitted when empty.
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub scopes: &'a [String],
}

/// Body of `PUT /api_keys/<id>`. Only supplied, non-empty fields go on the
/// wire; the rest are left unchanged remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiKeyUpdate {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement scope list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl ApiKeyUpdate {
    /// Drop fields that would read as "clear" on the wire.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.filter(|name| !name.is_empty()),
            scopes: self.scopes.filter(|scopes| !scopes.is_empty()),
        }
    }

    /// True when nothing would be sent.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.scopes.is_none()
    }
}

/// Tracked state of an API key.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiKeyState {
    /// Identifier.
    pub api_key_id: String,
    /// Display name.
    pub name: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Secret carried from create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ApiKeyState {
    /// Build state from a decoded entity, keeping a previously seen secret
    /// when the remote no longer returns it.
    pub fn from_remote(remote: &ApiKey, carried_secret: Option<&str>) -> Self {
        Self {
            api_key_id: remote.api_key_id.clone(),
            name: remote.name.clone(),
            scopes: remote.scopes.clone(),
            api_key: remote.api_key.clone().or_else(|| carried_secret.map(str::to_string)),
        }
    }
}

impl fmt::Debug for ApiKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyState")
            .field("api_key_id", &self.api_key_id)
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_body_omits_empty_scopes() {
        let scopes: Vec<String> = Vec::new();
        let body =
            serde_json::to_value(CreateApiKeyRequest { name: "deploy", scopes: &scopes }).unwrap();
        assert_eq!(body, serde_json::json!({"name": "deploy"}));
    }

    #[test]
    fn normalized_update_drops_empty_fields() {
        let update = ApiKeyUpdate { name: Some(String::new()), scopes: Some(vec![]) }.normalized();
        assert!(update.is_empty());
        assert_eq!(serde_json::to_value(&update).unwrap(), serde_json::json!({}));

        let update = ApiKeyUpdate { name: Some("renamed".into()), scopes: None }.normalized();
        assert_eq!(serde_json::to_value(&update).unwrap(), serde_json::json!({"name": "renamed"}));
    }

    #[test]
    fn from_remote_keeps_secret_from_create() {
        let remote = ApiKey {
            api_key_id: "k1".into(),
            name: "deploy".into(),
            scopes: vec!["mail.send".into()],
            api_key: None,
        };
        let state = ApiKeyState::from_remote(&remote, Some("SG.secret"));
        assert_eq!(state.api_key.as_deref(), Some("SG.secret"));
        assert!(!format!("{state:?}").contains("SG.secret"));
    }
}
