//! API key resource operations.
//!
//! API keys are addressed by their remote-assigned id. A 404 on read is
//! "not found", not an error.

use sgsync_domain::{
    ApiKey, ApiKeySpec, ApiKeyUpdate, CreateApiKeyRequest, DeleteOutcome, HttpMethod, Operation,
    Precondition, RequestError, RequestResult, NOT_FOUND_STATUS,
};
use tracing::{debug, instrument};
use urlencoding::encode as encode_segment;

use crate::client::{decode, encode, reject_unless_success, SendgridClient};

fn require_id(id: &str) -> Result<(), Precondition> {
    if id.is_empty() {
        return Err(Precondition::ApiKeyIdRequired);
    }
    Ok(())
}

/// Local checks run before any request is issued.
pub fn validate_spec(spec: &ApiKeySpec) -> Result<(), Precondition> {
    if spec.name.is_empty() {
        return Err(Precondition::NameRequired);
    }
    Ok(())
}

fn api_key_path(id: &str) -> String {
    format!("/api_keys/{}", encode_segment(id))
}

impl SendgridClient {
    /// `POST /api_keys`. The returned entity carries the secret, which the
    /// remote never returns again.
    ///
    /// # Errors
    /// Precondition failures make no request.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_api_key(&self, spec: &ApiKeySpec) -> RequestResult<ApiKey> {
        validate_spec(spec)?;

        let operation = Operation::CreateApiKey;
        let target = spec.name.as_str();
        let body = encode(
            operation,
            target,
            &CreateApiKeyRequest { name: &spec.name, scopes: &spec.scopes },
        )?;

        let response =
            self.send_checked(operation, target, HttpMethod::Post, "/api_keys", Some(body)).await?;
        decode(operation, target, &response)
    }

    /// `GET /api_keys/<id>`. `Ok(None)` on 404.
    ///
    /// # Errors
    /// Any other status of 300 or above is a rejection.
    #[instrument(skip(self))]
    pub async fn read_api_key(&self, id: &str) -> RequestResult<Option<ApiKey>> {
        require_id(id)?;

        let operation = Operation::ReadApiKey;
        let response = self.send(operation, id, HttpMethod::Get, &api_key_path(id), None).await?;
        if response.status == NOT_FOUND_STATUS {
            debug!(api_key_id = id, "API key not found");
            return Ok(None);
        }

        let response = reject_unless_success(operation, id, response)?;
        decode(operation, id, &response).map(Some)
    }

    /// `PUT /api_keys/<id>` with only the supplied non-empty fields. An
    /// update with nothing to send issues no write and returns the current
    /// entity.
    ///
    /// # Errors
    /// [`RequestError::Missing`] if the key does not exist when nothing was
    /// sent.
    #[instrument(skip(self, update))]
    pub async fn update_api_key(&self, id: &str, update: &ApiKeyUpdate) -> RequestResult<ApiKey> {
        require_id(id)?;

        let operation = Operation::UpdateApiKey;
        let update = update.clone().normalized();
        if update.is_empty() {
            debug!(api_key_id = id, "Nothing to update, refreshing only");
            return self
                .read_api_key(id)
                .await?
                .ok_or_else(|| RequestError::missing(operation, id));
        }

        let body = encode(operation, id, &update)?;
        let response =
            self.send_checked(operation, id, HttpMethod::Put, &api_key_path(id), Some(body)).await?;
        decode(operation, id, &response)
    }

    /// `DELETE /api_keys/<id>`. A 404 counts as already deleted.
    ///
    /// # Errors
    /// Transport failures and non-404 rejections.
    #[instrument(skip(self))]
    pub async fn delete_api_key(&self, id: &str) -> RequestResult<DeleteOutcome> {
        require_id(id)?;

        let operation = Operation::DeleteApiKey;
        let response = self.send(operation, id, HttpMethod::Delete, &api_key_path(id), None).await?;

        if response.status == NOT_FOUND_STATUS {
            debug!(api_key_id = id, "API key already absent");
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        reject_unless_success(operation, id, response)?;
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use sgsync_domain::{TransportError, INTERNAL_STATUS};

    use super::*;
    use crate::testing::ScriptedTransport;

    fn client(transport: &Arc<ScriptedTransport>) -> SendgridClient {
        SendgridClient::new(transport.clone())
    }

    #[tokio::test]
    async fn create_without_name_makes_no_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = client(&transport).create_api_key(&ApiKeySpec::default()).await.unwrap_err();

        assert_eq!(err.to_string(), "name is required");
        assert_eq!(err.status_code(), INTERNAL_STATUS);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn create_returns_secret() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            201,
            json!({
                "api_key_id": "k1",
                "api_key": "SG.abc",
                "name": "deploy",
                "scopes": ["mail.send"]
            }),
        );

        let spec = ApiKeySpec { name: "deploy".into(), scopes: vec!["mail.send".into()] };
        let key = client(&transport).create_api_key(&spec).await.unwrap();

        assert_eq!(key.api_key_id, "k1");
        assert_eq!(key.api_key.as_deref(), Some("SG.abc"));
        assert_eq!(
            transport.requests()[0].body,
            Some(json!({"name": "deploy", "scopes": ["mail.send"]}))
        );
    }

    #[tokio::test]
    async fn create_rejection_keeps_status_and_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(400, r#"{"errors":[{"field":"scopes","message":"invalid"}]}"#);

        let spec = ApiKeySpec { name: "deploy".into(), scopes: vec!["bogus".into()] };
        let err = client(&transport).create_api_key(&spec).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains(r#""field":"scopes""#));
    }

    #[tokio::test]
    async fn read_without_id_is_precondition() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = client(&transport).read_api_key("").await.unwrap_err();
        assert_eq!(err, RequestError::Precondition(Precondition::ApiKeyIdRequired));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn read_404_is_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(404, r#"{"errors":[{"message":"not found"}]}"#);

        assert!(client(&transport).read_api_key("k1").await.unwrap().is_none());
        assert_eq!(transport.requests()[0].path, "/api_keys/k1");
    }

    #[tokio::test]
    async fn read_other_error_statuses_are_rejections() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(403, r#"{"errors":[{"message":"access forbidden"}]}"#);

        let err = client(&transport).read_api_key("k1").await.unwrap_err();
        assert!(matches!(err, RequestError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn read_transport_failure_names_operation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(TransportError::connect("connection refused"));

        let err = client(&transport).read_api_key("k1").await.unwrap_err();
        assert_eq!(err.to_string(), "failed reading API key 'k1': connection refused");
    }

    #[tokio::test]
    async fn update_sends_only_supplied_fields() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            json!({"api_key_id": "k1", "name": "renamed", "scopes": ["mail.send"]}),
        );

        let update = ApiKeyUpdate { name: Some("renamed".into()), scopes: None };
        let key = client(&transport).update_api_key("k1", &update).await.unwrap();

        assert_eq!(key.name, "renamed");
        let put = &transport.requests()[0];
        assert_eq!(put.method, HttpMethod::Put);
        assert_eq!(put.body, Some(json!({"name": "renamed"})));
    }

    #[tokio::test]
    async fn update_checks_status() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(429, "rate limited");

        let update = ApiKeyUpdate { name: Some("renamed".into()), scopes: None };
        let err = client(&transport).update_api_key("k1", &update).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn empty_update_reads_instead_of_writing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({"api_key_id": "k1", "name": "deploy"}));

        let update = ApiKeyUpdate { name: Some(String::new()), scopes: Some(vec![]) };
        client(&transport).update_api_key("k1", &update).await.unwrap();

        assert_eq!(transport.requests()[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn id_is_escaped_in_the_path() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(404, "");

        client(&transport).read_api_key("k1/../k2#x").await.unwrap();
        assert_eq!(transport.requests()[0].path, "/api_keys/k1%2F..%2Fk2%23x");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(204, "");
        transport.push_response(404, "");

        let client = client(&transport);
        assert_eq!(client.delete_api_key("k1").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(client.delete_api_key("k1").await.unwrap(), DeleteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn delete_server_error_is_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(500, "boom");

        let err = client(&transport).delete_api_key("k1").await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.operation(), Some(Operation::DeleteApiKey));
    }
}
