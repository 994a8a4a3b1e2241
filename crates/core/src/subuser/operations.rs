//! Subuser resource operations.
//!
//! Subusers are addressed by username. Reads go through the list endpoint
//! filtered by username, so "not found" is an empty result set rather than
//! a 404.

use std::collections::BTreeSet;

use sgsync_domain::{
    CreateSubuserRequest, DeleteOutcome, HttpMethod, Operation, Precondition, RequestError,
    RequestResult, Subuser, SubuserSpec, SubuserUpdate, NOT_FOUND_STATUS,
};
use tracing::{debug, instrument};
use url::form_urlencoded;
use urlencoding::encode as encode_segment;

use crate::client::{decode, encode, reject_unless_success, SendgridClient};

fn require_username(username: &str) -> Result<(), Precondition> {
    if username.is_empty() {
        return Err(Precondition::UsernameRequired);
    }
    Ok(())
}

/// Local checks run before any request is issued.
pub fn validate_spec(spec: &SubuserSpec) -> Result<(), Precondition> {
    require_username(&spec.username)?;
    if spec.email.is_empty() {
        return Err(Precondition::EmailRequired);
    }
    if spec.password.is_empty() {
        return Err(Precondition::PasswordRequired);
    }
    if spec.ips.is_empty() {
        return Err(Precondition::IpsRequired);
    }
    Ok(())
}

fn subuser_path(username: &str) -> String {
    format!("/subusers/{}", encode_segment(username))
}

impl SendgridClient {
    /// `POST /subusers`. Returns the created entity, including the
    /// system-assigned tokens.
    ///
    /// # Errors
    /// Precondition failures make no request. Remote rejections carry the
    /// remote status and body.
    #[instrument(skip(self, spec), fields(username = %spec.username))]
    pub async fn create_subuser(&self, spec: &SubuserSpec) -> RequestResult<Subuser> {
        validate_spec(spec)?;

        let operation = Operation::CreateSubuser;
        let target = spec.username.as_str();
        let body = encode(
            operation,
            target,
            &CreateSubuserRequest {
                username: &spec.username,
                email: &spec.email,
                password: &spec.password,
                ips: spec.ips.iter().map(String::as_str).collect(),
            },
        )?;

        let response =
            self.send_checked(operation, target, HttpMethod::Post, "/subusers", Some(body)).await?;
        decode(operation, target, &response)
    }

    /// `GET /subusers?username=<u>`. `Ok(None)` when no subuser has that
    /// exact username.
    ///
    /// # Errors
    /// Transport, rejection and decode failures.
    #[instrument(skip(self))]
    pub async fn read_subuser(&self, username: &str) -> RequestResult<Option<Subuser>> {
        require_username(username)?;

        let operation = Operation::ReadSubuser;
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("username", username)
            .finish();
        let path = format!("/subusers?{query}");

        let response = self.send_checked(operation, username, HttpMethod::Get, &path, None).await?;
        let subusers: Vec<Subuser> = decode(operation, username, &response)?;

        let found = subusers.into_iter().find(|subuser| subuser.username == username);
        if found.is_none() {
            debug!(username, "Subuser not found");
        }
        Ok(found)
    }

    /// `PATCH /subusers/<u>` with only the supplied fields, then re-read.
    /// An empty update issues no write.
    ///
    /// # Errors
    /// [`RequestError::Missing`] if the subuser is gone after the write.
    #[instrument(skip(self))]
    pub async fn update_subuser(
        &self,
        username: &str,
        update: &SubuserUpdate,
    ) -> RequestResult<Subuser> {
        require_username(username)?;

        let operation = Operation::UpdateSubuser;
        if update.is_empty() {
            debug!(username, "Nothing to update, refreshing only");
        } else {
            let body = encode(operation, username, update)?;
            self.send_checked(
                operation,
                username,
                HttpMethod::Patch,
                &subuser_path(username),
                Some(body),
            )
            .await?;
        }

        self.read_subuser(username)
            .await?
            .ok_or_else(|| RequestError::missing(operation, username))
    }

    /// `PUT /subusers/<u>/ips` with the full IP set, then re-read.
    ///
    /// # Errors
    /// An empty set is a precondition failure.
    #[instrument(skip(self, ips), fields(ip_count = ips.len()))]
    pub async fn update_subuser_ips(
        &self,
        username: &str,
        ips: &BTreeSet<String>,
    ) -> RequestResult<Subuser> {
        require_username(username)?;
        if ips.is_empty() {
            return Err(Precondition::IpsRequired.into());
        }

        let operation = Operation::UpdateSubuserIps;
        let body = encode(operation, username, ips)?;
        let path = format!("{}/ips", subuser_path(username));
        self.send_checked(operation, username, HttpMethod::Put, &path, Some(body)).await?;

        self.read_subuser(username)
            .await?
            .ok_or_else(|| RequestError::missing(operation, username))
    }

    /// `DELETE /subusers/<u>`. A 404 counts as already deleted.
    ///
    /// # Errors
    /// Transport failures and non-404 rejections.
    #[instrument(skip(self))]
    pub async fn delete_subuser(&self, username: &str) -> RequestResult<DeleteOutcome> {
        require_username(username)?;

        let operation = Operation::DeleteSubuser;
        let response = self
            .send(operation, username, HttpMethod::Delete, &subuser_path(username), None)
            .await?;

        if response.status == NOT_FOUND_STATUS {
            debug!(username, "Subuser already absent");
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        reject_unless_success(operation, username, response)?;
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use sgsync_domain::INTERNAL_STATUS;

    use super::*;
    use crate::testing::ScriptedTransport;

    fn alice() -> SubuserSpec {
        SubuserSpec {
            username: "alice".into(),
            email: "a@x.com".into(),
            password: "pw1".into(),
            ips: BTreeSet::from(["10.0.0.1".to_string()]),
            disabled: false,
        }
    }

    fn client(transport: &Arc<ScriptedTransport>) -> SendgridClient {
        SendgridClient::new(transport.clone())
    }

    #[tokio::test]
    async fn create_with_empty_username_makes_no_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let spec = SubuserSpec { username: String::new(), ..alice() };

        let err = client(&transport).create_subuser(&spec).await.unwrap_err();

        assert_eq!(err, RequestError::Precondition(Precondition::UsernameRequired));
        assert_eq!(err.status_code(), INTERNAL_STATUS);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn create_checks_each_required_field() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(&transport);

        let cases = [
            (SubuserSpec { email: String::new(), ..alice() }, Precondition::EmailRequired),
            (SubuserSpec { password: String::new(), ..alice() }, Precondition::PasswordRequired),
            (SubuserSpec { ips: BTreeSet::new(), ..alice() }, Precondition::IpsRequired),
        ];
        for (spec, expected) in cases {
            let err = client.create_subuser(&spec).await.unwrap_err();
            assert_eq!(err, RequestError::Precondition(expected));
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn create_sends_declared_fields() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(201, json!({"username": "alice", "user_id": 42, "email": "a@x.com"}));

        let created = client(&transport).create_subuser(&alice()).await.unwrap();
        assert_eq!(created.id, 42);

        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].path, "/subusers");
        assert_eq!(
            requests[0].body,
            Some(json!({
                "username": "alice",
                "email": "a@x.com",
                "password": "pw1",
                "ips": ["10.0.0.1"]
            }))
        );
    }

    #[tokio::test]
    async fn read_empty_list_is_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!([]));

        let found = client(&transport).read_subuser("ghost").await.unwrap();
        assert!(found.is_none());
        assert_eq!(transport.requests()[0].path, "/subusers?username=ghost");
    }

    #[tokio::test]
    async fn read_skips_entries_with_other_usernames() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!([{"id": 1, "username": "alice2", "email": "b@x.com"}]));

        assert!(client(&transport).read_subuser("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_decode_failure_is_internal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, "<html>oops</html>");

        let err = client(&transport).read_subuser("alice").await.unwrap_err();
        assert!(matches!(err, RequestError::Decode { operation: Operation::ReadSubuser, .. }));
        assert_eq!(err.status_code(), INTERNAL_STATUS);
    }

    #[tokio::test]
    async fn read_server_error_is_rejected_not_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(503, "unavailable");

        let err = client(&transport).read_subuser("alice").await.unwrap_err();
        assert_eq!(err.status_code(), 503);
        assert!(err.to_string().contains("unavailable"));
    }

    #[tokio::test]
    async fn empty_update_only_refreshes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!([{"id": 1, "username": "alice", "email": "a@x.com"}]));

        let subuser =
            client(&transport).update_subuser("alice", &SubuserUpdate::default()).await.unwrap();
        assert_eq!(subuser.username, "alice");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn update_reports_missing_when_entity_vanishes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(204, "");
        transport.push_json(200, json!([]));

        let err = client(&transport)
            .update_subuser("alice", &SubuserUpdate::disabled(true))
            .await
            .unwrap_err();
        assert_eq!(err, RequestError::missing(Operation::UpdateSubuser, "alice"));
        assert_eq!(transport.requests()[0].body, Some(json!({"disabled": true})));
    }

    #[tokio::test]
    async fn update_ips_puts_full_set() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({"ips": ["10.0.0.1", "10.0.0.2"]}));
        transport.push_json(200, json!([{"id": 1, "username": "alice", "email": "a@x.com"}]));

        let ips = BTreeSet::from(["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        client(&transport).update_subuser_ips("alice", &ips).await.unwrap();

        let put = &transport.requests()[0];
        assert_eq!(put.method, HttpMethod::Put);
        assert_eq!(put.path, "/subusers/alice/ips");
        assert_eq!(put.body, Some(json!(["10.0.0.1", "10.0.0.2"])));
    }

    #[tokio::test]
    async fn delete_treats_404_as_already_absent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(204, "");
        transport.push_response(404, r#"{"errors":[{"message":"not found"}]}"#);

        let client = client(&transport);
        assert_eq!(client.delete_subuser("alice").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(client.delete_subuser("alice").await.unwrap(), DeleteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn reserved_characters_stay_inside_the_path_segment() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(204, "");
        transport.push_response(404, "");
        transport.push_response(404, "");

        let client = client(&transport);
        client.delete_subuser("alice#evil").await.unwrap();
        client.delete_subuser("../api_keys/k1").await.unwrap();
        client.delete_subuser("bob smith?x=1").await.unwrap();

        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            [
                "/subusers/alice%23evil",
                "/subusers/..%2Fapi_keys%2Fk1",
                "/subusers/bob%20smith%3Fx%3D1",
            ]
        );
    }

    #[tokio::test]
    async fn delete_rate_limit_is_reported_as_429() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(429, "too many requests");

        let err = client(&transport).delete_subuser("alice").await.unwrap_err();
        assert!(err.is_rate_limited());
    }
}
