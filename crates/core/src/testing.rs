//! Test doubles for the [`Transport`] port
//!
//! - [`ScriptedTransport`] replays queued responses in order and records
//!   every request, for asserting exactly what went over the wire.
//! - [`FakeSendgrid`] is a stateful in-memory stand-in for the remote API
//!   covering the subuser and API key endpoints, with an optional run of
//!   429 responses to exercise rate-limit retries.

#![allow(clippy::missing_panics_doc)]

use std::borrow::Cow;
use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sgsync_domain::{HttpMethod, RawResponse, TransportError, TransportErrorKind};
use url::form_urlencoded;

use crate::ports::Transport;

/// A request captured by a test transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Path relative to the API root, query included.
    pub path: String,
    /// Parsed JSON body, if any.
    pub body: Option<Value>,
}

type ScriptedReply = Result<RawResponse, TransportError>;

/// Transport that answers from a queue.
///
/// When the queue is empty every request fails with a
/// [`TransportErrorKind::Request`] error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Transport with an empty reply queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw reply.
    pub fn push_response(&self, status: u16, body: &str) {
        self.replies.lock().push_back(Ok(RawResponse::new(status, body)));
    }

    /// Queue a JSON reply.
    pub fn push_json(&self, status: u16, body: Value) {
        self.replies.lock().push_back(Ok(RawResponse::new(status, body.to_string())));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, error: TransportError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn issue_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<RawResponse, TransportError> {
        self.requests.lock().push(RecordedRequest { method, path: path.to_string(), body });
        self.replies.lock().pop_front().unwrap_or_else(|| {
            Err(TransportError::new(TransportErrorKind::Request, "no scripted response left"))
        })
    }
}

#[derive(Debug, Clone)]
struct FakeSubuser {
    id: u64,
    username: String,
    email: String,
    disabled: bool,
    ips: Vec<String>,
}

#[derive(Debug, Clone)]
struct FakeApiKey {
    id: String,
    name: String,
    scopes: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    subusers: BTreeMap<String, FakeSubuser>,
    api_keys: BTreeMap<String, FakeApiKey>,
    next_id: u64,
    rate_limited: u32,
}

/// In-memory remote API.
///
/// The list endpoint omits IPs and tokens, as the real one does, so the
/// lifecycle has to carry them from create.
#[derive(Debug, Default)]
pub struct FakeSendgrid {
    state: Mutex<FakeState>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeSendgrid {
    /// Empty account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `count` requests with 429, whatever they are.
    pub fn rate_limit_next(&self, count: u32) {
        self.state.lock().rate_limited = count;
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Requests matching a method and exact path.
    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.method == method && r.path == path).count()
    }

    /// Whether the subuser exists.
    pub fn has_subuser(&self, username: &str) -> bool {
        self.state.lock().subusers.contains_key(username)
    }

    /// Stored disabled flag, if the subuser exists.
    pub fn subuser_disabled(&self, username: &str) -> Option<bool> {
        self.state.lock().subusers.get(username).map(|s| s.disabled)
    }

    /// Stored IPs, if the subuser exists.
    pub fn subuser_ips(&self, username: &str) -> Option<Vec<String>> {
        self.state.lock().subusers.get(username).map(|s| s.ips.clone())
    }

    /// Whether the API key exists.
    pub fn has_api_key(&self, id: &str) -> bool {
        self.state.lock().api_keys.contains_key(id)
    }

    fn handle(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> RawResponse {
        let mut state = self.state.lock();
        if state.rate_limited > 0 {
            state.rate_limited -= 1;
            return error(429, "too many requests");
        }

        let (route, query) = path.split_once('?').unwrap_or((path, ""));
        let decoded: Vec<String> = route
            .trim_start_matches('/')
            .split('/')
            .map(|raw| urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned))
            .collect();
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

        match (method, segments.as_slice()) {
            (HttpMethod::Post, ["subusers"]) => state.create_subuser(body),
            (HttpMethod::Get, ["subusers"]) => state.list_subusers(query),
            (HttpMethod::Patch, ["subusers", username]) => state.patch_subuser(username, body),
            (HttpMethod::Put, ["subusers", username, "ips"]) => state.put_ips(username, body),
            (HttpMethod::Delete, ["subusers", username]) => {
                if state.subusers.remove(*username).is_some() {
                    RawResponse::new(204, "")
                } else {
                    error(404, "subuser not found")
                }
            }
            (HttpMethod::Post, ["api_keys"]) => state.create_api_key(body),
            (HttpMethod::Get, ["api_keys", id]) => match state.api_keys.get(*id) {
                Some(key) => ok(200, &api_key_json(key, None)),
                None => error(404, "api key not found"),
            },
            (HttpMethod::Put, ["api_keys", id]) => state.put_api_key(id, body),
            (HttpMethod::Delete, ["api_keys", id]) => {
                if state.api_keys.remove(*id).is_some() {
                    RawResponse::new(204, "")
                } else {
                    error(404, "api key not found")
                }
            }
            _ => error(404, "no such route"),
        }
    }
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn create_subuser(&mut self, body: Option<&Value>) -> RawResponse {
        let Some(body) = body else { return error(400, "missing body") };
        let username = str_field(body, "username");
        if username.is_empty() {
            return error(400, "username is required");
        }
        if self.subusers.contains_key(&username) {
            return error(400, "username exists");
        }

        let id = self.next_id();
        let subuser = FakeSubuser {
            id,
            username: username.clone(),
            email: str_field(body, "email"),
            disabled: false,
            ips: string_list(body.get("ips")),
        };
        let response = json!({
            "username": subuser.username,
            "user_id": id,
            "email": subuser.email,
            "signup_session_token": format!("signup-{id}"),
            "authorization_token": format!("auth-{id}"),
            "credit_allocation": {"type": "unlimited"},
        });
        self.subusers.insert(username, subuser);
        ok(201, &response)
    }

    fn list_subusers(&self, query: &str) -> RawResponse {
        let filter = form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "username")
            .map(|(_, value)| value.into_owned());

        let entries: Vec<Value> = self
            .subusers
            .values()
            .filter(|s| filter.as_deref().map_or(true, |name| s.username == name))
            .map(|s| {
                json!({
                    "id": s.id,
                    "username": s.username,
                    "email": s.email,
                    "disabled": s.disabled
                })
            })
            .collect();
        ok(200, &Value::Array(entries))
    }

    fn patch_subuser(&mut self, username: &str, body: Option<&Value>) -> RawResponse {
        let Some(subuser) = self.subusers.get_mut(username) else {
            return error(404, "subuser not found");
        };
        if let Some(disabled) = body.and_then(|b| b.get("disabled")).and_then(Value::as_bool) {
            subuser.disabled = disabled;
        }
        RawResponse::new(204, "")
    }

    fn put_ips(&mut self, username: &str, body: Option<&Value>) -> RawResponse {
        let Some(subuser) = self.subusers.get_mut(username) else {
            return error(404, "subuser not found");
        };
        subuser.ips = string_list(body);
        ok(200, &json!({"ips": subuser.ips}))
    }

    fn create_api_key(&mut self, body: Option<&Value>) -> RawResponse {
        let Some(body) = body else { return error(400, "missing body") };
        let name = str_field(body, "name");
        if name.is_empty() {
            return error(400, "name is required");
        }

        let id = format!("key-{}", self.next_id());
        let key = FakeApiKey {
            id: id.clone(),
            name,
            scopes: body.get("scopes").map_or_else(
                || vec!["mail.send".to_string()],
                |scopes| string_list(Some(scopes)),
            ),
        };
        let secret = format!("SG.secret-{id}");
        let response = api_key_json(&key, Some(&secret));
        self.api_keys.insert(id, key);
        ok(201, &response)
    }

    fn put_api_key(&mut self, id: &str, body: Option<&Value>) -> RawResponse {
        let Some(key) = self.api_keys.get_mut(id) else {
            return error(404, "api key not found");
        };
        if let Some(name) = body.and_then(|b| b.get("name")).and_then(Value::as_str) {
            key.name = name.to_string();
        }
        if let Some(scopes) = body.and_then(|b| b.get("scopes")) {
            key.scopes = string_list(Some(scopes));
        }
        ok(200, &api_key_json(key, None))
    }
}

#[async_trait]
impl Transport for FakeSendgrid {
    async fn issue_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<RawResponse, TransportError> {
        let response = self.handle(method, path, body.as_ref());
        self.requests.lock().push(RecordedRequest { method, path: path.to_string(), body });
        Ok(response)
    }
}

fn api_key_json(key: &FakeApiKey, secret: Option<&str>) -> Value {
    let mut value = json!({"api_key_id": key.id, "name": key.name, "scopes": key.scopes});
    if let Some(secret) = secret {
        value["api_key"] = Value::String(secret.to_string());
    }
    value
}

fn str_field(body: &Value, key: &str) -> String {
    body.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn ok(status: u16, body: &Value) -> RawResponse {
    RawResponse::new(status, body.to_string())
}

fn error(status: u16, message: &str) -> RawResponse {
    ok(status, &json!({"errors": [{"message": message}]}))
}
