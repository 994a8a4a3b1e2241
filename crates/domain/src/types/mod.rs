//! Domain types and models

pub mod api_key;
pub mod http;
pub mod subuser;

pub use api_key::{ApiKey, ApiKeySpec, ApiKeyState, ApiKeyUpdate, CreateApiKeyRequest};
pub use http::{DeleteOutcome, HttpMethod, RawResponse};
pub use subuser::{
    CreateSubuserRequest, CreditAllocation, Subuser, SubuserSpec, SubuserState, SubuserUpdate,
};
