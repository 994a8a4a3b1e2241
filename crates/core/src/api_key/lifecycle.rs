//! API key lifecycle controller

use async_trait::async_trait;
use sgsync_common::resilience::{AttemptOutcome, RetryExecutor, RetryableOperation};
use sgsync_domain::{
    ApiKey, ApiKeySpec, ApiKeyState, ApiKeyUpdate, DeleteOutcome, Operation, RequestError,
};
use tracing::{info, instrument, warn};

use super::operations::validate_spec;
use crate::client::SendgridClient;
use crate::lifecycle::{
    classify, run_write, CreatedState, LifecycleError, OperationContext, ReadOutcome,
    ResourceLifecycle,
};

struct CreateAttempt<'a> {
    client: &'a SendgridClient,
    spec: &'a ApiKeySpec,
}

#[async_trait]
impl RetryableOperation for CreateAttempt<'_> {
    type Output = ApiKey;
    type Error = RequestError;

    fn name(&self) -> &str {
        Operation::CreateApiKey.label()
    }

    async fn attempt(&self) -> AttemptOutcome<ApiKey, RequestError> {
        classify(self.client.create_api_key(self.spec).await)
    }
}

struct UpdateAttempt<'a> {
    client: &'a SendgridClient,
    id: &'a str,
    update: ApiKeyUpdate,
}

#[async_trait]
impl RetryableOperation for UpdateAttempt<'_> {
    type Output = ApiKey;
    type Error = RequestError;

    fn name(&self) -> &str {
        Operation::UpdateApiKey.label()
    }

    async fn attempt(&self) -> AttemptOutcome<ApiKey, RequestError> {
        classify(self.client.update_api_key(self.id, &self.update).await)
    }
}

struct DeleteAttempt<'a> {
    client: &'a SendgridClient,
    id: &'a str,
}

#[async_trait]
impl RetryableOperation for DeleteAttempt<'_> {
    type Output = DeleteOutcome;
    type Error = RequestError;

    fn name(&self) -> &str {
        Operation::DeleteApiKey.label()
    }

    async fn attempt(&self) -> AttemptOutcome<DeleteOutcome, RequestError> {
        classify(self.client.delete_api_key(self.id).await)
    }
}

/// Reconciles API keys. The identifier is the remote-assigned key id; name
/// and scopes are both mutable in place.
#[derive(Debug, Clone)]
pub struct ApiKeyLifecycle {
    client: SendgridClient,
    executor: RetryExecutor,
}

impl ApiKeyLifecycle {
    /// Controller issuing writes through `executor`.
    pub fn new(client: SendgridClient, executor: RetryExecutor) -> Self {
        Self { client, executor }
    }

    async fn refresh(&self, carried: &ApiKeyState) -> Result<ApiKeyState, LifecycleError> {
        match self.read(&carried.api_key_id, Some(carried)).await? {
            ReadOutcome::Present(state) => Ok(state),
            ReadOutcome::Gone => Err(LifecycleError::Gone {
                resource: Self::RESOURCE,
                id: carried.api_key_id.clone(),
            }),
        }
    }

    /// Fields of `desired` that differ from `prior`.
    fn diff(prior: &ApiKeyState, desired: &ApiKeySpec) -> ApiKeyUpdate {
        ApiKeyUpdate {
            name: (prior.name != desired.name).then(|| desired.name.clone()),
            scopes: (prior.scopes != desired.scopes).then(|| desired.scopes.clone()),
        }
        .normalized()
    }
}

#[async_trait]
impl ResourceLifecycle for ApiKeyLifecycle {
    type Desired = ApiKeySpec;
    type State = ApiKeyState;

    const RESOURCE: &'static str = "API key";

    #[instrument(skip(self, desired, ctx), fields(name = %desired.name))]
    async fn create(
        &self,
        desired: &ApiKeySpec,
        ctx: &OperationContext,
    ) -> Result<ApiKeyState, LifecycleError> {
        validate_spec(desired).map_err(RequestError::from)?;

        let attempt = CreateAttempt { client: &self.client, spec: desired };
        let created =
            run_write(&self.executor, &attempt, Operation::CreateApiKey, &desired.name, ctx).await?;
        info!(api_key_id = %created.api_key_id, "API key created");

        let state = ApiKeyState::from_remote(&created, None);
        let refreshed = self.refresh(&state).await;
        refreshed.map_err(|err| {
            warn!(
                api_key_id = %state.api_key_id,
                error = %err,
                "API key created but refreshing it failed"
            );
            LifecycleError::partially_created(Self::RESOURCE, CreatedState::ApiKey(state), err)
        })
    }

    #[instrument(skip(self, prior))]
    async fn read(
        &self,
        id: &str,
        prior: Option<&ApiKeyState>,
    ) -> Result<ReadOutcome<ApiKeyState>, LifecycleError> {
        let secret = prior.and_then(|state| state.api_key.as_deref());
        let found = self.client.read_api_key(id).await?;
        if found.is_none() {
            info!(api_key_id = id, "API key is gone");
        }
        Ok(found.map(|key| ApiKeyState::from_remote(&key, secret)).into())
    }

    #[instrument(skip(self, prior, desired, ctx), fields(api_key_id = %prior.api_key_id))]
    async fn update(
        &self,
        prior: &ApiKeyState,
        desired: &ApiKeySpec,
        ctx: &OperationContext,
    ) -> Result<ApiKeyState, LifecycleError> {
        validate_spec(desired).map_err(RequestError::from)?;

        let update = Self::diff(prior, desired);
        if !update.is_empty() {
            let id = prior.api_key_id.as_str();
            let attempt = UpdateAttempt { client: &self.client, id, update };
            run_write(&self.executor, &attempt, Operation::UpdateApiKey, id, ctx).await?;
            info!(api_key_id = id, "API key updated");
        }

        self.refresh(prior).await
    }

    #[instrument(skip(self, ctx))]
    async fn delete(
        &self,
        id: &str,
        ctx: &OperationContext,
    ) -> Result<DeleteOutcome, LifecycleError> {
        let attempt = DeleteAttempt { client: &self.client, id };
        let outcome = run_write(&self.executor, &attempt, Operation::DeleteApiKey, id, ctx).await?;
        info!(api_key_id = id, removed = outcome.removed(), "API key deleted");
        Ok(outcome)
    }
}
