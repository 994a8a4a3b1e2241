//! Subuser lifecycle controller

use std::collections::BTreeSet;

use async_trait::async_trait;
use sgsync_common::resilience::{AttemptOutcome, RetryExecutor, RetryableOperation};
use sgsync_domain::{
    DeleteOutcome, Operation, RequestError, Subuser, SubuserSpec, SubuserState, SubuserUpdate,
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
    spec: &'a SubuserSpec,
}

#[async_trait]
impl RetryableOperation for CreateAttempt<'_> {
    type Output = Subuser;
    type Error = RequestError;

    fn name(&self) -> &str {
        Operation::CreateSubuser.label()
    }

    async fn attempt(&self) -> AttemptOutcome<Subuser, RequestError> {
        classify(self.client.create_subuser(self.spec).await)
    }
}

struct UpdateAttempt<'a> {
    client: &'a SendgridClient,
    username: &'a str,
    update: SubuserUpdate,
}

#[async_trait]
impl RetryableOperation for UpdateAttempt<'_> {
    type Output = Subuser;
    type Error = RequestError;

    fn name(&self) -> &str {
        Operation::UpdateSubuser.label()
    }

    async fn attempt(&self) -> AttemptOutcome<Subuser, RequestError> {
        classify(self.client.update_subuser(self.username, &self.update).await)
    }
}

struct UpdateIpsAttempt<'a> {
    client: &'a SendgridClient,
    username: &'a str,
    ips: &'a BTreeSet<String>,
}

#[async_trait]
impl RetryableOperation for UpdateIpsAttempt<'_> {
    type Output = Subuser;
    type Error = RequestError;

    fn name(&self) -> &str {
        Operation::UpdateSubuserIps.label()
    }

    async fn attempt(&self) -> AttemptOutcome<Subuser, RequestError> {
        classify(self.client.update_subuser_ips(self.username, self.ips).await)
    }
}

struct DeleteAttempt<'a> {
    client: &'a SendgridClient,
    username: &'a str,
}

#[async_trait]
impl RetryableOperation for DeleteAttempt<'_> {
    type Output = DeleteOutcome;
    type Error = RequestError;

    fn name(&self) -> &str {
        Operation::DeleteSubuser.label()
    }

    async fn attempt(&self) -> AttemptOutcome<DeleteOutcome, RequestError> {
        classify(self.client.delete_subuser(self.username).await)
    }
}

/// Reconciles one subuser at a time against its declared fields.
///
/// The identifier is the username. Username, email and password cannot be
/// changed in place; `disabled` and `ips` can.
#[derive(Debug, Clone)]
pub struct SubuserLifecycle {
    client: SendgridClient,
    executor: RetryExecutor,
}

impl SubuserLifecycle {
    /// Controller issuing writes through `executor`.
    pub fn new(client: SendgridClient, executor: RetryExecutor) -> Self {
        Self { client, executor }
    }

    async fn refresh(&self, carried: &SubuserState) -> Result<SubuserState, LifecycleError> {
        match self.read(&carried.username, Some(carried)).await? {
            ReadOutcome::Present(state) => Ok(state),
            ReadOutcome::Gone => Err(LifecycleError::Gone {
                resource: Self::RESOURCE,
                id: carried.username.clone(),
            }),
        }
    }

    fn immutable_change(prior: &SubuserState, desired: &SubuserSpec) -> Option<&'static str> {
        if prior.username != desired.username {
            Some("username")
        } else if prior.email != desired.email {
            Some("email")
        } else if !prior.password.is_empty() && prior.password != desired.password {
            Some("password")
        } else {
            None
        }
    }
}

#[async_trait]
impl ResourceLifecycle for SubuserLifecycle {
    type Desired = SubuserSpec;
    type State = SubuserState;

    const RESOURCE: &'static str = "subuser";

    #[instrument(skip(self, desired, ctx), fields(username = %desired.username))]
    async fn create(
        &self,
        desired: &SubuserSpec,
        ctx: &OperationContext,
    ) -> Result<SubuserState, LifecycleError> {
        validate_spec(desired).map_err(RequestError::from)?;
        let username = desired.username.as_str();

        let attempt = CreateAttempt { client: &self.client, spec: desired };
        let created =
            run_write(&self.executor, &attempt, Operation::CreateSubuser, username, ctx).await?;
        info!(username, user_id = created.id, "Subuser created");

        let mut state = SubuserState::from_remote(&created, Some(&SubuserState::declared(desired)));

        if desired.disabled {
            let attempt = UpdateAttempt {
                client: &self.client,
                username,
                update: SubuserUpdate::disabled(true),
            };
            let disabled =
                run_write(&self.executor, &attempt, Operation::UpdateSubuser, username, ctx).await;
            match disabled {
                Ok(updated) => state = SubuserState::from_remote(&updated, Some(&state)),
                Err(err) => {
                    warn!(username, error = %err, "Subuser created but disabling it failed");
                    return Err(LifecycleError::partially_created(
                        Self::RESOURCE,
                        CreatedState::Subuser(state),
                        err,
                    ));
                }
            }
        }

        let refreshed = self.refresh(&state).await;
        refreshed.map_err(|err| {
            warn!(username, error = %err, "Subuser created but refreshing it failed");
            LifecycleError::partially_created(Self::RESOURCE, CreatedState::Subuser(state), err)
        })
    }

    #[instrument(skip(self, prior))]
    async fn read(
        &self,
        id: &str,
        prior: Option<&SubuserState>,
    ) -> Result<ReadOutcome<SubuserState>, LifecycleError> {
        let found = self.client.read_subuser(id).await?;
        if found.is_none() {
            info!(username = id, "Subuser is gone");
        }
        Ok(found.map(|subuser| SubuserState::from_remote(&subuser, prior)).into())
    }

    #[instrument(skip(self, prior, desired, ctx), fields(username = %prior.username))]
    async fn update(
        &self,
        prior: &SubuserState,
        desired: &SubuserSpec,
        ctx: &OperationContext,
    ) -> Result<SubuserState, LifecycleError> {
        validate_spec(desired).map_err(RequestError::from)?;
        if let Some(field) = Self::immutable_change(prior, desired) {
            return Err(LifecycleError::ReplacementRequired {
                resource: Self::RESOURCE,
                id: prior.username.clone(),
                field,
            });
        }

        let username = prior.username.as_str();
        let mut carried = prior.clone();
        carried.password.clone_from(&desired.password);

        if prior.disabled != desired.disabled {
            let attempt = UpdateAttempt {
                client: &self.client,
                username,
                update: SubuserUpdate::disabled(desired.disabled),
            };
            run_write(&self.executor, &attempt, Operation::UpdateSubuser, username, ctx).await?;
            info!(username, disabled = desired.disabled, "Subuser disabled flag updated");
        }

        if prior.ips != desired.ips {
            let attempt = UpdateIpsAttempt { client: &self.client, username, ips: &desired.ips };
            run_write(&self.executor, &attempt, Operation::UpdateSubuserIps, username, ctx).await?;
            info!(username, ip_count = desired.ips.len(), "Subuser ips updated");
        }
        carried.ips.clone_from(&desired.ips);

        self.refresh(&carried).await
    }

    #[instrument(skip(self, ctx))]
    async fn delete(
        &self,
        id: &str,
        ctx: &OperationContext,
    ) -> Result<DeleteOutcome, LifecycleError> {
        let attempt = DeleteAttempt { client: &self.client, username: id };
        let outcome = run_write(&self.executor, &attempt, Operation::DeleteSubuser, id, ctx).await?;
        info!(username = id, removed = outcome.removed(), "Subuser deleted");
        Ok(outcome)
    }
}
