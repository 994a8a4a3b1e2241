//! Dispatch from parsed commands to lifecycle calls

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use sgsync_core::{
    ApiKeyLifecycle, LifecycleError, OperationContext, ReadOutcome, ResourceLifecycle,
    SubuserLifecycle,
};
use sgsync_domain::{ApiKeySpec, ApiKeyState, DeleteOutcome, SubuserSpec, SubuserState};
use sgsync_infra::SendgridApi;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::{
    ApiKeyCommand, ApiKeyCreateArgs, ApiKeyUpdateArgs, Command, SubuserCommand, SubuserCreateArgs,
    SubuserUpdateArgs,
};

/// What a command produced, for the caller to print.
#[derive(Debug)]
pub enum Report {
    /// Tracked state or a delete summary.
    State(Value),
    /// The entity does not exist remotely.
    Gone { resource: &'static str, id: String },
    /// The entity was created but the create failed afterwards. `state`
    /// must still be recorded.
    Partial { state: Value, error: anyhow::Error },
}

/// Runs one parsed command against the configured API.
pub struct Runner<'a> {
    api: &'a SendgridApi,
    timeout: Option<Duration>,
    cancellation: CancellationToken,
}

impl<'a> Runner<'a> {
    /// `timeout` overrides the configured per-operation budgets.
    pub fn new(
        api: &'a SendgridApi,
        timeout: Option<Duration>,
        cancellation: CancellationToken,
    ) -> Self {
        Self { api, timeout, cancellation }
    }

    fn context(&self, configured: OperationContext) -> OperationContext {
        self.timeout
            .map_or(configured, OperationContext::new)
            .with_cancellation(self.cancellation.clone())
    }

    /// Execute `command` and describe its result.
    pub async fn run(&self, command: Command) -> Result<Report> {
        match command {
            Command::Subuser(command) => self.subuser(command).await,
            Command::ApiKey(command) => self.api_key(command).await,
        }
    }

    async fn subuser(&self, command: SubuserCommand) -> Result<Report> {
        let subusers = self.api.subusers();
        match command {
            SubuserCommand::Create(args) => {
                let desired = subuser_spec(args);
                let result =
                    subusers.create(&desired, &self.context(self.api.create_context())).await;
                create_report(result, || format!("creating subuser '{}'", desired.username))
            }
            SubuserCommand::Read(args) => {
                let prior: Option<SubuserState> =
                    args.state.as_deref().map(read_state).transpose()?;
                let outcome = subusers
                    .read(&args.id, prior.as_ref())
                    .await
                    .with_context(|| format!("reading subuser '{}'", args.id))?;
                outcome_report(SubuserLifecycle::RESOURCE, args.id, outcome)
            }
            SubuserCommand::Update(args) => {
                let prior: SubuserState = read_state(&args.state)?;
                let desired = desired_subuser(&prior, args);
                let state = subusers
                    .update(&prior, &desired, &self.context(self.api.update_context()))
                    .await
                    .with_context(|| format!("updating subuser '{}'", prior.username))?;
                state_report(&state)
            }
            SubuserCommand::Delete(args) => {
                let outcome = subusers
                    .delete(&args.id, &self.context(self.api.delete_context()))
                    .await
                    .with_context(|| format!("deleting subuser '{}'", args.id))?;
                Ok(delete_report(&args.id, outcome))
            }
            SubuserCommand::Import(args) => {
                let outcome = subusers
                    .import(&args.id)
                    .await
                    .with_context(|| format!("importing subuser '{}'", args.id))?;
                outcome_report(SubuserLifecycle::RESOURCE, args.id, outcome)
            }
        }
    }

    async fn api_key(&self, command: ApiKeyCommand) -> Result<Report> {
        let keys = self.api.api_keys();
        match command {
            ApiKeyCommand::Create(args) => {
                let desired = api_key_spec(args);
                let result = keys.create(&desired, &self.context(self.api.create_context())).await;
                create_report(result, || format!("creating API key '{}'", desired.name))
            }
            ApiKeyCommand::Read(args) => {
                let prior: Option<ApiKeyState> = args.state.as_deref().map(read_state).transpose()?;
                let outcome = keys
                    .read(&args.id, prior.as_ref())
                    .await
                    .with_context(|| format!("reading API key '{}'", args.id))?;
                outcome_report(ApiKeyLifecycle::RESOURCE, args.id, outcome)
            }
            ApiKeyCommand::Update(args) => {
                let prior: ApiKeyState = read_state(&args.state)?;
                let desired = desired_api_key(&prior, args);
                let state = keys
                    .update(&prior, &desired, &self.context(self.api.update_context()))
                    .await
                    .with_context(|| format!("updating API key '{}'", prior.api_key_id))?;
                state_report(&state)
            }
            ApiKeyCommand::Delete(args) => {
                let outcome = keys
                    .delete(&args.id, &self.context(self.api.delete_context()))
                    .await
                    .with_context(|| format!("deleting API key '{}'", args.id))?;
                Ok(delete_report(&args.id, outcome))
            }
            ApiKeyCommand::Import(args) => {
                let outcome = keys
                    .import(&args.id)
                    .await
                    .with_context(|| format!("importing API key '{}'", args.id))?;
                outcome_report(ApiKeyLifecycle::RESOURCE, args.id, outcome)
            }
        }
    }
}

fn subuser_spec(args: SubuserCreateArgs) -> SubuserSpec {
    SubuserSpec {
        username: args.username,
        email: args.email,
        password: args.password,
        ips: args.ips.into_iter().collect(),
        disabled: args.disabled,
    }
}

/// Desired subuser: the saved state with the supplied flags laid over it.
fn desired_subuser(prior: &SubuserState, args: SubuserUpdateArgs) -> SubuserSpec {
    SubuserSpec {
        username: prior.username.clone(),
        email: args.email.unwrap_or_else(|| prior.email.clone()),
        password: args.password.unwrap_or_else(|| prior.password.clone()),
        ips: if args.ips.is_empty() { prior.ips.clone() } else { args.ips.into_iter().collect() },
        disabled: args.disabled.unwrap_or(prior.disabled),
    }
}

fn api_key_spec(args: ApiKeyCreateArgs) -> ApiKeySpec {
    ApiKeySpec { name: args.name, scopes: args.scopes }
}

fn desired_api_key(prior: &ApiKeyState, args: ApiKeyUpdateArgs) -> ApiKeySpec {
    ApiKeySpec {
        name: args.name.unwrap_or_else(|| prior.name.clone()),
        scopes: if args.scopes.is_empty() { prior.scopes.clone() } else { args.scopes },
    }
}

fn read_state<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!(path = %path.display(), "Reading saved state");
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading state file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing state file {}", path.display()))
}

fn state_report<T: Serialize>(state: &T) -> Result<Report> {
    Ok(Report::State(serde_json::to_value(state).context("serializing state")?))
}

fn create_report<S, F>(result: Result<S, LifecycleError>, describe: F) -> Result<Report>
where
    S: Serialize,
    F: Fn() -> String,
{
    match result {
        Ok(state) => state_report(&state),
        Err(LifecycleError::PartiallyCreated { state, source, .. }) => Ok(Report::Partial {
            state: serde_json::to_value(&*state).context("serializing state")?,
            error: anyhow::Error::new(*source).context(describe()),
        }),
        Err(err) => Err(anyhow::Error::new(err).context(describe())),
    }
}

fn outcome_report<S: Serialize>(
    resource: &'static str,
    id: String,
    outcome: ReadOutcome<S>,
) -> Result<Report> {
    match outcome {
        ReadOutcome::Present(state) => state_report(&state),
        ReadOutcome::Gone => Ok(Report::Gone { resource, id }),
    }
}

fn delete_report(id: &str, outcome: DeleteOutcome) -> Report {
    let outcome = match outcome {
        DeleteOutcome::Deleted => "deleted",
        DeleteOutcome::AlreadyAbsent => "already_absent",
    };
    Report::State(json!({ "id": id, "outcome": outcome }))
}
