//! Wiring from [`Config`] to ready-to-use lifecycle controllers

use std::sync::Arc;

use sgsync_common::resilience::{Jitter, RetryConfig, RetryExecutor};
use sgsync_core::{ApiKeyLifecycle, OperationContext, SendgridClient, SubuserLifecycle, Transport};
use sgsync_domain::{Config, Result, RetrySettings, SgsyncError};
use tracing::debug;

use crate::http::HttpTransport;

/// Backoff growth factor between rate-limited attempts.
const BACKOFF_MULTIPLIER: u32 = 2;

/// Entry point for hosts: one client and retry policy shared by every
/// lifecycle it hands out.
#[derive(Debug, Clone)]
pub struct SendgridApi {
    client: SendgridClient,
    executor: RetryExecutor,
    retry: RetrySettings,
}

impl SendgridApi {
    /// Validate `config` and build the HTTP-backed API.
    ///
    /// # Errors
    /// Returns `SgsyncError::Config` for invalid settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::from_config(&config.api)?;
        debug!(base_url = transport.base_url(), "HTTP transport ready");
        Self::with_transport(Arc::new(transport), &config.retry)
    }

    /// Build over any [`Transport`], e.g. a test double.
    ///
    /// # Errors
    /// Returns `SgsyncError::Config` if the backoff settings are invalid.
    pub fn with_transport(transport: Arc<dyn Transport>, retry: &RetrySettings) -> Result<Self> {
        Ok(Self {
            client: SendgridClient::new(transport),
            executor: RetryExecutor::new(retry_config(retry)?),
            retry: retry.clone(),
        })
    }

    /// Subuser controller sharing this client.
    pub fn subusers(&self) -> SubuserLifecycle {
        SubuserLifecycle::new(self.client.clone(), self.executor.clone())
    }

    /// API key controller sharing this client.
    pub fn api_keys(&self) -> ApiKeyLifecycle {
        ApiKeyLifecycle::new(self.client.clone(), self.executor.clone())
    }

    /// Context carrying the configured create budget.
    pub fn create_context(&self) -> OperationContext {
        OperationContext::new(self.retry.create_timeout())
    }

    /// Context sized by the update budget.
    pub fn update_context(&self) -> OperationContext {
        OperationContext::new(self.retry.update_timeout())
    }

    /// Context sized by the delete budget.
    pub fn delete_context(&self) -> OperationContext {
        OperationContext::new(self.retry.delete_timeout())
    }
}

/// Map the `[retry]` section onto an exponential backoff policy.
///
/// # Errors
/// Returns `SgsyncError::Config` if the policy does not validate.
pub fn retry_config(settings: &RetrySettings) -> Result<RetryConfig> {
    let jitter = if settings.jitter { Jitter::Equal } else { Jitter::None };
    RetryConfig::builder()
        .exponential_backoff(settings.initial_backoff(), BACKOFF_MULTIPLIER, settings.max_backoff())
        .jitter(jitter)
        .build()
        .map_err(|e| SgsyncError::Config(format!("Invalid retry settings: {e}")))
}
