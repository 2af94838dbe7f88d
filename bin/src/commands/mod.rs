//! CLI command implementations.

use anyhow::{Context, Result};
use clap::Args;
use dataquery_lib::{ClientConfig, DataQueryClient};
use std::sync::Arc;

pub(crate) mod availability;
pub(crate) mod download;
pub(crate) mod download_group;

/// Connection settings; each flag overrides its `DATAQUERY_*` variable.
#[derive(Args)]
pub(crate) struct ConnectionArgs {
    /// API host
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// API context path
    #[arg(long, global = true)]
    context_path: Option<String>,

    /// Separate host for file endpoints
    #[arg(long, global = true)]
    files_base_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "DATAQUERY_BEARER_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Requests per minute across all downloads
    #[arg(long, global = true)]
    requests_per_minute: Option<u32>,

    /// Retries per request after the first attempt
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

impl ConnectionArgs {
    /// Builds the client from the environment plus flag overrides.
    pub(crate) fn client(&self) -> Result<Arc<DataQueryClient>> {
        let mut config =
            ClientConfig::from_env().context("Invalid DATAQUERY_* environment variable")?;
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(context_path) = &self.context_path {
            config.context_path = Some(context_path.clone());
        }
        if let Some(files_base_url) = &self.files_base_url {
            config.files_base_url = Some(files_base_url.clone());
        }
        if let Some(token) = &self.token {
            config.bearer_token = Some(token.clone());
        }
        if let Some(rpm) = self.requests_per_minute {
            config.requests_per_minute = rpm;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }

        let client = DataQueryClient::new(config).context("Failed to create DataQuery client")?;
        Ok(Arc::new(client))
    }
}
