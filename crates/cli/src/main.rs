//! `sgsync` command-line host
//!
//! Exposes create/read/update/delete/import for subusers and API keys and
//! prints the resulting tracked state as JSON on stdout.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;
mod commands;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sgsync_infra::{config, init_tracing, SendgridApi};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::Cli;
use crate::commands::{Report, Runner};

/// Exit status when the requested entity no longer exists remotely.
const GONE_EXIT_CODE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(Report::State(state)) => match serde_json::to_string_pretty(&state) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        Ok(Report::Partial { state, error }) => {
            if let Ok(text) = serde_json::to_string_pretty(&state) {
                println!("{text}");
            }
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
        Ok(Report::Gone { resource, id }) => {
            eprintln!("{resource} '{id}' is gone");
            ExitCode::from(GONE_EXIT_CODE)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Report> {
    dotenvy::dotenv().ok();

    let config = match cli.config {
        Some(path) => config::load_from_file(Some(path)),
        None => config::load(),
    }
    .context("loading configuration")?;
    init_tracing(&config.logging).context("initialising logging")?;

    let api = SendgridApi::from_config(&config).context("building API client")?;

    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operation");
            on_interrupt.cancel();
        }
    });

    Runner::new(&api, cli.timeout.map(Duration::from_secs), cancellation).run(cli.command).await
}
