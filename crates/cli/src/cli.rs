//! Command-line surface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Reconcile SendGrid subusers and API keys
#[derive(Parser, Debug)]
#[command(name = "sgsync", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or JSON). Without it, the environment is
    /// tried first, then the standard file locations.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overall budget in seconds for a write, overriding the configured one
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage subusers
    #[command(subcommand)]
    Subuser(SubuserCommand),
    /// Manage API keys
    #[command(subcommand)]
    ApiKey(ApiKeyCommand),
}

#[derive(Subcommand, Debug)]
pub enum SubuserCommand {
    /// Create a subuser and print its state
    Create(SubuserCreateArgs),
    /// Read the current state of a subuser
    Read(ReadArgs),
    /// Converge a subuser from a saved state onto new desired fields
    Update(SubuserUpdateArgs),
    /// Delete a subuser
    Delete(IdArgs),
    /// Adopt an existing subuser
    Import(IdArgs),
}

#[derive(Subcommand, Debug)]
pub enum ApiKeyCommand {
    /// Create an API key and print its state, secret included
    Create(ApiKeyCreateArgs),
    /// Read the current state of an API key
    Read(ReadArgs),
    /// Converge an API key from a saved state onto new desired fields
    Update(ApiKeyUpdateArgs),
    /// Delete an API key
    Delete(IdArgs),
    /// Adopt an existing API key by id
    Import(IdArgs),
}

#[derive(Args, Debug)]
pub struct SubuserCreateArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub email: String,

    #[arg(long, env = "SGSYNC_SUBUSER_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// IP address to assign; repeat for several
    #[arg(long = "ip", required = true)]
    pub ips: Vec<String>,

    #[arg(long)]
    pub disabled: bool,
}

#[derive(Args, Debug)]
pub struct SubuserUpdateArgs {
    /// Saved state to converge from
    #[arg(long)]
    pub state: PathBuf,

    /// New email. Email is immutable, so a different value is refused.
    #[arg(long)]
    pub email: Option<String>,

    #[arg(long, env = "SGSYNC_SUBUSER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Replaces the whole IP set when given
    #[arg(long = "ip")]
    pub ips: Vec<String>,

    #[arg(long)]
    pub disabled: Option<bool>,
}

#[derive(Args, Debug)]
pub struct ApiKeyCreateArgs {
    #[arg(long)]
    pub name: String,

    /// Scope to grant; repeat for several
    #[arg(long = "scope")]
    pub scopes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ApiKeyUpdateArgs {
    /// Saved state to converge from
    #[arg(long)]
    pub state: PathBuf,

    #[arg(long)]
    pub name: Option<String>,

    /// Replaces the whole scope list when given
    #[arg(long = "scope")]
    pub scopes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Username or API key id
    pub id: String,

    /// Saved state whose carried fields (password, secret) are kept
    #[arg(long)]
    pub state: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Username or API key id
    pub id: String,
}
