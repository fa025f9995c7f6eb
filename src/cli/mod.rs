//! CLI module for the user account tool
//!
//! Each subcommand loads configuration, initialises logging, builds the
//! account service and prints its result as pretty JSON on stdout.
//!
//! With the default `memory` storage backend every invocation starts from an
//! empty store; point `storage.backend` at PostgreSQL to keep accounts.

pub mod account;

use clap::{Args, Parser, Subcommand};

/// User Account - manage back-office user accounts
#[derive(Parser)]
#[command(name = "user-account")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show one account with its department and role ids
    Show {
        #[arg(long)]
        id: i64,
    },

    /// Create an account; the password is read from the first line of stdin
    Create(CreateArgs),

    /// Update an account's fields and replace its role set
    Update(UpdateArgs),

    /// Enable an account
    Enable(ValidityArgs),

    /// Disable an account
    Disable(ValidityArgs),

    /// List accounts one page at a time
    List {
        /// Case-sensitive username fragment
        #[arg(long)]
        filter: Option<String>,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// Apply pending PostgreSQL migrations
    Migrate,
}

#[derive(Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub mobile: Option<String>,

    #[arg(long)]
    pub dept_id: Option<i64>,

    /// Comma-separated role ids
    #[arg(long, value_delimiter = ',', required = true)]
    pub roles: Vec<i64>,

    #[arg(long)]
    pub by: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[arg(long)]
    pub id: i64,

    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub mobile: Option<String>,

    #[arg(long)]
    pub dept_id: Option<i64>,

    /// Comma-separated role ids; replaces the current set
    #[arg(long, value_delimiter = ',', required = true)]
    pub roles: Vec<i64>,

    #[arg(long)]
    pub by: Option<String>,
}

#[derive(Args)]
pub struct ValidityArgs {
    #[arg(long)]
    pub id: i64,

    /// Operator recorded as the modifier
    #[arg(long, default_value = "cli")]
    pub by: String,
}
