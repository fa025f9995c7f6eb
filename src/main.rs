use clap::Parser;
use user_account_core::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::account::run(cli.command).await
}
