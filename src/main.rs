mod advisor;
mod batch;
mod cli;
mod common;
mod config;
mod constants;
mod contact;
mod enrich;
#[cfg(test)]
mod fakes;
mod npi;
mod report;
mod server;
mod store;
mod table;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Run(cmd) => batch::run(cmd).await.context("run failed"),
    }
}
