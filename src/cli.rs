use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::SettingsArgs;

#[derive(Parser, Debug)]
#[command(name = "hcp-enricher")]
#[command(about = "Fill empty HCP fields from the NPI registry with AI-assisted classification", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP trigger (POST /enrich/by_npi).
    Serve(ServeArgs),
    /// Enrich one source/destination table pair and exit.
    Run(RunArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Table scanned for rows with empty tracked fields.
    #[arg(long)]
    pub source_table: String,

    /// Table receiving the fill-if-null updates.
    #[arg(long)]
    pub destination_table: String,

    /// Optional per-NPI outcome report (CSV).
    #[arg(long)]
    pub report_csv: Option<PathBuf>,
}
