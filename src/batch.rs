use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::RunArgs;
use crate::config::Settings;
use crate::enrich::Enricher;
use crate::report::write_report_csv;
use crate::store::{DuckDbStore, open_database};
use crate::table::TableName;

pub async fn run(cmd: RunArgs) -> Result<()> {
    let settings = Settings::from_args(&cmd.settings)?;
    let source = TableName::parse_allowed(&cmd.source_table, &settings.allowed_tables)
        .context("source table")?;
    let destination = TableName::parse_allowed(&cmd.destination_table, &settings.allowed_tables)
        .context("destination table")?;

    let enricher = Enricher::from_settings(&settings)?;
    let mut conn = open_database(&settings.db_path)?;
    let mut store = DuckDbStore::new(&mut conn);

    let progress = ProgressBar::no_length();
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [NPI {elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }
    progress.set_message("scanning");

    let report = enricher
        .run_with_progress(&mut store, &source, &destination, |outcome, p| {
            progress.set_length(p.total as u64);
            progress.set_position(p.done as u64);
            progress.set_message(format!("{} {}", outcome.npi, outcome.status.label()));
        })
        .await?;

    progress.finish_with_message(report.message());
    println!("{}", report.message());

    if let Some(path) = &cmd.report_csv {
        write_report_csv(&report, path)?;
        println!("Wrote report {}", path.display());
    }
    Ok(())
}
