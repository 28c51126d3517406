use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;

use crate::enrich::EnrichmentReport;

/// Writes one row per NPI (npi, status, detail) through a temp file.
pub fn write_report_csv(report: &EnrichmentReport, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed creating report directory {}", parent.display()))?;
    }

    let file_name = output_path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("enrichment_report.csv");
    let tmp_path = output_path.with_file_name(format!("{file_name}.tmp"));

    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating temp report {}", tmp_path.display()))?;
    writer
        .write_record(["npi", "status", "detail"])
        .context("Failed writing report header")?;
    for outcome in &report.outcomes {
        writer
            .write_record([
                outcome.npi.as_str(),
                outcome.status.label(),
                outcome.status.detail().as_str(),
            ])
            .with_context(|| format!("Failed writing report row for {}", outcome.npi))?;
    }
    writer.flush().context("Failed flushing report writer")?;

    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "Failed moving temp report {} to {}",
            tmp_path.display(),
            output_path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{NpiOutcome, NpiStatus};

    #[test]
    fn report_has_one_row_per_npi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.csv");
        let report = EnrichmentReport {
            candidates: 2,
            outcomes: vec![
                NpiOutcome {
                    npi: "1111111111".to_string(),
                    status: NpiStatus::NoParameters,
                },
                NpiOutcome {
                    npi: "2222222222".to_string(),
                    status: NpiStatus::Enriched {
                        classified: true,
                        columns: 4,
                    },
                },
            ],
            ..EnrichmentReport::default()
        };

        write_report_csv(&report, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "npi,status,detail");
        assert_eq!(
            lines[1],
            "1111111111,no_parameters,advisor returned no registry parameters"
        );
        assert_eq!(
            lines[2],
            "2222222222,enriched,columns=4 source=classification"
        );
        assert!(!path.with_file_name("run.csv.tmp").exists());
    }
}
