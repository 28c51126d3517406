use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::advisor::{Advisor, Classification, OpenAiAdvisor};
use crate::common::non_blank;
use crate::config::Settings;
use crate::contact::ContactType;
use crate::npi::{NppesClient, ProviderRecord, ProviderRegistry};
use crate::store::{DuckDbStore, FillOutcome};
use crate::table::TableName;

pub const NOTHING_TO_ENRICH: &str = "No records needed enrichment.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NpiStatus {
    Enriched { classified: bool, columns: usize },
    WriteFailed(String),
    /// Update ran but no destination row carries the NPI.
    NoDestinationRow,
    NoParameters,
    NoRegistryData,
}

impl NpiStatus {
    pub fn label(&self) -> &'static str {
        match self {
            NpiStatus::Enriched { .. } => "enriched",
            NpiStatus::WriteFailed(_) => "write_failed",
            NpiStatus::NoDestinationRow => "no_destination_row",
            NpiStatus::NoParameters => "no_parameters",
            NpiStatus::NoRegistryData => "no_registry_data",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            NpiStatus::Enriched {
                classified,
                columns,
            } => format!(
                "columns={columns} source={}",
                if *classified { "classification" } else { "fallback" }
            ),
            NpiStatus::WriteFailed(reason) => reason.clone(),
            NpiStatus::NoDestinationRow => "no destination row matched the NPI".to_string(),
            NpiStatus::NoParameters => "advisor returned no registry parameters".to_string(),
            NpiStatus::NoRegistryData => "registry returned no data".to_string(),
        }
    }

    /// Write failures still count as processed.
    fn is_processed(&self) -> bool {
        matches!(
            self,
            NpiStatus::Enriched { .. } | NpiStatus::WriteFailed(_) | NpiStatus::NoDestinationRow
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpiOutcome {
    pub npi: String,
    pub status: NpiStatus,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrichmentCounts {
    pub processed: usize,
    pub failed: usize,
    pub write_errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub candidates: usize,
    pub counts: EnrichmentCounts,
    pub outcomes: Vec<NpiOutcome>,
}

impl EnrichmentReport {
    pub fn nothing_to_do(&self) -> bool {
        self.candidates == 0
    }

    pub fn message(&self) -> String {
        if self.nothing_to_do() {
            return NOTHING_TO_ENRICH.to_string();
        }
        let mut message = format!(
            "Enrichment complete. Processed: {}, Failed: {}.",
            self.counts.processed, self.counts.failed
        );
        if self.counts.write_errors > 0 {
            message.push_str(&format!(" Write errors: {}.", self.counts.write_errors));
        }
        message
    }

    fn record(&mut self, outcome: NpiOutcome) {
        if outcome.status.is_processed() {
            self.counts.processed += 1;
        } else {
            self.counts.failed += 1;
        }
        if matches!(outcome.status, NpiStatus::WriteFailed(_)) {
            self.counts.write_errors += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Classification when available, otherwise the raw taxonomy as specialty
/// and the assistant/physician split for the contact type.
pub fn merge_classification(
    taxonomy: Option<&str>,
    classification: Option<Classification>,
) -> (Option<String>, String) {
    match classification {
        Some(c) => (Some(c.primary_specialty), c.contact_type),
        None => (
            taxonomy.map(ToOwned::to_owned),
            ContactType::fallback_for(taxonomy).as_str().to_string(),
        ),
    }
}

/// Field map handed to the store. Blank values are left out; `taxonomy`
/// rides along and is ignored by the store.
pub fn enriched_fields(
    record: &ProviderRecord,
    primary_specialty: Option<String>,
    contact_type: String,
) -> BTreeMap<String, String> {
    let entries = [
        ("first_name", record.first_name.clone()),
        ("middle_name", record.middle_name.clone()),
        ("last_name", record.last_name.clone()),
        ("addr1", record.addr1.clone()),
        ("addr2", record.addr2.clone()),
        ("city", record.city.clone()),
        ("state", record.state.clone()),
        ("zip", record.zip.clone()),
        ("taxonomy", record.taxonomy.clone()),
        ("primary_specialty", primary_specialty),
        ("contact_type", Some(contact_type)),
    ];

    entries
        .into_iter()
        .filter_map(|(key, value)| {
            let value = non_blank(value.as_deref())?.to_string();
            Some((key.to_string(), value))
        })
        .collect()
}

pub struct Enricher {
    advisor: Arc<dyn Advisor>,
    registry: Arc<dyn ProviderRegistry>,
}

impl Enricher {
    pub fn new(advisor: Arc<dyn Advisor>, registry: Arc<dyn ProviderRegistry>) -> Self {
        Self { advisor, registry }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let advisor = OpenAiAdvisor::new(&settings.openai).context("build advisor")?;
        let registry = NppesClient::new(&settings.nppes).context("build registry client")?;
        Ok(Self::new(Arc::new(advisor), Arc::new(registry)))
    }

    pub async fn run(
        &self,
        store: &mut DuckDbStore<'_>,
        source: &TableName,
        destination: &TableName,
    ) -> Result<EnrichmentReport> {
        self.run_with_progress(store, source, destination, |_, _| {})
            .await
    }

    /// Runs one batch: scan `source`, enrich each NPI in order, write into
    /// `destination`, commit once. `on_record` fires after every NPI.
    pub async fn run_with_progress<F>(
        &self,
        store: &mut DuckDbStore<'_>,
        source: &TableName,
        destination: &TableName,
        mut on_record: F,
    ) -> Result<EnrichmentReport>
    where
        F: FnMut(&NpiOutcome, Progress),
    {
        let npis = store
            .candidate_npis(source)
            .with_context(|| format!("scan {source} for enrichment candidates"))?;

        let mut report = EnrichmentReport {
            candidates: npis.len(),
            ..EnrichmentReport::default()
        };
        if npis.is_empty() {
            tracing::info!(source = %source, "No records needed enrichment");
            return Ok(report);
        }

        tracing::info!(
            source = %source,
            destination = %destination,
            candidates = npis.len(),
            "Starting enrichment batch"
        );

        store.begin_batch()?;
        let total = npis.len();
        for (idx, npi) in npis.into_iter().enumerate() {
            let status = self.enrich_one(store, destination, &npi).await?;
            let outcome = NpiOutcome { npi, status };
            on_record(
                &outcome,
                Progress {
                    done: idx + 1,
                    total,
                },
            );
            report.record(outcome);
        }
        store.commit_batch()?;

        tracing::info!(
            processed = report.counts.processed,
            failed = report.counts.failed,
            write_errors = report.counts.write_errors,
            "Enrichment batch committed"
        );
        Ok(report)
    }

    async fn enrich_one(
        &self,
        store: &mut DuckDbStore<'_>,
        destination: &TableName,
        npi: &str,
    ) -> Result<NpiStatus> {
        tracing::info!(npi = %npi, "Processing NPI");

        let Some(params) = self.advisor.query_params(npi).await else {
            tracing::warn!(npi = %npi, "Failed to get registry parameters from advisor");
            return Ok(NpiStatus::NoParameters);
        };

        let Some(record) = self.registry.lookup(&params).await else {
            tracing::warn!(npi = %npi, "Failed to get registry data");
            return Ok(NpiStatus::NoRegistryData);
        };

        tracing::debug!(npi = %record.npi, taxonomy = ?record.taxonomy, "Registry record found");

        let taxonomy = non_blank(record.taxonomy.as_deref());
        let classification = match taxonomy {
            Some(t) => self.advisor.classify(t).await,
            None => None,
        };
        let classified = classification.is_some();
        if !classified {
            tracing::debug!(npi = %npi, "Using taxonomy fallback for specialty and contact type");
        }

        let (primary_specialty, contact_type) = merge_classification(taxonomy, classification);
        let fields = enriched_fields(&record, primary_specialty, contact_type);

        Ok(match store.fill_empty(destination, npi, &fields)? {
            FillOutcome::Updated { rows: 0, .. } => {
                tracing::warn!(npi = %npi, table = %destination, "No destination row matched NPI");
                NpiStatus::NoDestinationRow
            }
            FillOutcome::Updated { columns, .. } => NpiStatus::Enriched {
                classified,
                columns,
            },
            FillOutcome::NoColumns => NpiStatus::Enriched {
                classified,
                columns: 0,
            },
            FillOutcome::Failed(reason) => NpiStatus::WriteFailed(reason),
        })
    }
}
