//! In-process stand-ins for the reasoning service and the registry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::advisor::{Advisor, Classification};
use crate::npi::{ProviderRecord, ProviderRegistry, QueryParams};

pub fn classification(specialty: &str, contact_type: &str) -> Classification {
    Classification {
        primary_specialty: specialty.to_string(),
        contact_type: contact_type.to_string(),
    }
}

pub fn record(npi: &str, taxonomy: Option<&str>) -> ProviderRecord {
    ProviderRecord {
        npi: npi.to_string(),
        first_name: Some("JANE".to_string()),
        middle_name: Some("Q".to_string()),
        last_name: Some("DOE".to_string()),
        addr1: Some("1 Main St".to_string()),
        addr2: None,
        city: Some("Albany".to_string()),
        state: Some("NY".to_string()),
        zip: Some("10001".to_string()),
        taxonomy: taxonomy.map(ToOwned::to_owned),
    }
}

/// Answers parameter requests only for registered NPIs and classifies only
/// registered taxonomies.
#[derive(Default)]
pub struct FakeAdvisor {
    params: HashMap<String, QueryParams>,
    classifications: HashMap<String, Classification>,
    param_requests: AtomicUsize,
    classify_requests: AtomicUsize,
}

impl FakeAdvisor {
    pub fn with_params_for(mut self, npi: &str) -> Self {
        self.params
            .insert(npi.to_string(), QueryParams::for_npi(npi));
        self
    }

    pub fn with_classification(mut self, taxonomy: &str, c: Classification) -> Self {
        self.classifications.insert(taxonomy.to_string(), c);
        self
    }

    pub fn param_requests(&self) -> usize {
        self.param_requests.load(Ordering::SeqCst)
    }

    pub fn classifications(&self) -> usize {
        self.classify_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Advisor for FakeAdvisor {
    async fn query_params(&self, npi: &str) -> Option<QueryParams> {
        self.param_requests.fetch_add(1, Ordering::SeqCst);
        self.params.get(npi).cloned()
    }

    async fn classify(&self, taxonomy: &str) -> Option<Classification> {
        self.classify_requests.fetch_add(1, Ordering::SeqCst);
        self.classifications.get(taxonomy).cloned()
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    records: HashMap<String, ProviderRecord>,
    seen: Mutex<Vec<QueryParams>>,
}

impl FakeRegistry {
    pub fn with_record(mut self, record: ProviderRecord) -> Self {
        self.records.insert(record.npi.clone(), record);
        self
    }

    pub fn lookups(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ProviderRegistry for FakeRegistry {
    async fn lookup(&self, params: &QueryParams) -> Option<ProviderRecord> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(params.clone());
        }
        self.records.get(&params.number).cloned()
    }
}
