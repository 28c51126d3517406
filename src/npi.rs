use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::common::{non_blank, truncate_for_log};
use crate::config::NppesSettings;
use crate::constants::USER_AGENT;

pub const MIN_RESULT_LIMIT: u32 = 1;
pub const MAX_RESULT_LIMIT: u32 = 200;

/// Registry query: the NPI plus an optional result limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pub number: String,
    pub limit: Option<u32>,
}

impl QueryParams {
    pub fn for_npi(npi: &str) -> Self {
        Self {
            number: npi.to_string(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit.clamp(MIN_RESULT_LIMIT, MAX_RESULT_LIMIT));
        self
    }

    fn to_query(&self, version: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![("number", self.number.clone())];
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        query.push(("version", version.to_string()));
        query
    }
}

/// Flat view of the first registry result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRecord {
    pub npi: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub addr1: Option<String>,
    pub addr2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub taxonomy: Option<String>,
}

#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// One lookup attempt. `None` covers not-found and every transport failure.
    async fn lookup(&self, params: &QueryParams) -> Option<ProviderRecord>;
}

#[derive(Debug, Deserialize)]
struct NpiApiResponse {
    #[serde(default)]
    result_count: u64,
    #[serde(default)]
    results: Vec<NpiResult>,
}

#[derive(Debug, Deserialize)]
struct NpiResult {
    basic: Option<NpiBasic>,
    #[serde(default)]
    taxonomies: Vec<NpiTaxonomy>,
    #[serde(default)]
    addresses: Vec<NpiAddress>,
}

#[derive(Debug, Deserialize)]
struct NpiBasic {
    first_name: Option<String>,
    middle_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NpiTaxonomy {
    desc: Option<String>,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
struct NpiAddress {
    address_purpose: Option<String>,
    address_1: Option<String>,
    address_2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
}

pub struct NppesClient {
    client: Client,
    base_url: String,
    version: String,
}

impl NppesClient {
    pub fn new(settings: &NppesSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .context("Failed creating NPI registry HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            version: settings.version.clone(),
        })
    }

    async fn fetch(&self, params: &QueryParams) -> Result<Option<ProviderRecord>> {
        let npi = params.number.as_str();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&params.to_query(&self.version))
            .send()
            .await
            .with_context(|| format!("NPI API request failed for {npi}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "NPI API status {} for {}. Body: {}",
                status,
                npi,
                truncate_for_log(&body)
            );
        }

        let body: NpiApiResponse = resp
            .json()
            .await
            .with_context(|| format!("Invalid NPI API JSON for {npi}"))?;
        Ok(extract_provider_record(npi, &body))
    }
}

#[async_trait]
impl ProviderRegistry for NppesClient {
    async fn lookup(&self, params: &QueryParams) -> Option<ProviderRecord> {
        match self.fetch(params).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::warn!(npi = %params.number, "NPI registry returned no results");
                None
            }
            Err(err) => {
                tracing::warn!(npi = %params.number, error = %format!("{err:#}"), "NPI registry lookup failed");
                None
            }
        }
    }
}

fn extract_provider_record(npi: &str, response: &NpiApiResponse) -> Option<ProviderRecord> {
    if response.result_count == 0 {
        return None;
    }
    let first = response.results.first()?;

    let mut record = ProviderRecord {
        npi: npi.to_string(),
        ..ProviderRecord::default()
    };

    if let Some(basic) = &first.basic {
        record.first_name = owned(basic.first_name.as_deref());
        record.middle_name = owned(basic.middle_name.as_deref());
        record.last_name = owned(basic.last_name.as_deref());
    }

    if let Some(address) = select_address(&first.addresses) {
        record.addr1 = owned(address.address_1.as_deref());
        record.addr2 = owned(address.address_2.as_deref());
        record.city = owned(address.city.as_deref());
        record.state = owned(address.state.as_deref());
        record.zip = address.postal_code.as_deref().and_then(normalize_zip);
    }

    record.taxonomy = first
        .taxonomies
        .iter()
        .find(|t| t.primary)
        .and_then(|t| owned(t.desc.as_deref()));

    Some(record)
}

/// LOCATION address first, MAILING as the fallback, nothing otherwise.
fn select_address(addresses: &[NpiAddress]) -> Option<&NpiAddress> {
    address_with_purpose(addresses, "LOCATION")
        .or_else(|| address_with_purpose(addresses, "MAILING"))
}

fn address_with_purpose<'a>(addresses: &'a [NpiAddress], purpose: &str) -> Option<&'a NpiAddress> {
    addresses.iter().find(|a| {
        a.address_purpose
            .as_deref()
            .map(|p| p.trim().eq_ignore_ascii_case(purpose))
            .unwrap_or(false)
    })
}

/// Keeps everything before the first hyphen (drops a ZIP+4 suffix).
pub fn normalize_zip(postal_code: &str) -> Option<String> {
    postal_code
        .split('-')
        .next()
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(ToOwned::to_owned)
}

fn owned(value: Option<&str>) -> Option<String> {
    non_blank(value).map(ToOwned::to_owned)
}
