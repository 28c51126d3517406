pub const DEFAULT_NPI_API_BASE_URL: &str = "https://npiregistry.cms.hhs.gov/api/";
pub const DEFAULT_NPI_API_VERSION: &str = "2.1";
pub const DEFAULT_NPI_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const PARAMS_TEMPERATURE: f64 = 0.0;
pub const CLASSIFY_TEMPERATURE: f64 = 0.2;

pub const USER_AGENT: &str = "hcp-enricher/0.1";
