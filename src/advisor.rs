//! Reasoning-service calls: registry parameters from an NPI (forced tool
//! call) and specialty/contact-type classification of a taxonomy (JSON mode).

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::common::truncate_for_log;
use crate::config::OpenAiSettings;
use crate::constants::{CLASSIFY_TEMPERATURE, PARAMS_TEMPERATURE, USER_AGENT};
use crate::contact::ContactType;
use crate::npi::QueryParams;

pub const BUILD_QUERY_TOOL: &str = "build_nppes_query";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Classification {
    pub primary_specialty: String,
    pub contact_type: String,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    /// Registry parameters for `npi`, or `None` when the service did not
    /// produce exactly one well-formed tool invocation.
    async fn query_params(&self, npi: &str) -> Option<QueryParams>;

    /// Specialty and contact type for a non-empty taxonomy description.
    async fn classify(&self, taxonomy: &str) -> Option<Classification>;
}

/// How a chat completion answered the forced tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    Single(QueryParams),
    Malformed(String),
    Absent,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct BuildQueryArgs {
    number: NumberArg,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberArg {
    Text(String),
    Integer(u64),
}

pub struct OpenAiAdvisor {
    client: Client,
    completions_url: String,
    api_key: String,
    model: String,
}

impl OpenAiAdvisor {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("Failed creating reasoning service HTTP client")?;
        Ok(Self {
            client,
            completions_url: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    async fn complete(&self, body: &Value) -> Result<ChatMessage> {
        let resp = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("Chat completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "Chat completion status {}. Body: {}",
                status,
                truncate_for_log(&text)
            );
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .context("Invalid chat completion JSON")?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("Chat completion returned no choices"))
    }

    fn params_request(&self, npi: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": PARAMS_TEMPERATURE,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a helpful assistant that uses tools to answer questions about healthcare providers."
                },
                {
                    "role": "user",
                    "content": format!("Please retrieve the details for the provider with NPI {npi}.")
                }
            ],
            "tools": [build_query_tool_spec()],
            "tool_choice": {"type": "function", "function": {"name": BUILD_QUERY_TOOL}},
        })
    }

    fn classify_request(&self, taxonomy: &str) -> Value {
        let prompt = format!(
            "Given the healthcare provider taxonomy description \"{taxonomy}\", determine the \
             primary specialty and contact type. The contact type must be one of these options: \
             {}. Please return a JSON object with two keys: 'primary_specialty' and 'contact_type'.",
            ContactType::prompt_list()
        );
        json!({
            "model": self.model,
            "temperature": CLASSIFY_TEMPERATURE,
            "response_format": {"type": "json_object"},
            "messages": [
                {
                    "role": "system",
                    "content": "You are a helpful assistant that returns data in JSON format."
                },
                {"role": "user", "content": prompt}
            ],
        })
    }
}

#[async_trait]
impl Advisor for OpenAiAdvisor {
    async fn query_params(&self, npi: &str) -> Option<QueryParams> {
        let message = match self.complete(&self.params_request(npi)).await {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(npi = %npi, error = %format!("{err:#}"), "Parameter generation failed");
                return None;
            }
        };

        match interpret_tool_calls(&message) {
            ToolInvocation::Single(params) => {
                if params.number != npi {
                    tracing::warn!(npi = %npi, number = %params.number, "Tool call targets a different number");
                }
                Some(params)
            }
            ToolInvocation::Malformed(reason) => {
                tracing::warn!(npi = %npi, reason = %reason, "Malformed tool call");
                None
            }
            ToolInvocation::Absent => {
                tracing::warn!(npi = %npi, "Reasoning service did not return the expected tool call");
                None
            }
        }
    }

    async fn classify(&self, taxonomy: &str) -> Option<Classification> {
        let taxonomy = taxonomy.trim();
        if taxonomy.is_empty() {
            return None;
        }

        let parsed = match self.complete(&self.classify_request(taxonomy)).await {
            Ok(message) => parse_classification(message.content.as_deref()),
            Err(err) => Err(err),
        };
        match parsed {
            Ok(classification) => {
                if classification.contact_type.parse::<ContactType>().is_err() {
                    tracing::debug!(
                        taxonomy = %taxonomy,
                        contact_type = %classification.contact_type,
                        "Classification returned a contact type outside the known list"
                    );
                }
                Some(classification)
            }
            Err(err) => {
                tracing::warn!(taxonomy = %taxonomy, error = %format!("{err:#}"), "Classification failed");
                None
            }
        }
    }
}

pub fn build_query_tool_spec() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": BUILD_QUERY_TOOL,
            "description": "Translate a provider search request into NPPES API parameters.",
            "parameters": {
                "type": "object",
                "properties": {
                    "number": {
                        "type": "string",
                        "description": "The 10-digit National Provider Identifier (NPI)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Number of results to return, 1-200"
                    }
                },
                "required": ["number"]
            }
        }
    })
}

fn interpret_tool_calls(message: &ChatMessage) -> ToolInvocation {
    let calls = message.tool_calls.as_deref().unwrap_or_default();
    let call = match calls {
        [] => return ToolInvocation::Absent,
        [call] => call,
        _ => {
            return ToolInvocation::Malformed(format!(
                "expected exactly one tool call, got {}",
                calls.len()
            ));
        }
    };

    if call.function.name != BUILD_QUERY_TOOL {
        return ToolInvocation::Malformed(format!("unexpected tool {:?}", call.function.name));
    }

    let args: BuildQueryArgs = match serde_json::from_str(&call.function.arguments) {
        Ok(a) => a,
        Err(err) => {
            return ToolInvocation::Malformed(format!(
                "invalid arguments {}: {err}",
                truncate_for_log(&call.function.arguments)
            ));
        }
    };

    let number = match args.number {
        NumberArg::Text(s) => s.trim().to_string(),
        NumberArg::Integer(n) => n.to_string(),
    };
    if number.is_empty() {
        return ToolInvocation::Malformed("empty number argument".to_string());
    }

    let mut params = QueryParams::for_npi(&number);
    if let Some(limit) = args.limit {
        params = params.with_limit(limit.clamp(0, i64::from(u32::MAX)) as u32);
    }
    ToolInvocation::Single(params)
}

fn parse_classification(content: Option<&str>) -> Result<Classification> {
    let content = content
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .context("Classification response has no content")?;
    serde_json::from_str(content)
        .with_context(|| format!("Invalid classification JSON: {}", truncate_for_log(content)))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn message(body: Value) -> ChatMessage {
        serde_json::from_value(body).unwrap()
    }

    fn tool_call(name: &str, arguments: &str) -> Value {
        json!({
            "id": "call_1",
            "type": "function",
            "function": {"name": name, "arguments": arguments}
        })
    }

    #[test]
    fn single_well_formed_call_yields_params() {
        let msg = message(json!({
            "content": null,
            "tool_calls": [tool_call(BUILD_QUERY_TOOL, r#"{"number": "2222222222", "limit": 5}"#)]
        }));
        assert_eq!(
            interpret_tool_calls(&msg),
            ToolInvocation::Single(QueryParams::for_npi("2222222222").with_limit(5))
        );
    }

    #[test]
    fn numeric_number_and_out_of_range_limit_are_normalized() {
        let msg = message(json!({
            "tool_calls": [tool_call(BUILD_QUERY_TOOL, r#"{"number": 2222222222, "limit": 900}"#)]
        }));
        assert_eq!(
            interpret_tool_calls(&msg),
            ToolInvocation::Single(QueryParams::for_npi("2222222222").with_limit(200))
        );

        let msg = message(json!({
            "tool_calls": [tool_call(BUILD_QUERY_TOOL, r#"{"number": "2222222222", "limit": -3}"#)]
        }));
        assert_eq!(
            interpret_tool_calls(&msg),
            ToolInvocation::Single(QueryParams::for_npi("2222222222").with_limit(1))
        );
    }

    #[test]
    fn missing_tool_calls_are_absent() {
        assert_eq!(
            interpret_tool_calls(&message(json!({"content": "NPI 1111111111 is..."}))),
            ToolInvocation::Absent
        );
        assert_eq!(
            interpret_tool_calls(&message(json!({"content": null, "tool_calls": null}))),
            ToolInvocation::Absent
        );
        assert_eq!(
            interpret_tool_calls(&message(json!({"tool_calls": []}))),
            ToolInvocation::Absent
        );
    }

    #[test]
    fn bad_calls_are_malformed() {
        let cases = [
            json!({"tool_calls": [tool_call(BUILD_QUERY_TOOL, "{not json")]}),
            json!({"tool_calls": [tool_call(BUILD_QUERY_TOOL, r#"{"limit": 3}"#)]}),
            json!({"tool_calls": [tool_call(BUILD_QUERY_TOOL, r#"{"number": "  "}"#)]}),
            json!({"tool_calls": [tool_call("search_web", r#"{"number": "1"}"#)]}),
            json!({"tool_calls": [
                tool_call(BUILD_QUERY_TOOL, r#"{"number": "1"}"#),
                tool_call(BUILD_QUERY_TOOL, r#"{"number": "2"}"#)
            ]}),
        ];
        for case in cases {
            assert!(
                matches!(interpret_tool_calls(&message(case.clone())), ToolInvocation::Malformed(_)),
                "{case}"
            );
        }
    }

    #[test]
    fn classification_requires_both_keys() {
        let ok = parse_classification(Some(
            r#"{"primary_specialty": "Family Practice", "contact_type": "Nurse Practitioner"}"#,
        ))
        .unwrap();
        assert_eq!(ok.primary_specialty, "Family Practice");
        assert_eq!(ok.contact_type, "Nurse Practitioner");

        assert!(parse_classification(Some(r#"{"primary_specialty": "Family Practice"}"#)).is_err());
        assert!(parse_classification(Some("Family Practice")).is_err());
        assert!(parse_classification(None).is_err());
    }

    #[test]
    fn classification_passes_unknown_contact_type_through() {
        let parsed = parse_classification(Some(
            r#"{"primary_specialty": "Dentistry", "contact_type": "Dentist"}"#,
        ))
        .unwrap();
        assert_eq!(parsed.contact_type, "Dentist");
    }

    fn advisor_for(server: &MockServer) -> OpenAiAdvisor {
        OpenAiAdvisor::new(&OpenAiSettings {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1/", server.uri()),
            model: "gpt-4o-mini".to_string(),
            timeout: None,
        })
        .unwrap()
    }

    fn completion(message: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": message, "finish_reason": "stop"}]
        }))
    }

    #[tokio::test]
    async fn query_params_forces_the_build_query_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "tool_choice": {"type": "function", "function": {"name": BUILD_QUERY_TOOL}}
            })))
            .respond_with(completion(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [tool_call(BUILD_QUERY_TOOL, r#"{"number": "2222222222"}"#)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let params = advisor_for(&server).query_params("2222222222").await;
        assert_eq!(params, Some(QueryParams::for_npi("2222222222")));
    }

    #[tokio::test]
    async fn query_params_transport_error_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        assert_eq!(advisor_for(&server).query_params("1111111111").await, None);
    }

    #[tokio::test]
    async fn classify_uses_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
            .respond_with(completion(json!({
                "role": "assistant",
                "content": "{\"primary_specialty\": \"Family Practice\", \"contact_type\": \"Nurse Practitioner\"}"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let classification = advisor_for(&server).classify("Nurse Practitioner").await;
        assert_eq!(
            classification,
            Some(Classification {
                primary_specialty: "Family Practice".to_string(),
                contact_type: "Nurse Practitioner".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn classify_skips_blank_taxonomy_without_calling_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(advisor_for(&server).classify("   ").await, None);
    }

    #[tokio::test]
    async fn classify_malformed_content_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(json!({"role": "assistant", "content": "Family Practice"})))
            .mount(&server)
            .await;

        assert_eq!(advisor_for(&server).classify("Family Medicine").await, None);
    }
}
