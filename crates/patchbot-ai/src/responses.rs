use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::{
    CompletionClient, CompletionError, CompletionRequest, CompletionResponse, CompletionUsage,
};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
/// Connection settings for an OpenAI-compatible `/responses` endpoint.
pub struct ResponsesConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
/// `CompletionClient` backed by the hosted Responses API.
pub struct ResponsesClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ResponsesClient {
    pub fn new(config: ResponsesConfig) -> Result<Self, CompletionError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                CompletionError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );
        if let Some(org) = config
            .organization
            .as_deref()
            .map(str::trim)
            .filter(|org| !org.is_empty())
        {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| {
                    CompletionError::InvalidResponse(format!("invalid organization header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint: responses_url(&config.api_base),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for ResponsesClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let body = build_request_body(&request);
        let request_id = new_request_id();
        tracing::debug!(
            request_id = %request_id,
            model = %request.model,
            input_bytes = request.input.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-patchbot-request-id", request_id)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(CompletionError::HttpStatus {
                status: status.as_u16(),
                error_code: parse_error_code(&raw),
                body: raw,
            });
        }

        parse_response(&raw)
    }
}

fn responses_url(api_base: &str) -> String {
    let base = api_base.trim().trim_end_matches('/');
    if base.ends_with("/responses") {
        return base.to_string();
    }
    format!("{base}/responses")
}

fn build_request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "input": request.input,
        "temperature": request.temperature,
    });
    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

fn parse_error_code(raw: &str) -> Option<String> {
    let parsed = serde_json::from_str::<Value>(raw).ok()?;
    let error = parsed.get("error")?;
    error
        .get("code")
        .and_then(Value::as_str)
        .or_else(|| error.get("type").and_then(Value::as_str))
        .map(ToOwned::to_owned)
}

fn parse_response(raw: &str) -> Result<CompletionResponse, CompletionError> {
    let parsed: Value = serde_json::from_str(raw)?;
    if !parsed.is_object() {
        return Err(CompletionError::InvalidResponse(
            "response body was not a JSON object".to_string(),
        ));
    }

    let usage = parsed
        .get("usage")
        .map(|usage| {
            let field = |name: &str| usage.get(name).and_then(Value::as_u64);
            let input_tokens = field("input_tokens").unwrap_or_default();
            let output_tokens = field("output_tokens").unwrap_or_default();
            CompletionUsage {
                input_tokens,
                output_tokens,
                total_tokens: field("total_tokens").unwrap_or(input_tokens + output_tokens),
            }
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        text: extract_output_text(&parsed),
        status: parsed
            .get("status")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        usage,
    })
}

/// Reduces a Responses API envelope to one text payload.
///
/// Prefers the top-level `output_text` string; otherwise concatenates every
/// string `text` of every content block of every `output` item. Returns an
/// empty string when neither shape is present.
pub fn extract_output_text(envelope: &Value) -> String {
    if let Some(text) = envelope.get("output_text").and_then(Value::as_str) {
        return text.trim().to_string();
    }

    let Some(items) = envelope.get("output").and_then(Value::as_array) else {
        return String::new();
    };
    items
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<String>()
        .trim()
        .to_string()
}

fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("patchbot-{millis}-{count}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        build_request_body, extract_output_text, new_request_id, parse_error_code,
        parse_response, responses_url,
    };
    use crate::CompletionRequest;

    #[test]
    fn unit_responses_url_appends_endpoint_once() {
        assert_eq!(
            responses_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/responses"
        );
        assert_eq!(
            responses_url("https://proxy.local/v1/responses"),
            "https://proxy.local/v1/responses"
        );
    }

    #[test]
    fn unit_build_request_body_includes_response_format_only_in_json_mode() {
        let mut request = CompletionRequest {
            model: "gpt-4.1-mini".to_string(),
            input: "prompt".to_string(),
            temperature: 0.0,
            json_mode: true,
        };
        let body = build_request_body(&request);
        assert_eq!(body["model"], "gpt-4.1-mini");
        assert_eq!(body["input"], "prompt");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");

        request.json_mode = false;
        let body = build_request_body(&request);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn functional_extract_output_text_prefers_output_text_field() {
        let envelope = json!({
            "output_text": "  {\"files\": []}\n",
            "output": [{"content": [{"type": "output_text", "text": "ignored"}]}]
        });
        assert_eq!(extract_output_text(&envelope), "{\"files\": []}");
    }

    #[test]
    fn functional_extract_output_text_joins_output_blocks() {
        let envelope = json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "diff --git a/x b/x\n"},
                    {"type": "output_text", "text": "--- a/x\n+++ b/x\n"}
                ]},
                {"type": "message", "content": [{"type": "refusal", "refusal": "no"}]}
            ]
        });
        assert_eq!(
            extract_output_text(&envelope),
            "diff --git a/x b/x\n--- a/x\n+++ b/x"
        );
    }

    #[test]
    fn regression_extract_output_text_returns_empty_for_unknown_shapes() {
        assert_eq!(extract_output_text(&json!({"id": "resp_1"})), "");
        assert_eq!(extract_output_text(&json!({"output_text": 12})), "");
    }

    #[test]
    fn unit_parse_error_code_reads_code_then_type() {
        assert_eq!(
            parse_error_code(r#"{"error":{"code":"insufficient_quota","type":"x"}}"#).as_deref(),
            Some("insufficient_quota")
        );
        assert_eq!(
            parse_error_code(r#"{"error":{"type":"insufficient_quota"}}"#).as_deref(),
            Some("insufficient_quota")
        );
        assert_eq!(parse_error_code("not json"), None);
    }

    #[test]
    fn functional_parse_response_reads_usage_and_status() {
        let parsed = parse_response(
            r#"{"status":"completed","output_text":"ok","usage":{"input_tokens":4,"output_tokens":2}}"#,
        )
        .expect("parse");
        assert_eq!(parsed.text, "ok");
        assert_eq!(parsed.status.as_deref(), Some("completed"));
        assert_eq!(parsed.usage.total_tokens, 6);
    }

    #[test]
    fn regression_parse_response_rejects_non_object_payloads() {
        assert!(parse_response("[1,2,3]").is_err());
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn unit_request_ids_are_unique() {
        let first = new_request_id();
        let second = new_request_id();
        assert_ne!(first, second);
        assert!(first.starts_with("patchbot-"));
    }
}
