//! Google Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::engine::{EngineRequest, EngineResponse, ExtractionEngine};
use crate::error::{AutoTallyError, EngineError, Result};
use crate::models::config::EngineConfig;
use crate::models::document::ExtractionUnit;

/// Extraction engine backed by the Gemini REST API.
pub struct GeminiEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiEngine {
    pub fn new(config: &EngineConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AutoTallyError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.api_base.trim_end_matches('/'),
                config.model
            ),
            api_key: api_key.into(),
        })
    }

    /// Read the API key from the environment variable named in the config.
    pub fn from_env(config: &EngineConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AutoTallyError::Config(format!(
                    "extraction engine API key not set (export {})",
                    config.api_key_env
                ))
            })?;
        Self::new(config, api_key)
    }
}

#[async_trait]
impl ExtractionEngine for GeminiEngine {
    async fn generate(&self, request: EngineRequest<'_>) -> std::result::Result<EngineResponse, EngineError> {
        let body = build_request_body(&request);
        debug!("POST {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Transient("request timed out".to_string())
                } else if e.is_connect() {
                    EngineError::Transient(format!("cannot reach extraction engine: {}", e))
                } else {
                    EngineError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EngineError::Transient(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let err = classify_failure(status.as_u16(), &text);
            warn!("Extraction engine returned {}: {}", status, err);
            return Err(err);
        }

        parse_generate_response(&text)
    }
}

/// JSON body for one `generateContent` call.
fn build_request_body(request: &EngineRequest<'_>) -> Value {
    let mut parts: Vec<Value> = match request.content {
        ExtractionUnit::Text { content, .. } => vec![json!({ "text": content })],
        ExtractionUnit::Images(pages) => pages
            .iter()
            .map(|page| {
                json!({
                    "inlineData": {
                        "mimeType": page.mime_type,
                        "data": STANDARD.encode(&page.data),
                    }
                })
            })
            .collect(),
    };
    parts.push(json!({ "text": request.prompt }));

    json!({
        "systemInstruction": { "parts": [{ "text": request.instructions }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.output_schema,
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn parse_generate_response(body: &str) -> std::result::Result<EngineResponse, EngineError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| EngineError::InvalidResponse(e.to_string()))?;

    let token_usage = parsed.usage_metadata.and_then(|u| u.total_token_count);

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(EngineError::InvalidResponse(format!("empty response: {}", reason)));
    };

    let raw_text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if raw_text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(EngineError::InvalidResponse(format!(
            "candidate has no text (finish reason {})",
            reason
        )));
    }

    Ok(EngineResponse {
        raw_text,
        token_usage,
        classification_hint: None,
    })
}

/// Map an unsuccessful HTTP status to an engine error.
fn classify_failure(status: u16, body: &str) -> EngineError {
    let detail: String = body.chars().take(300).collect();
    if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
        EngineError::UpstreamQuotaExceeded(detail)
    } else if status >= 500 || status == 408 {
        EngineError::Transient(format!("HTTP {}: {}", status, detail))
    } else {
        EngineError::InvalidResponse(format!("HTTP {}: {}", status, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::PageImage;

    #[test]
    fn test_text_request_body() {
        let schema = json!({"type": "OBJECT"});
        let unit = ExtractionUnit::text("Tax Invoice".to_string());
        let body = build_request_body(&EngineRequest {
            instructions: "system",
            prompt: "extract",
            content: &unit,
            output_schema: &schema,
        });

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "system");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Tax Invoice");
        assert_eq!(body["contents"][0]["parts"][1]["text"], "extract");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"], schema);
    }

    #[test]
    fn test_image_request_body() {
        let schema = json!({});
        let unit = ExtractionUnit::Images(vec![PageImage {
            page: 1,
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
            width: 1,
            height: 1,
            dpi: Some(150),
        }]);
        let body = build_request_body(&EngineRequest {
            instructions: "system",
            prompt: "extract",
            content: &unit,
            output_schema: &schema,
        });

        let inline = &body["contents"][0]["parts"][0]["inlineData"];
        assert_eq!(inline["mimeType"], "image/png");
        assert_eq!(inline["data"], "AQID");
    }

    #[test]
    fn test_parse_generate_response() {
        let response = parse_generate_response(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"documentType\":"},{"text":"\"INVALID\"}"}]},"finishReason":"STOP"}],
                "usageMetadata":{"promptTokenCount":900,"candidatesTokenCount":34,"totalTokenCount":934}}"#,
        )
        .unwrap();
        assert_eq!(response.raw_text, r#"{"documentType":"INVALID"}"#);
        assert_eq!(response.token_usage, Some(934));
    }

    #[test]
    fn test_blocked_prompt_is_invalid_response() {
        let err = parse_generate_response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidResponse(msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(429, "{}"),
            EngineError::UpstreamQuotaExceeded(_)
        ));
        assert!(matches!(
            classify_failure(403, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#),
            EngineError::UpstreamQuotaExceeded(_)
        ));
        assert!(matches!(classify_failure(503, ""), EngineError::Transient(_)));
        assert!(matches!(classify_failure(400, "bad"), EngineError::InvalidResponse(_)));
    }

    #[test]
    fn test_missing_api_key() {
        let config = EngineConfig {
            api_key_env: "AUTOTALLY_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            GeminiEngine::from_env(&config),
            Err(AutoTallyError::Config(_))
        ));
    }
}
