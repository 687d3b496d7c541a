//! Anthropic Messages API oracle (non-streaming).

use crate::oracle::{
    ChatMessage, ContentBlock, Oracle, OracleFailure, OracleRequest, OracleResponse, StopReason,
};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Blocking HTTP client for the Anthropic Messages API.
pub struct AnthropicOracle {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl AnthropicOracle {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        AnthropicOracle {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build from `ANTHROPIC_API_KEY`.
    ///
    /// # Errors
    ///
    /// Fails when the environment variable is unset.
    pub fn from_env(model: impl Into<String>) -> Result<Self, OracleFailure> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| OracleFailure("ANTHROPIC_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, model))
    }

    /// Point the client at a different endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn parse_stop_reason(raw: Option<&str>) -> StopReason {
        match raw {
            Some("tool_use") => StopReason::ToolUse,
            Some("end_turn") => StopReason::EndTurn,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::Other,
        }
    }
}

impl Oracle for AnthropicOracle {
    fn call(&self, request: OracleRequest<'_>) -> Result<OracleResponse, OracleFailure> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": request.messages,
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::Value::String(request.system.to_string());
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::to_value(request.tools)
                .map_err(|e| OracleFailure(format!("failed to encode tools: {e}")))?;
        }

        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| OracleFailure(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| OracleFailure(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(OracleFailure(format!("backend returned {status}: {detail}")));
        }

        let parsed: ApiResponse = serde_json::from_str(&text)
            .map_err(|e| OracleFailure(format!("malformed response: {e}")))?;

        Ok(OracleResponse {
            stop_reason: Self::parse_stop_reason(parsed.stop_reason.as_deref()),
            content: parsed.content,
        })
    }
}
