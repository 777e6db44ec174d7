//! Responses API クライアント
//!
//! `previous_response_id` で前回の会話を引き継ぐ

use super::{LlmClient, LlmRequest, LlmResponse};
use crate::error::{WizardError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: Vec<InputPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputPart<'a> {
    InputText { text: &'a str },
    InputImage { image_url: &'a str },
}

#[derive(Deserialize)]
struct ResponsesResponse {
    id: Option<String>,
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ResponsesResponse {
    fn text(&self) -> Option<String> {
        if let Some(text) = self.output_text.as_ref().filter(|t| !t.is_empty()) {
            return Some(text.clone());
        }
        let joined = self
            .output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        (!joined.is_empty()).then_some(joined)
    }
}

#[derive(Debug, Clone)]
pub struct ResponsesApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ResponsesApiClient {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn build_body(request: &LlmRequest) -> ResponsesRequest<'_> {
    let mut content = vec![InputPart::InputText {
        text: &request.prompt,
    }];
    content.extend(
        request
            .images
            .iter()
            .map(|url| InputPart::InputImage { image_url: url }),
    );

    ResponsesRequest {
        model: &request.model,
        input: vec![InputMessage {
            role: "user",
            content,
        }],
        previous_response_id: request.previous_response_id.as_deref(),
    }
}

#[async_trait]
impl LlmClient for ResponsesApiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = build_body(&request);
        debug!(
            prompt_len = request.prompt.len(),
            images = request.images.len(),
            chained = request.previous_response_id.is_some(),
            "LLMリクエスト"
        );

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WizardError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WizardError::Llm(format!("API error {}: {}", status, text)));
        }

        let parsed: ResponsesResponse = response
            .json()
            .await
            .map_err(|e| WizardError::Llm(format!("レスポンス解析エラー: {}", e)))?;

        let text = parsed
            .text()
            .ok_or_else(|| WizardError::Llm("Empty response".into()))?;

        Ok(LlmResponse {
            text,
            response_id: parsed.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_body() {
        let request = LlmRequest {
            prompt: "Assess".into(),
            model: "gpt-4.1".into(),
            images: vec!["data:image/png;base64,AA".into()],
            previous_response_id: Some("resp_1".into()),
        };
        let json = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(json["model"], "gpt-4.1");
        assert_eq!(json["previous_response_id"], "resp_1");
        assert_eq!(json["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(json["input"][0]["content"][1]["type"], "input_image");
        assert_eq!(json["input"][0]["content"][1]["image_url"], "data:image/png;base64,AA");
    }

    #[test]
    fn test_build_body_without_previous() {
        let request = LlmRequest {
            prompt: "Assess".into(),
            model: "m".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(build_body(&request)).unwrap();
        assert!(json.get("previous_response_id").is_none());
    }

    #[test]
    fn test_response_text_from_output() {
        let response: ResponsesResponse = serde_json::from_str(
            r#"{"id": "resp_2", "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [{"type": "output_text", "text": "{\"report\": \"ok\"}"}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"report\": \"ok\"}"));
        assert_eq!(response.id.as_deref(), Some("resp_2"));
    }

    #[test]
    fn test_response_text_empty() {
        let response: ResponsesResponse = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(response.text().is_none());
    }
}
