//! LLM連携モジュール
//!
//! プロンプト・モデル・画像（Data URL）・前回レスポンスIDを送り、
//! テキストと次回に引き継ぐレスポンスIDを受け取る。

mod claude_cli;
mod responses_api;

pub use claude_cli::ClaudeCliClient;
pub use responses_api::ResponsesApiClient;

use crate::ai_provider::AiProvider;
use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;

/// LLMリクエスト
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,
    /// Data URL形式の画像（Durable参照から変換したもの）
    pub images: Vec<String>,
    pub previous_response_id: Option<String>,
}

/// LLMレスポンス
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub response_id: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
}

/// 設定からクライアントを生成
pub fn client_from_config(config: &Config) -> Result<Box<dyn LlmClient>> {
    match config.ai_provider {
        AiProvider::Responses => Ok(Box::new(ResponsesApiClient::new(
            &config.llm_base_url,
            config.get_api_key()?,
            config.timeout(),
        )?)),
        AiProvider::ClaudeCli => Ok(Box::new(ClaudeCliClient::new())),
    }
}
