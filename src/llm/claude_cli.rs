//! Claude CLI連携
//!
//! 画像は呼び出しごとの一時フォルダに書き出してパスをプロンプトに含める（終了時に削除）。
//! CLIはレスポンスIDを返さないため会話の継続はしない。

use super::{LlmClient, LlmRequest, LlmResponse};
use crate::error::{WizardError, Result};
use async_trait::async_trait;
use base64::Engine;
use inspection_wizard_common::image::split_data_url;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct ClaudeCliClient;

impl ClaudeCliClient {
    pub fn new() -> Self {
        Self
    }
}

/// 呼び出しごとの一時フォルダ（drop で削除）
fn call_temp_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("inspection-wizard-").tempdir()?)
}

/// Data URLを一時ファイルに書き出す
fn write_images(images: &[String], temp_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut local_paths = Vec::new();

    for (i, data_url) in images.iter().enumerate() {
        let Some((mime, data)) = split_data_url(data_url) else {
            warn!(index = i, "Data URLではない画像をスキップ");
            continue;
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| WizardError::Llm(format!("画像デコードエラー: {}", e)))?;
        let ext = mime.rsplit('/').next().unwrap_or("jpg");
        let dest = temp_dir.join(format!("image-{}.{}", i + 1, ext));
        std::fs::write(&dest, bytes)?;
        local_paths.push(std::fs::canonicalize(&dest)?);
    }

    Ok(local_paths)
}

fn build_cli_prompt(prompt: &str, image_paths: &[PathBuf]) -> String {
    if image_paths.is_empty() {
        return prompt.to_string();
    }
    let image_list = image_paths
        .iter()
        .map(|p| p.display().to_string().replace('\\', "/"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Read the following image files and analyze them: {}\n\n{}", image_list, prompt)
}

#[async_trait]
impl LlmClient for ClaudeCliClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let temp_dir = if request.images.is_empty() {
            None
        } else {
            Some(call_temp_dir()?)
        };
        let image_paths = match &temp_dir {
            Some(dir) => write_images(&request.images, dir.path())?,
            None => Vec::new(),
        };
        let full_prompt = build_cli_prompt(&request.prompt, &image_paths);
        debug!(prompt_len = full_prompt.len(), "Claude CLI呼び出し");

        // Windowsではcmd /c経由
        #[cfg(windows)]
        let output = Command::new("cmd")
            .args(["/c", "claude", "-p", full_prompt.as_str(), "--output-format", "text"])
            .output()
            .await;

        #[cfg(not(windows))]
        let output = Command::new("claude")
            .args(["-p", full_prompt.as_str(), "--output-format", "text"])
            .output()
            .await;

        let output = output.map_err(|e| WizardError::Llm(format!("Claude CLI実行エラー: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WizardError::Llm(format!(
                "Claude CLI failed (code {:?}): {}",
                output.status.code(),
                stderr
            )));
        }

        Ok(LlmResponse {
            text: String::from_utf8_lossy(&output.stdout).to_string(),
            response_id: None,
        })
    }
}
