//! AI解析
//!
//! 現在のセクションの入力・音声メモ・保存済み画像をLLMに送り、
//! `{report, suggestions}` を受け取ってウィザード状態に記録する。
//!
//! 画像は保存済み（Durable）のものだけをBase64のData URLに変換して送る。
//! 中断フラグは await のたびに確認する。

use crate::controller::WizardController;
use crate::error::{WizardError, Result};
use crate::llm::{LlmClient, LlmRequest};
use crate::store::ContentStore;
use base64::Engine;
use inspection_wizard_common::{
    build_analysis_prompt, parse_analysis_response, retain_durable, strip_transient_fields,
    AnalysisOutput, ImageRef, SectionData,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// 中断フラグ
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(WizardError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// 保存済み画像をLLM用のData URLに変換
///
/// 未保存の画像は対象外。取得に失敗した画像は警告してスキップする
pub async fn images_for_llm(
    content: &dyn ContentStore,
    images: &[ImageRef],
    cancel: &CancellationFlag,
) -> Result<Vec<String>> {
    let mut data_urls = Vec::new();

    for image in retain_durable(images) {
        let fetched = content.fetch(&image).await;
        cancel.check()?;

        match fetched {
            Ok(bytes) => {
                let mime = guess_mime(image.locator());
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                data_urls.push(format!("data:{};base64,{}", mime, encoded));
            }
            Err(e) => warn!(locator = image.locator(), "画像の取得に失敗: {}", e),
        }
    }

    Ok(data_urls)
}

fn guess_mime(locator: &str) -> &'static str {
    let lower = locator.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

/// 現在のセクションをAI解析
///
/// JSONとして読めないレスポンスは全文をレポートとして扱い、提案は空にする
pub async fn analyze_current_section(
    controller: &WizardController,
    llm: &dyn LlmClient,
    model: &str,
    cancel: &CancellationFlag,
) -> Result<AnalysisOutput> {
    let index = controller.current_section().ok_or(WizardError::NoSections)?;
    let data = controller.snapshot();
    let section = &controller.sections()[index];
    let section_data = data
        .sections
        .get(index)
        .map(SectionData::without_transient)
        .unwrap_or_default();
    let form = strip_transient_fields(&controller.form_data());

    let images = match controller.content_store() {
        Some(content) => images_for_llm(content.as_ref(), &section_data.images, cancel).await?,
        None => Vec::new(),
    };

    let prompt = build_analysis_prompt(section, &section_data, &form);
    let response = llm
        .complete(LlmRequest {
            prompt,
            model: model.to_string(),
            images,
            previous_response_id: data.analysis.response_id.clone(),
        })
        .await?;
    cancel.check()?;

    let mut output = match parse_analysis_response(&response.text) {
        Ok(output) => output,
        Err(e) => {
            warn!(section = index, "解析結果をJSONとして読めません（提案は手動で入力してください）: {}", e);
            AnalysisOutput {
                report: response.text.trim().to_string(),
                ..Default::default()
            }
        }
    };
    output.response_id = response.response_id.or_else(|| data.analysis.response_id.clone());

    controller.set_analysis(output.clone());
    info!(section = index, suggestions = output.suggestions.len(), "AI解析完了");
    Ok(output)
}
