//! 次ステップの自動入力
//!
//! `PopulateRequested` を受けて、計算機プロンプトと直前の解析結果からLLMにフィールド値を求め、
//! 未入力のフィールドにだけ反映する。失敗はログに残して手動入力に任せる。

use crate::controller::{WizardController, WizardEvent};
use crate::error::{WizardError, Result};
use crate::llm::{LlmClient, LlmRequest};
use inspection_wizard_common::{
    build_populate_prompt, parse_field_values, strip_transient_fields, CalculatorCatalog, FormData,
    SectionPatch,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct PopulateWorker {
    controller: Arc<WizardController>,
    llm: Arc<dyn LlmClient>,
    catalog: Arc<CalculatorCatalog>,
    model: String,
}

impl PopulateWorker {
    pub fn new(
        controller: Arc<WizardController>,
        llm: Arc<dyn LlmClient>,
        catalog: Arc<CalculatorCatalog>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            llm,
            catalog,
            model: model.into(),
        }
    }

    /// 1件の自動入力要求を処理し、反映したフィールドを返す
    pub async fn populate(&self, section_index: usize, prompt_ref: &str) -> Result<FormData> {
        let section = self
            .controller
            .sections()
            .get(section_index)
            .ok_or(inspection_wizard_common::Error::UnknownSection(section_index))?;

        let data = self.controller.snapshot();
        let form = strip_transient_fields(&self.controller.form_data());
        let calculator_prompt = self
            .catalog
            .prompt_for(prompt_ref, &form)
            .map_err(WizardError::from_common)?;
        let prompt = build_populate_prompt(&calculator_prompt, &data.analysis, section);

        let response = self
            .llm
            .complete(LlmRequest {
                prompt,
                model: self.model.clone(),
                images: Vec::new(),
                previous_response_id: data.analysis.response_id.clone(),
            })
            .await?;
        self.controller.set_response_id(response.response_id.clone());

        let suggested = parse_field_values(&response.text).map_err(WizardError::from_common)?;

        let current = self.controller.snapshot();
        let existing = current.sections.get(section_index).map(|s| &s.fields);
        let declared: Vec<&str> = section.fields.iter().map(|f| f.name.as_str()).collect();

        let fill: FormData = suggested
            .into_iter()
            .filter(|(key, _)| declared.is_empty() || declared.contains(&key.as_str()))
            .filter(|(key, _)| {
                existing
                    .and_then(|fields| fields.get(key))
                    .map_or(true, is_blank)
            })
            .collect();

        if !fill.is_empty() {
            self.controller
                .update_section(section_index, SectionPatch::fields(fill.clone()));
        }
        Ok(fill)
    }

    /// イベントを受信し続ける（送信側が閉じたら終了）
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<WizardEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("自動入力ワーカー終了");
    }

    /// イベント1件を処理（失敗はログのみ）
    pub async fn handle(&self, event: WizardEvent) {
        let WizardEvent::PopulateRequested {
            section_index,
            prompt_ref,
        } = event
        else {
            return;
        };

        match self.populate(section_index, &prompt_ref).await {
            Ok(fields) => info!(
                section = section_index,
                filled = fields.len(),
                "自動入力完了"
            ),
            Err(WizardError::MissingPrompt(id)) => {
                warn!(section = section_index, "プロンプトが見つかりません: {}", id)
            }
            Err(e) => warn!(
                section = section_index,
                "自動入力に失敗（手動で入力してください）: {}",
                e
            ),
        }
    }
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
