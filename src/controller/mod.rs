//! ウィザードの状態管理
//!
//! セクション列を「初期入力（任意）→ セクション0 … n → 出力」の一本道で進める。
//!
//! - 表示判定は毎回フォームデータ全体から再計算する（キャッシュしない）
//! - セクションデータはマージで更新し、差分がなければ状態を差し替えない
//! - 完了処理はセクション単位で保存し、成功時のみ次へ進む
//! - 状態は `Arc<WizardData>` を丸ごと差し替える（1回の更新は原子的、複数更新をまたぐ保証はない）

mod events;
mod guard;

pub use events::WizardEvent;
pub use guard::{CompletionGuard, IgnoreReason};

use crate::error::{WizardError, Result};
use crate::store::{
    ContentStore, RecordSnapshot, RecordStore, SectionPayload, SectionSaveRequest, WizardSnapshot,
};
use base64::Engine;
use inspection_wizard_common::image::{push_unique, split_data_url};
use inspection_wizard_common::{
    collect_form_data, compute_document_summary, derive_canonical_fields, merge_grid,
    strip_transient_fields, visible_indices, AnalysisOutput, DocumentSummary, FormData, ImageRef,
    InspectionStatus, RecordContext, Section, SectionData, SectionPatch, SummaryInput, WizardData,
    WizardDefinition,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 既定の最小送信間隔
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// 現在のステップ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStage {
    Input,
    Section(usize),
    Export,
}

/// 完了処理の結果
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Advanced {
        completed_index: usize,
        next: WizardStage,
        summary: DocumentSummary,
    },
    Ignored(IgnoreReason),
}

pub struct WizardController {
    definition: WizardDefinition,
    store: Arc<dyn RecordStore>,
    content: Option<Arc<dyn ContentStore>>,
    state: Mutex<Arc<WizardData>>,
    record_context: Mutex<Option<RecordContext>>,
    guard: CompletionGuard,
    events: mpsc::UnboundedSender<WizardEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<WizardEvent>>>,
}

impl WizardController {
    pub fn new(definition: WizardDefinition, store: Arc<dyn RecordStore>) -> Self {
        Self::with_debounce(definition, store, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(
        definition: WizardDefinition,
        store: Arc<dyn RecordStore>,
        debounce: Duration,
    ) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            definition,
            store,
            content: None,
            state: Mutex::new(Arc::new(WizardData::default())),
            record_context: Mutex::new(None),
            guard: CompletionGuard::new(debounce),
            events,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn with_content_store(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    /// 保存済みの状態から再開
    pub fn with_data(self, data: WizardData, context: Option<RecordContext>) -> Self {
        self.replace_state(data);
        *self.record_context.lock().unwrap_or_else(|e| e.into_inner()) = context;
        self
    }

    pub fn definition(&self) -> &WizardDefinition {
        &self.definition
    }

    pub fn sections(&self) -> &[Section] {
        &self.definition.sections
    }

    pub fn content_store(&self) -> Option<&Arc<dyn ContentStore>> {
        self.content.as_ref()
    }

    pub fn record_context(&self) -> Option<RecordContext> {
        self.record_context.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// イベント受信側（1回だけ取得できる）
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<WizardEvent>> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// 現在の状態
    pub fn snapshot(&self) -> Arc<WizardData> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 関数型の更新。None を返したら状態を差し替えず元の Arc を返す
    pub fn update<F>(&self, f: F) -> Arc<WizardData>
    where
        F: FnOnce(&WizardData) -> Option<WizardData>,
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = f(&state) {
            *state = Arc::new(next);
        }
        state.clone()
    }

    fn replace_state(&self, data: WizardData) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(data);
    }

    /// 全フィールドの集約
    pub fn form_data(&self) -> FormData {
        collect_form_data(&self.definition.sections, &self.snapshot())
    }

    /// 表示中のセクション（毎回再計算）
    pub fn visible_sections(&self) -> Vec<usize> {
        self.visible_for(&self.snapshot())
    }

    fn visible_for(&self, data: &WizardData) -> Vec<usize> {
        let form = collect_form_data(&self.definition.sections, data);
        visible_indices(&self.definition.sections, &form)
    }

    /// ポインタ以降で最初に表示されるセクション
    fn resolve_current(data: &WizardData, visible: &[usize]) -> Option<usize> {
        visible.iter().copied().find(|&i| i >= data.current_step)
    }

    pub fn stage(&self) -> WizardStage {
        let data = self.snapshot();
        self.stage_for(&data)
    }

    fn stage_for(&self, data: &WizardData) -> WizardStage {
        if self.definition.input_step && !data.input_captured {
            return WizardStage::Input;
        }
        match Self::resolve_current(data, &self.visible_for(data)) {
            Some(index) => WizardStage::Section(index),
            None => WizardStage::Export,
        }
    }

    pub fn current_section(&self) -> Option<usize> {
        match self.stage() {
            WizardStage::Section(index) => Some(index),
            _ => None,
        }
    }

    /// 初期入力を記録
    pub fn submit_input(&self, fields: FormData) -> Arc<WizardData> {
        self.update(|current| {
            let changed = fields.iter().any(|(k, v)| current.input_data.get(k) != Some(v));
            if !changed && current.input_captured {
                return None;
            }
            let mut next = current.clone();
            for (key, value) in fields {
                next.input_data.insert(key, value);
            }
            next.input_captured = true;
            Some(next)
        })
    }

    /// セクションへの部分更新
    ///
    /// 値が変わらない場合は元の状態（同じ Arc）を返す
    pub fn update_section(&self, index: usize, patch: SectionPatch) -> Arc<WizardData> {
        let sections = &self.definition.sections;
        self.update(|current| {
            let base = match current.sections.get(index) {
                Some(existing) => existing.clone(),
                None => sections.get(index).map(SectionData::placeholder).unwrap_or_default(),
            };
            if index < current.sections.len() && !patch.differs_from(&base) {
                return None;
            }
            if index >= current.sections.len() && patch.is_empty() {
                return None;
            }

            let mut next = current.clone();
            next.ensure_section(index, sections);
            patch.apply_to(&mut next.sections[index]);
            debug!(section = index, "セクション更新");
            Some(next)
        })
    }

    /// 音声書き起こしを反映
    pub fn set_transcript(&self, index: usize, text: impl Into<String>) -> Arc<WizardData> {
        self.update_section(
            index,
            SectionPatch {
                transcript: Some(text.into()),
                ..Default::default()
            },
        )
    }

    /// 音声認識の途中結果を一時バッファに追記
    pub fn buffer_voice(&self, chunk: &str) -> Arc<WizardData> {
        let chunk = chunk.trim();
        self.update(|current| {
            if chunk.is_empty() {
                return None;
            }
            let mut next = current.clone();
            append_line(&mut next.voice_buffer, chunk, " ");
            Some(next)
        })
    }

    /// 入力中のメモを一時バッファに置く
    pub fn buffer_text(&self, text: impl Into<String>) -> Arc<WizardData> {
        let text = text.into();
        self.update(|current| {
            if current.text_buffer == text {
                return None;
            }
            let mut next = current.clone();
            next.text_buffer = text;
            Some(next)
        })
    }

    /// 一時バッファを確定してセクションへ移す
    ///
    /// 音声は transcript、メモは notes に追記し、バッファは空にする
    pub fn commit_buffers(&self, index: usize) -> Arc<WizardData> {
        let sections = &self.definition.sections;
        self.update(|current| {
            let voice = current.voice_buffer.trim();
            let text = current.text_buffer.trim();
            if voice.is_empty() && text.is_empty() {
                return None;
            }
            let mut next = current.clone();
            next.ensure_section(index, sections);
            let section = &mut next.sections[index];
            if !voice.is_empty() {
                append_line(&mut section.transcript, voice, "\n");
            }
            if !text.is_empty() {
                append_line(&mut section.notes, text, "\n");
            }
            next.voice_buffer.clear();
            next.text_buffer.clear();
            Some(next)
        })
    }

    /// 撮影画像を保存してセクションに追加
    ///
    /// 保存に失敗した画像は一時バッファに残す（記録・LLMには送らない）
    pub async fn capture_image(&self, index: usize, data_url: &str) -> Result<ImageRef> {
        let (mime, encoded) = split_data_url(data_url)
            .ok_or_else(|| WizardError::ContentStore("Data URLではありません".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| WizardError::ContentStore(format!("画像デコードエラー: {}", e)))?;

        let uploaded = match &self.content {
            Some(content) => content.upload(bytes, mime).await,
            None => Err(WizardError::ContentStore("画像の保存先が設定されていません".into())),
        };

        match uploaded {
            Ok(image) if image.is_durable() => {
                let current = self.snapshot();
                let mut images = current
                    .sections
                    .get(index)
                    .map(|s| s.images.clone())
                    .unwrap_or_default();
                push_unique(&mut images, image.clone());
                self.update_section(
                    index,
                    SectionPatch {
                        images: Some(images),
                        ..Default::default()
                    },
                );
                info!(section = index, locator = image.locator(), "画像を保存");
                Ok(image)
            }
            other => {
                if let Err(e) = &other {
                    warn!(section = index, "画像の保存に失敗、一時バッファに保持: {}", e);
                }
                let transient = ImageRef::Transient {
                    data_url: data_url.to_string(),
                };
                self.update(|current| {
                    let mut next = current.clone();
                    push_unique(&mut next.image_buffer, transient.clone());
                    Some(next)
                });
                Ok(transient)
            }
        }
    }

    /// AI解析結果を記録
    pub fn set_analysis(&self, analysis: AnalysisOutput) -> Arc<WizardData> {
        self.update(|current| {
            if current.analysis == analysis {
                return None;
            }
            let mut next = current.clone();
            next.analysis = analysis;
            Some(next)
        })
    }

    /// 会話継続用のレスポンスIDを更新
    pub fn set_response_id(&self, response_id: Option<String>) -> Arc<WizardData> {
        self.update(|current| {
            if response_id.is_none() || current.analysis.response_id == response_id {
                return None;
            }
            let mut next = current.clone();
            next.analysis.response_id = response_id;
            Some(next)
        })
    }

    /// 前の表示セクションへ戻る（先頭で止まる）
    pub fn back(&self) -> Arc<WizardData> {
        let sections_len = self.definition.sections.len();
        let data = self.snapshot();
        let visible = self.visible_for(&data);
        let current = Self::resolve_current(&data, &visible).unwrap_or(sections_len);
        let target = visible
            .iter()
            .copied()
            .filter(|&i| i < current)
            .next_back()
            .or_else(|| visible.first().copied())
            .unwrap_or(0);

        self.update(|state| {
            if state.current_step == target {
                return None;
            }
            let mut next = state.clone();
            next.current_step = target;
            Some(next)
        })
    }

    /// 記録を取得して状態を再構築
    pub async fn open_record(&self, record_id: &str) -> Result<Arc<WizardData>> {
        let record = self
            .store
            .load_record(record_id)
            .await?
            .ok_or_else(|| WizardError::Persistence(format!("記録が見つかりません: {}", record_id)))?;
        Ok(self.hydrate(record))
    }

    pub fn hydrate(&self, record: RecordSnapshot) -> Arc<WizardData> {
        let data = WizardData {
            record_id: Some(record.record_id.clone()),
            current_step: record.current_step,
            completed_steps: record.completed_steps,
            sections: record.sections,
            input_captured: true,
            input_data: record.input_data,
            analysis: record.analysis,
            summary: record.summary,
            ..Default::default()
        };
        let mut context = record.context;
        if context.record_id.is_empty() {
            context.record_id = record.record_id;
        }
        *self.record_context.lock().unwrap_or_else(|e| e.into_inner()) = Some(context);
        self.replace_state(data);
        self.snapshot()
    }

    /// 現在のセクションを完了して保存し、次へ進む
    ///
    /// 保存に失敗した場合はステップを進めずにエラーを返す（再試行はしない）
    pub async fn complete_current_step(&self) -> Result<CompletionOutcome> {
        let data = self.snapshot();
        let index = match self.stage_for(&data) {
            WizardStage::Section(index) => index,
            WizardStage::Input => return Ok(CompletionOutcome::Ignored(IgnoreReason::InputPending)),
            WizardStage::Export => {
                return Ok(CompletionOutcome::Ignored(IgnoreReason::NothingToComplete))
            }
        };

        let _permit = match self.guard.try_acquire() {
            Ok(permit) => permit,
            Err(reason) => {
                debug!(section = index, %reason, "完了処理をスキップ");
                return Ok(CompletionOutcome::Ignored(reason));
            }
        };

        let request = self.build_save_request(&data, index);
        let response = match self.store.save_section(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(section = index, "セクションの保存に失敗: {}", e);
                return Err(e);
            }
        };

        let record_context = self.record_context();
        let sections = &self.definition.sections;
        let was_completed = data.summary.status == InspectionStatus::Completed;

        let updated = self.update(|current| {
            let mut next = current.clone();

            for normalized in &response.normalized_sections {
                if normalized.index >= sections.len() {
                    warn!(
                        section = normalized.index,
                        sections = sections.len(),
                        "範囲外の正規化セクションを無視"
                    );
                    continue;
                }
                next.ensure_section(normalized.index, sections);
                next.sections[normalized.index] = normalized.data.clone();
            }
            if !response.grid_data.is_empty() {
                next.ensure_section(index, sections);
                merge_grid(&mut next.sections[index].grid, &response.grid_data);
            }
            if let Some(record_id) = &response.record_id {
                next.record_id = Some(record_id.clone());
            }

            next.mark_completed(index);
            let visible = self.visible_for(&next);
            next.current_step = visible
                .iter()
                .copied()
                .find(|&i| i > index)
                .unwrap_or(sections.len());

            let global_form = collect_form_data(sections, &next);
            let final_form = next
                .sections
                .get(index)
                .map(|s| s.fields.clone())
                .unwrap_or_default();
            next.summary = compute_document_summary(SummaryInput {
                record: record_context.as_ref(),
                global_form: &global_form,
                final_form: &final_form,
                previous: Some(&current.summary),
                completed_steps: &next.completed_steps,
                visible: &visible,
            });
            Some(next)
        });

        let summary = updated.summary.clone();
        info!(
            section = index,
            progress = summary.progress,
            status = %summary.status,
            "セクション完了"
        );
        self.publish(WizardEvent::StepCompleted {
            index,
            progress: summary.progress,
            status: summary.status,
        });
        if !was_completed && summary.status == InspectionStatus::Completed {
            self.publish(WizardEvent::WizardCompleted {
                record_id: updated.record_id.clone(),
            });
        }

        let next = self.stage_for(&updated);
        if let WizardStage::Section(next_index) = next {
            let prompt_ref = sections[next_index].prompt_ref.as_deref();
            if let Some(prompt_ref) = prompt_ref.filter(|_| updated.analysis.has_report()) {
                self.publish(WizardEvent::PopulateRequested {
                    section_index: next_index,
                    prompt_ref: prompt_ref.to_string(),
                });
            }
        }

        Ok(CompletionOutcome::Advanced {
            completed_index: index,
            next,
            summary,
        })
    }

    fn build_save_request(&self, data: &WizardData, index: usize) -> SectionSaveRequest {
        let sections = &self.definition.sections;
        let form = strip_transient_fields(&collect_form_data(sections, data));
        let canonical = derive_canonical_fields(&form);

        let section_data = data
            .sections
            .get(index)
            .cloned()
            .or_else(|| sections.get(index).map(SectionData::placeholder))
            .unwrap_or_default()
            .without_transient();
        let payload = SectionPayload::from_section(index, &section_data, canonical);

        let mut completed_steps = data.completed_steps.clone();
        if !completed_steps.contains(&index) {
            completed_steps.push(index);
        }
        let visible = visible_indices(sections, &form);
        let next_step = visible
            .iter()
            .copied()
            .find(|&i| i > index)
            .unwrap_or(sections.len());

        // 保存成功後の見込みサマリー
        let record_context = self.record_context();
        let summary = compute_document_summary(SummaryInput {
            record: record_context.as_ref(),
            global_form: &form,
            final_form: &section_data.fields,
            previous: Some(&data.summary),
            completed_steps: &completed_steps,
            visible: &visible,
        });

        SectionSaveRequest {
            record_id: data.record_id.clone(),
            payload,
            snapshot: WizardSnapshot {
                wizard_id: self.definition.id.clone(),
                current_step: next_step,
                completed_steps,
                input_data: strip_transient_fields(&data.input_data),
                form_data: form,
                summary,
                analysis_report: data.analysis.report.clone(),
            },
        }
    }

    fn publish(&self, event: WizardEvent) {
        if self.events.send(event).is_err() {
            debug!("イベント受信側がありません");
        }
    }
}

fn append_line(target: &mut String, text: &str, separator: &str) {
    if !target.trim().is_empty() {
        target.push_str(separator);
    }
    target.push_str(text);
}
