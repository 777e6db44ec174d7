//! テスト用のモック（記録保存先・画像保存先・LLM）

#![allow(dead_code)]

use async_trait::async_trait;
use inspection_wizard::error::{Result, WizardError};
use inspection_wizard::llm::{LlmClient, LlmRequest, LlmResponse};
use inspection_wizard::store::{
    ContentStore, NormalizedSection, RecordSnapshot, RecordStore, SectionSaveRequest,
    SectionSaveResponse,
};
use inspection_wizard_common::{
    FieldDef, GridRow, ImageRef, Section, WizardDefinition,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 受け取ったリクエストを記録する保存先
#[derive(Default)]
pub struct MockRecordStore {
    pub requests: Mutex<Vec<SectionSaveRequest>>,
    pub fail: AtomicBool,
    pub delay: Duration,
    pub grid_data: Vec<GridRow>,
    pub normalized_sections: Vec<NormalizedSection>,
    pub record: Mutex<Option<RecordSnapshot>>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<SectionSaveRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn save_section(&self, request: &SectionSaveRequest) -> Result<SectionSaveResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(WizardError::Persistence("503 Service Unavailable".into()));
        }
        Ok(SectionSaveResponse {
            record_id: Some("rec-1".into()),
            normalized_sections: self.normalized_sections.clone(),
            grid_data: self.grid_data.clone(),
        })
    }

    async fn load_record(&self, _record_id: &str) -> Result<Option<RecordSnapshot>> {
        Ok(self.record.lock().unwrap().clone())
    }
}

/// 固定のバイト列を返す画像保存先
#[derive(Default)]
pub struct MockContentStore {
    pub fail_upload: bool,
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl ContentStore for MockContentStore {
    async fn upload(&self, bytes: Vec<u8>, _mime: &str) -> Result<ImageRef> {
        if self.fail_upload {
            return Err(WizardError::ContentStore("upload rejected".into()));
        }
        let id = format!("img-{}", bytes.len());
        Ok(ImageRef::durable(id.clone(), format!("https://files.local/{}.jpg", id)))
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(image.locator().to_string());
        Ok(vec![0xff, 0xd8, 0xff])
    }
}

/// 用意した応答を順に返すLLM
#[derive(Default)]
pub struct MockLlm {
    pub responses: Mutex<VecDeque<LlmResponse>>,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn with_responses(responses: Vec<(&str, Option<&str>)>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(text, id)| LlmResponse {
                        text: text.to_string(),
                        response_id: id.map(str::to_string),
                    })
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WizardError::Llm("no scripted response".into()))
    }
}

pub fn section(id: &str, fields: &[&str]) -> Section {
    Section {
        id: id.to_string(),
        title: id.to_string(),
        fields: fields
            .iter()
            .map(|name| FieldDef {
                name: name.to_string(),
                label: name.to_string(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// 依存のない3セクション
pub fn three_sections() -> WizardDefinition {
    WizardDefinition {
        id: "vessel".into(),
        title: "Pressure Vessel".into(),
        input_step: false,
        sections: vec![
            section("general", &["equipmentType", "equipmentId", "owner"]),
            section("visual", &["condition"]),
            section("thickness", &["tmin", "method"]),
        ],
    }
}
