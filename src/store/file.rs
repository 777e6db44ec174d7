//! ローカルファイルの保存先
//!
//! - 記録: `<dir>/records/<record_id>.json`
//! - 画像: `<dir>/files/<sha256>.<ext>`（内容アドレス、`file://` URL）

use super::{
    ContentStore, NormalizedSection, RecordSnapshot, RecordStore, SectionSaveRequest,
    SectionSaveResponse,
};
use crate::error::{WizardError, Result};
use async_trait::async_trait;
use inspection_wizard_common::{ImageRef, SectionData};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

const RECORDS_DIR: &str = "records";
const FILES_DIR: &str = "files";

/// 記録をJSONファイルで保存
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 記録ファイルのパス（記録フォルダの外を指すIDは拒否）
    pub fn record_path(&self, record_id: &str) -> Result<PathBuf> {
        let invalid = record_id.trim().is_empty()
            || record_id.contains(['/', '\\', '\0'])
            || record_id.contains("..");
        if invalid {
            return Err(WizardError::Persistence(format!("不正な記録ID: {}", record_id)));
        }
        Ok(self.dir.join(RECORDS_DIR).join(format!("{}.json", record_id)))
    }

    fn new_record_id(wizard_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(wizard_id.as_bytes());
        hasher.update(chrono::Utc::now().to_rfc3339().as_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hex::encode(&hasher.finalize()[..8])
    }

    async fn read_record(&self, record_id: &str) -> Result<Option<RecordSnapshot>> {
        let path = self.record_path(record_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn write_record(&self, record: &RecordSnapshot) -> Result<()> {
        let path = self.record_path(&record.record_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn save_section(&self, request: &SectionSaveRequest) -> Result<SectionSaveResponse> {
        let record_id = match &request.record_id {
            Some(id) => id.clone(),
            None => Self::new_record_id(&request.snapshot.wizard_id),
        };

        let mut record = self.read_record(&record_id).await?.unwrap_or_else(|| RecordSnapshot {
            record_id: record_id.clone(),
            wizard_id: request.snapshot.wizard_id.clone(),
            ..Default::default()
        });

        let index = request.payload.section_index;
        while record.sections.len() <= index {
            record.sections.push(SectionData::default());
        }
        let stored = request.payload.clone().into_section_data();
        record.sections[index] = stored.clone();

        let snapshot = &request.snapshot;
        record.current_step = snapshot.current_step;
        record.completed_steps = snapshot.completed_steps.clone();
        if !snapshot.input_data.is_empty() {
            record.input_data = snapshot.input_data.clone();
        }
        record.summary = snapshot.summary.clone();
        record.analysis.report = snapshot.analysis_report.clone();
        record.context.record_id = record_id.clone();
        record.context.equipment_type = text_field(&request.payload.canonical, "equipmentType");
        record.context.equipment_id = text_field(&request.payload.canonical, "equipmentId");
        record.context.owner = text_field(&request.payload.canonical, "owner");
        record.context.inspection_date = text_field(&request.payload.canonical, "inspectionDate");

        self.write_record(&record).await?;
        debug!(record_id = %record_id, section = index, "記録を保存");

        Ok(SectionSaveResponse {
            record_id: Some(record_id),
            normalized_sections: vec![NormalizedSection { index, data: stored }],
            grid_data: Vec::new(),
        })
    }

    async fn load_record(&self, record_id: &str) -> Result<Option<RecordSnapshot>> {
        self.read_record(record_id).await
    }
}

fn text_field(fields: &inspection_wizard_common::FormData, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 画像を内容ハッシュ名で保存
#[derive(Debug, Clone)]
pub struct FileContentStore {
    dir: PathBuf,
}

impl FileContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn files_dir(&self) -> PathBuf {
        self.dir.join(FILES_DIR)
    }
}

/// MIMEタイプから拡張子
fn extension_for(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/jpeg" | "image/jpg" => "jpg",
        _ => "bin",
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn upload(&self, bytes: Vec<u8>, mime: &str) -> Result<ImageRef> {
        if bytes.is_empty() {
            return Err(WizardError::ContentStore("空の画像データ".into()));
        }

        let id = hex::encode(Sha256::digest(&bytes));
        let dir = self.files_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.{}", id, extension_for(mime)));
        if !path.exists() {
            tokio::fs::write(&path, &bytes).await?;
        }
        let path = tokio::fs::canonicalize(&path).await?;

        Ok(ImageRef::durable(id, file_url(&path)))
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let ImageRef::Durable { url, .. } = image else {
            return Err(WizardError::ContentStore("未保存の画像は取得できません".into()));
        };
        let path = url.strip_prefix("file://").ok_or_else(|| {
            WizardError::ContentStore(format!("ローカルURLではありません: {}", url))
        })?;
        tokio::fs::read(path)
            .await
            .map_err(|e| WizardError::ContentStore(format!("{}: {}", path, e)))
    }
}
