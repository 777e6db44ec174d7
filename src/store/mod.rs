//! 外部の保存先
//!
//! - RecordStore: セクション単位の記録保存と既存記録の取得
//! - ContentStore: 画像バイナリの保存（Durable参照の発行）と取得
//!
//! 通信形式はJSON。HTTP実装とローカルファイル実装を持つ。

pub mod file;
pub mod http;

pub use file::{FileContentStore, FileRecordStore};
pub use http::HttpStore;

use crate::error::Result;
use async_trait::async_trait;
use inspection_wizard_common::{
    strip_transient_fields, AnalysisOutput, DocumentSummary, FormData, GridRow, ImageRef,
    RecordContext, SectionData,
};
use serde::{Deserialize, Serialize};

/// 記録の保存先
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save_section(&self, request: &SectionSaveRequest) -> Result<SectionSaveResponse>;

    async fn load_record(&self, record_id: &str) -> Result<Option<RecordSnapshot>>;
}

/// 画像の保存先
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// 保存してDurable参照を返す
    async fn upload(&self, bytes: Vec<u8>, mime: &str) -> Result<ImageRef>;

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>>;
}

/// 保存するセクションの内容（Durable画像のみ）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionPayload {
    pub section_index: usize,
    pub section_id: String,
    pub title: String,
    pub fields: FormData,
    pub images: Vec<ImageRef>,
    pub grid: Vec<GridRow>,
    pub transcript: String,
    pub notes: String,
    /// 正規化済みフィールド（設備種別など）
    pub canonical: FormData,
}

impl SectionPayload {
    pub fn from_section(index: usize, data: &SectionData, canonical: FormData) -> Self {
        let data = data.without_transient();
        Self {
            section_index: index,
            section_id: data.section_id,
            title: data.title,
            fields: data.fields,
            images: data.images,
            grid: data.grid,
            transcript: data.transcript,
            notes: data.notes,
            canonical: strip_transient_fields(&canonical),
        }
    }

    pub fn into_section_data(self) -> SectionData {
        SectionData {
            section_id: self.section_id,
            title: self.title,
            fields: self.fields,
            images: self.images,
            grid: self.grid,
            transcript: self.transcript,
            notes: self.notes,
        }
    }
}

/// ウィザード全体の軽量スナップショット（画像・グリッドを含まない）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WizardSnapshot {
    pub wizard_id: String,
    pub current_step: usize,
    pub completed_steps: Vec<usize>,
    /// 初期入力ステップのデータ（再開時の表示判定に使う）
    pub input_data: FormData,
    pub form_data: FormData,
    pub summary: DocumentSummary,
    pub analysis_report: String,
}

/// セクション保存リクエスト
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionSaveRequest {
    pub record_id: Option<String>,
    pub payload: SectionPayload,
    pub snapshot: WizardSnapshot,
}

/// 保存先で正規化されたセクション
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizedSection {
    pub index: usize,
    pub data: SectionData,
}

/// セクション保存レスポンス
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionSaveResponse {
    pub record_id: Option<String>,
    pub normalized_sections: Vec<NormalizedSection>,
    /// サーバー側で計算したグリッド行（保存したセクションに反映）
    pub grid_data: Vec<GridRow>,
}

/// 保存済み記録
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordSnapshot {
    pub record_id: String,
    pub wizard_id: String,
    pub current_step: usize,
    pub completed_steps: Vec<usize>,
    pub sections: Vec<SectionData>,
    pub input_data: FormData,
    pub analysis: AnalysisOutput,
    pub summary: DocumentSummary,
    pub context: RecordContext,
}
