//! ウィザードの型定義
//!
//! - WizardDefinition / Section / FieldDef: 外部設定（静的・不変）
//! - SectionData: セクションごとの入力データ
//! - WizardData: ウィザード全体の状態（ステップ位置・完了済み・解析結果・サマリー）

use crate::image::{retain_durable, strip_transient_fields, ImageRef};
use crate::summary::DocumentSummary;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// フォームデータ（フィールド名 → 値）
pub type FormData = Map<String, Value>;

/// ウィザード定義（JSON設定ファイル）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WizardDefinition {
    pub id: String,
    pub title: String,
    /// セクションの前に初期入力ステップを置くか
    pub input_step: bool,
    pub sections: Vec<Section>,
}

impl WizardDefinition {
    /// JSON文字列から読み込み
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        if definition.sections.is_empty() {
            return Err(crate::Error::Config(format!(
                "ウィザード '{}' にセクションがありません",
                definition.id
            )));
        }
        Ok(definition)
    }

    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// ステップ定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Section {
    pub id: String,
    pub title: String,
    /// 音声入力あり
    pub voice: bool,
    /// 画像撮影あり
    pub image: bool,
    pub fields: Vec<FieldDef>,
    pub grid_columns: Vec<GridColumn>,
    /// AI解析用プロンプト（インライン）
    pub analysis_prompt: Option<String>,
    /// 自動入力に使う計算機ID
    pub prompt_ref: Option<String>,
    pub depends_on: Option<Dependency>,
    /// 前のセクションの同名フィールドを上書きするキー
    pub output_keys: Vec<String>,
}

/// 表示条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dependency {
    pub field: String,
    pub values: Vec<Value>,
    /// trueなら値が一致しないときに表示
    pub negate: bool,
}

/// フィールド種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Textarea,
    Number,
    Date,
    Select,
    Checkbox,
}

/// フォームフィールド定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldDef {
    pub name: String,
    pub label: String,
    #[serde(alias = "type")]
    pub kind: FieldKind,
    pub options: Vec<String>,
    pub required: bool,
    pub default: Option<Value>,
    pub unit: Option<String>,
}

/// グリッド列定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridColumn {
    pub key: String,
    pub label: String,
    pub unit: Option<String>,
}

/// グリッド行（列キー → 値）
pub type GridRow = Map<String, Value>;

/// セクションの入力データ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionData {
    pub section_id: String,
    pub title: String,
    pub fields: FormData,
    pub images: Vec<ImageRef>,
    pub grid: Vec<GridRow>,
    /// 音声入力の書き起こし
    pub transcript: String,
    pub notes: String,
}

impl SectionData {
    /// 静的設定からプレースホルダーを生成（フィールドのデフォルト値を反映）
    pub fn placeholder(section: &Section) -> Self {
        let fields = section
            .fields
            .iter()
            .filter_map(|f| f.default.clone().map(|v| (f.name.clone(), v)))
            .collect();
        Self {
            section_id: section.id.clone(),
            title: section.title.clone(),
            fields,
            ..Default::default()
        }
    }

    /// 外部に送る形（ローカルエンコードの画像をフィールド・グリッド・画像一覧から除去）
    pub fn without_transient(&self) -> Self {
        Self {
            section_id: self.section_id.clone(),
            title: self.title.clone(),
            fields: strip_transient_fields(&self.fields),
            images: retain_durable(&self.images),
            grid: self.grid.iter().map(strip_transient_fields).collect(),
            transcript: self.transcript.clone(),
            notes: self.notes.clone(),
        }
    }
}

/// AIの提案
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Suggestion {
    /// 対象フィールド（なければ全体への提案）
    pub field: Option<String>,
    pub text: String,
    pub value: Option<Value>,
}

/// AI解析結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOutput {
    pub report: String,
    pub suggestions: Vec<Suggestion>,
    /// 次回呼び出しに引き継ぐレスポンスID
    pub response_id: Option<String>,
}

impl AnalysisOutput {
    pub fn has_report(&self) -> bool {
        !self.report.trim().is_empty()
    }
}

/// ウィザード全体の状態
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WizardData {
    pub record_id: Option<String>,
    /// 現在のステップ（設定上のセクションインデックス）
    pub current_step: usize,
    /// 完了済みセクション（重複なし・完了順）
    pub completed_steps: Vec<usize>,
    pub sections: Vec<SectionData>,
    /// 初期入力ステップのデータ
    pub input_data: FormData,
    pub input_captured: bool,
    pub analysis: AnalysisOutput,
    pub summary: DocumentSummary,

    // 一時バッファ（保存対象外）
    /// 音声認識の途中結果（確定で transcript へ移す）
    #[serde(skip)]
    pub voice_buffer: String,
    /// 入力中のメモ（確定で notes へ移す）
    #[serde(skip)]
    pub text_buffer: String,
    #[serde(skip)]
    pub image_buffer: Vec<ImageRef>,
}

impl WizardData {
    /// 完了済みとして記録（冪等）
    pub fn mark_completed(&mut self, index: usize) -> bool {
        if self.completed_steps.contains(&index) {
            return false;
        }
        self.completed_steps.push(index);
        true
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed_steps.contains(&index)
    }

    /// インデックスまでセクション配列を伸ばす
    pub fn ensure_section(&mut self, index: usize, sections: &[Section]) {
        while self.sections.len() <= index {
            let next = self.sections.len();
            let placeholder = sections
                .get(next)
                .map(SectionData::placeholder)
                .unwrap_or_default();
            self.sections.push(placeholder);
        }
    }
}
