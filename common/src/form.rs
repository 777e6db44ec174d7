//! フォームデータの集約と差分更新
//!
//! - collect_form_data: 全セクションのフィールドを1つのマップに集約
//! - derive_canonical_fields: 設備種別・ID・所有者・日付の正規フィールド
//! - SectionPatch: セクションへの部分更新（差分がなければ何もしない）

use crate::category::{equipment_label, normalize_equipment_type};
use crate::image::ImageRef;
use crate::types::{FormData, GridRow, Section, SectionData, WizardData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_KEYS: &[&str] = &["equipmentType", "equipment_type", "assetType", "type", "category"];
pub const ID_KEYS: &[&str] = &["equipmentId", "equipment_id", "tagNumber", "tagNo", "assetId"];
pub const OWNER_KEYS: &[&str] = &["owner", "client", "plantOwner", "customer"];
pub const DATE_KEYS: &[&str] = &["inspectionDate", "inspection_date", "date"];

/// 全フィールドを集約する
///
/// 初期入力 → セクション順に走査し、既にあるキーは上書きしない。
/// セクションの `output_keys` に含まれるキーだけは後のセクションが上書きする。
/// null と空文字は未入力として扱う。
pub fn collect_form_data(sections: &[Section], data: &WizardData) -> FormData {
    let mut collected = FormData::new();

    for (key, value) in &data.input_data {
        if is_filled(value) {
            collected.insert(key.clone(), value.clone());
        }
    }

    for (index, section_data) in data.sections.iter().enumerate() {
        let output_keys = sections
            .get(index)
            .map(|s| s.output_keys.as_slice())
            .unwrap_or(&[]);

        for (key, value) in &section_data.fields {
            if !is_filled(value) {
                continue;
            }
            let promoted = output_keys.iter().any(|k| k == key);
            if promoted || !collected.contains_key(key) {
                collected.insert(key.clone(), value.clone());
            }
        }
    }

    collected
}

/// 正規フィールドを導出
pub fn derive_canonical_fields(form_data: &FormData) -> FormData {
    let mut canonical = FormData::new();

    let raw_type = first_text(form_data, TYPE_KEYS).unwrap_or_default();
    let key = normalize_equipment_type(&raw_type);
    canonical.insert("equipmentType".into(), Value::from(key));
    canonical.insert("equipmentLabel".into(), Value::from(equipment_label(key)));

    if let Some(id) = first_text(form_data, ID_KEYS) {
        canonical.insert("equipmentId".into(), Value::from(id));
    }
    if let Some(owner) = first_text(form_data, OWNER_KEYS) {
        canonical.insert("owner".into(), Value::from(owner));
    }
    if let Some(date) = first_text(form_data, DATE_KEYS) {
        canonical.insert("inspectionDate".into(), Value::from(date));
    }

    canonical
}

/// 候補キーのうち最初に値があるものを文字列で取得
pub fn first_text(form_data: &FormData, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| form_data.get(*k))
        .filter_map(value_text)
        .find(|s| !s.is_empty())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// セクションへの部分更新
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionPatch {
    pub fields: FormData,
    pub images: Option<Vec<ImageRef>>,
    pub grid: Option<Vec<GridRow>>,
    pub transcript: Option<String>,
    pub notes: Option<String>,
}

impl SectionPatch {
    pub fn fields(fields: FormData) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    pub fn field(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = FormData::new();
        fields.insert(key.into(), value.into());
        Self::fields(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.images.is_none()
            && self.grid.is_none()
            && self.transcript.is_none()
            && self.notes.is_none()
    }

    /// 現在値と異なるキーがあるか（配列も要素単位で比較）
    pub fn differs_from(&self, current: &SectionData) -> bool {
        let fields_changed = self
            .fields
            .iter()
            .any(|(key, value)| current.fields.get(key) != Some(value));

        fields_changed
            || self.images.as_ref().is_some_and(|v| *v != current.images)
            || self.grid.as_ref().is_some_and(|v| *v != current.grid)
            || self.transcript.as_ref().is_some_and(|v| *v != current.transcript)
            || self.notes.as_ref().is_some_and(|v| *v != current.notes)
    }

    /// 更新を適用（フィールドはマージ、それ以外は置き換え）
    pub fn apply_to(&self, target: &mut SectionData) {
        for (key, value) in &self.fields {
            target.fields.insert(key.clone(), value.clone());
        }
        if let Some(images) = &self.images {
            target.images = images.clone();
        }
        if let Some(grid) = &self.grid {
            target.grid = grid.clone();
        }
        if let Some(transcript) = &self.transcript {
            target.transcript = transcript.clone();
        }
        if let Some(notes) = &self.notes {
            target.notes = notes.clone();
        }
    }
}

/// グリッド行をマージ
///
/// `id` 列が一致する行は返却値で上書き、それ以外は末尾に追加する
pub fn merge_grid(current: &mut Vec<GridRow>, incoming: &[GridRow]) {
    for row in incoming {
        let position = row
            .get("id")
            .filter(|id| !id.is_null())
            .and_then(|id| current.iter().position(|r| r.get("id") == Some(id)));

        match position {
            Some(pos) => {
                for (key, value) in row {
                    current[pos].insert(key.clone(), value.clone());
                }
            }
            None => current.push(row.clone()),
        }
    }
}
