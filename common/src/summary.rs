//! ドキュメントサマリー
//!
//! 画面表示とレポートヘッダーに使う非正規化フィールド（種別・ID・所有者・日付・進捗）を導出する。
//! 状態は進捗100%で `completed` になり、以後 `in_progress` には戻らない。

use crate::category::{equipment_label, normalize_equipment_type, DEFAULT_EQUIPMENT_TYPE};
use crate::form::{first_text, DATE_KEYS, ID_KEYS, OWNER_KEYS, TYPE_KEYS};
use crate::types::FormData;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 点検状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    #[default]
    InProgress,
    Completed,
}

impl std::fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InspectionStatus::InProgress => write!(f, "in_progress"),
            InspectionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// ドキュメントサマリー
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentSummary {
    pub equipment_type: String,
    pub equipment_label: String,
    pub equipment_id: String,
    pub owner: String,
    pub inspection_date: String,
    /// 0-100
    pub progress: u8,
    pub status: InspectionStatus,
}

/// 既存レコードの文脈（再開時）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordContext {
    pub record_id: String,
    pub equipment_type: Option<String>,
    pub equipment_id: Option<String>,
    pub owner: Option<String>,
    pub inspection_date: Option<String>,
}

/// サマリー導出の入力
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub record: Option<&'a RecordContext>,
    pub global_form: &'a FormData,
    pub final_form: &'a FormData,
    pub previous: Option<&'a DocumentSummary>,
    /// 完了済みインデックス（今回完了分を含む）
    pub completed_steps: &'a [usize],
    /// 表示中のセクションインデックス
    pub visible: &'a [usize],
}

/// サマリーを導出
///
/// 優先順位: 最終フォーム → 全体フォーム → レコード → 前回サマリー
pub fn compute_document_summary(input: SummaryInput<'_>) -> DocumentSummary {
    let record = input.record;
    let previous = input.previous;
    let raw_type = resolve(
        &input,
        TYPE_KEYS,
        record.and_then(|r| r.equipment_type.as_ref()),
        previous.map(|p| &p.equipment_type),
    );
    let equipment_type = if raw_type.is_empty() {
        DEFAULT_EQUIPMENT_TYPE
    } else {
        normalize_equipment_type(&raw_type)
    };

    let progress = completion_percentage(input.completed_steps, input.visible);
    let was_completed = input
        .previous
        .is_some_and(|p| p.status == InspectionStatus::Completed);
    let status = if was_completed || progress >= 100 {
        InspectionStatus::Completed
    } else {
        InspectionStatus::InProgress
    };

    DocumentSummary {
        equipment_type: equipment_type.to_string(),
        equipment_label: equipment_label(equipment_type).to_string(),
        equipment_id: resolve(
            &input,
            ID_KEYS,
            record.and_then(|r| r.equipment_id.as_ref()),
            previous.map(|p| &p.equipment_id),
        ),
        owner: resolve(
            &input,
            OWNER_KEYS,
            record.and_then(|r| r.owner.as_ref()),
            previous.map(|p| &p.owner),
        ),
        inspection_date: resolve(
            &input,
            DATE_KEYS,
            record.and_then(|r| r.inspection_date.as_ref()),
            previous.map(|p| &p.inspection_date),
        ),
        progress,
        status,
    }
}

fn resolve(
    input: &SummaryInput<'_>,
    keys: &[&str],
    from_record: Option<&String>,
    from_previous: Option<&String>,
) -> String {
    first_text(input.final_form, keys)
        .or_else(|| first_text(input.global_form, keys))
        .or_else(|| from_record.filter(|s| !s.is_empty()).cloned())
        .or_else(|| from_previous.filter(|s| !s.is_empty()).cloned())
        .unwrap_or_default()
}

/// 進捗率 = 表示中かつ完了済みの件数 / 表示中の件数（四捨五入、最大100）
pub fn completion_percentage(completed_steps: &[usize], visible: &[usize]) -> u8 {
    if visible.is_empty() {
        return 0;
    }
    let completed: BTreeSet<usize> = completed_steps.iter().copied().collect();
    let done = visible.iter().filter(|i| completed.contains(i)).count();
    let ratio = done as f64 / visible.len() as f64 * 100.0;
    ratio.round().min(100.0) as u8
}
