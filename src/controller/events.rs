//! ウィザード内のイベント
//!
//! インスタンスごとのチャネルで配信する（受信側がいなければ破棄）。

use inspection_wizard_common::InspectionStatus;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WizardEvent {
    /// セクション完了
    #[serde(rename_all = "camelCase")]
    StepCompleted {
        index: usize,
        progress: u8,
        status: InspectionStatus,
    },

    /// 全セクション完了（状態が completed になった時に1回だけ）
    #[serde(rename_all = "camelCase")]
    WizardCompleted { record_id: Option<String> },

    /// 次のセクションの自動入力要求
    #[serde(rename_all = "camelCase")]
    PopulateRequested {
        section_index: usize,
        prompt_ref: String,
    },
}
