//! プロンプト生成モジュール
//!
//! - build_analysis_prompt: セクションのAI解析用
//! - build_populate_prompt: 次ステップ自動入力用

use crate::calculator::render_template;
use crate::types::{AnalysisOutput, FormData, Section, SectionData};

const DEFAULT_ANALYSIS_INSTRUCTION: &str =
    "Review the inspection data below and assess the condition of the equipment.";

/// AI解析プロンプト生成
///
/// セクションの `analysis_prompt` をテンプレートとして差し込み、入力データと出力形式を付ける
pub fn build_analysis_prompt(section: &Section, data: &SectionData, form_data: &FormData) -> String {
    let instruction = section
        .analysis_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(|p| render_template(p, form_data))
        .unwrap_or_else(|| DEFAULT_ANALYSIS_INSTRUCTION.to_string());

    let fields_str = serde_json::to_string_pretty(form_data).unwrap_or_default();
    let transcript = if data.transcript.trim().is_empty() {
        "(none)"
    } else {
        data.transcript.trim()
    };
    let notes = if data.notes.trim().is_empty() { "(none)" } else { data.notes.trim() };

    format!(
        r#"You are an NDT inspection engineer preparing an inspection report.
{instruction}

## Step
{title}

## Recorded data
{fields_str}

## Inspector voice notes
{transcript}

## Inspector remarks
{notes}

## Output format (JSON only)
```json
{{
  "report": "free-text findings",
  "suggestions": [
    {{"field": "fieldName or null", "text": "recommendation", "value": "optional value"}}
  ]
}}
```
"#,
        title = section.title,
    )
}

/// 自動入力プロンプト生成
///
/// 計算機プロンプト + 直前の解析結果から、次ステップのフィールド値をJSONで求める
pub fn build_populate_prompt(
    calculator_prompt: &str,
    analysis: &AnalysisOutput,
    next_section: &Section,
) -> String {
    let field_list = next_section
        .fields
        .iter()
        .map(|f| {
            let label = if f.label.is_empty() { &f.name } else { &f.label };
            match &f.unit {
                Some(unit) => format!("- {} ({}, {})", f.name, label, unit),
                None => format!("- {} ({})", f.name, label),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{calculator_prompt}

## Previous analysis
{report}

## Fields to fill
{field_list}

Return a single JSON object mapping field names to values. Omit fields you cannot determine.
"#,
        report = analysis.report.trim(),
    )
}
