//! LLMレスポンスパーサー
//!
//! レスポンスからJSONを抽出し、フィールド値・解析結果をパースする

use crate::error::{Error, Result};
use crate::types::{AnalysisOutput, FormData, Suggestion};
use serde::Deserialize;

/// レスポンスからJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の {...} オブジェクト / [...] 配列（先に現れる方）
/// 3. エラー
///
/// # Examples
/// ```
/// use inspection_wizard_common::extract_json;
///
/// let response = "結果: {\"thickness\": 10.2}";
/// let json = extract_json(response).unwrap();
/// assert_eq!(json, "{\"thickness\": 10.2}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7;
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    let object = response.find('{').map(|s| (s, '}'));
    let array = response.find('[').map(|s| (s, ']'));
    let candidate = match (object, array) {
        (Some(o), Some(a)) => Some(if o.0 < a.0 { o } else { a }),
        (o, a) => o.or(a),
    };

    if let Some((start, close)) = candidate {
        if let Some(end) = response.rfind(close) {
            if end > start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("JSONが見つかりません".into()))
}

/// 自動入力レスポンス（フィールド名 → 値のオブジェクト）をパース
///
/// `{"fields": {...}}` の包みにも対応する
pub fn parse_field_values(response: &str) -> Result<FormData> {
    let json_str = extract_json(response)?;
    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| Error::Parse(format!("フィールドJSONパースエラー: {}", e)))?;

    let object = match value {
        serde_json::Value::Object(mut map) => match map.remove("fields") {
            Some(serde_json::Value::Object(inner)) => inner,
            Some(other) => {
                map.insert("fields".into(), other);
                map
            }
            None => map,
        },
        _ => return Err(Error::Parse("フィールドJSONがオブジェクトではありません".into())),
    };
    Ok(object)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(default, alias = "summary", alias = "analysis")]
    report: String,
    #[serde(default, alias = "recommendations")]
    suggestions: Vec<RawSuggestion>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSuggestion {
    Text(String),
    Structured(Suggestion),
}

/// 解析レスポンスをパース
///
/// `{report, suggestions}` 形式を期待する。JSONとして読めない場合はエラー
/// （呼び出し側で全文をレポートとして扱う）
pub fn parse_analysis_response(response: &str) -> Result<AnalysisOutput> {
    let json_str = extract_json(response)?;
    let raw: RawAnalysis = serde_json::from_str(json_str)
        .map_err(|e| Error::Parse(format!("解析JSONパースエラー: {}", e)))?;

    let suggestions = raw
        .suggestions
        .into_iter()
        .map(|s| match s {
            RawSuggestion::Text(text) => Suggestion {
                text,
                ..Default::default()
            },
            RawSuggestion::Structured(s) => s,
        })
        .collect();

    Ok(AnalysisOutput {
        report: raw.report,
        suggestions,
        response_id: None,
    })
}
