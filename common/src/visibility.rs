//! セクションの表示判定
//!
//! 依存フィールドがない、または依存フィールドの値がトリガー値のいずれかに一致する
//! （negate時は一致しない）場合に表示する。毎回フォームデータ全体から再計算する。

use crate::types::{Dependency, FormData, Section};
use serde_json::Value;

/// セクションが表示対象か
pub fn is_visible(section: &Section, form_data: &FormData) -> bool {
    match &section.depends_on {
        None => true,
        Some(dependency) => dependency_matches(dependency, form_data),
    }
}

/// 表示対象のセクションインデックス（設定順）
pub fn visible_indices(sections: &[Section], form_data: &FormData) -> Vec<usize> {
    sections
        .iter()
        .enumerate()
        .filter(|(_, s)| is_visible(s, form_data))
        .map(|(i, _)| i)
        .collect()
}

fn dependency_matches(dependency: &Dependency, form_data: &FormData) -> bool {
    // 設定不備は表示扱い
    if dependency.field.trim().is_empty() || dependency.values.is_empty() {
        return true;
    }

    let current = form_data.get(&dependency.field).unwrap_or(&Value::Null);
    let matched = match current {
        Value::Array(items) => items.iter().any(|item| matches_any(item, &dependency.values)),
        other => matches_any(other, &dependency.values),
    };

    matched != dependency.negate
}

fn matches_any(value: &Value, triggers: &[Value]) -> bool {
    let Some(value) = scalar_text(value) else {
        return false;
    };
    triggers
        .iter()
        .filter_map(scalar_text)
        .any(|trigger| trigger == value)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
