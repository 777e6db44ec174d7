//! 計算機定義（JSON）
//!
//! 各ファイルは `{ id, name, uiDefinition: [...], aiPrompt: "..." }`。
//! フォーム生成とプロンプトテンプレートの差し込みだけを行い、解釈はしない。

use crate::error::{Error, Result};
use crate::types::{FieldDef, FormData};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap();
}

/// 計算機定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Calculator {
    pub id: String,
    pub name: String,
    pub ui_definition: Vec<FieldDef>,
    pub ai_prompt: String,
}

impl Calculator {
    pub fn from_json(json: &str) -> Result<Self> {
        let calculator: Self = serde_json::from_str(json)?;
        if calculator.id.trim().is_empty() {
            return Err(Error::Config("計算機IDが空です".into()));
        }
        Ok(calculator)
    }

    /// プロンプトに値を差し込む
    pub fn render_prompt(&self, values: &FormData) -> Result<String> {
        if self.ai_prompt.trim().is_empty() {
            return Err(Error::MissingPrompt(self.id.clone()));
        }
        Ok(render_template(&self.ai_prompt, values))
    }
}

/// `{{name}}` を値で置換（未入力は空文字）
pub fn render_template(template: &str, values: &FormData) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            values.get(&caps[1]).map(display_value).unwrap_or_default()
        })
        .into_owned()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 計算機カタログ（ID順）
#[derive(Debug, Clone, Default)]
pub struct CalculatorCatalog {
    calculators: BTreeMap<String, Calculator>,
}

impl CalculatorCatalog {
    /// ディレクトリ内の `*.json` を読み込み
    pub fn load_dir(dir: &std::path::Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "計算機フォルダが見つかりません: {}",
                dir.display()
            )));
        }

        let mut catalog = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            if !is_json {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let calculator = Calculator::from_json(&content).map_err(|e| {
                Error::Config(format!("{}: {}", path.display(), e))
            })?;
            catalog.insert(calculator);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, calculator: Calculator) {
        self.calculators.insert(calculator.id.clone(), calculator);
    }

    pub fn get(&self, id: &str) -> Option<&Calculator> {
        self.calculators.get(id)
    }

    /// プロンプトを取得（見つからなければ MissingPrompt）
    pub fn prompt_for(&self, id: &str, values: &FormData) -> Result<String> {
        self.get(id)
            .ok_or_else(|| Error::MissingPrompt(id.to_string()))?
            .render_prompt(values)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Calculator> {
        self.calculators.values()
    }

    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }
}
