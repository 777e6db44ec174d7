//! 点検レポート出力（Markdown）
//!
//! ヘッダーにドキュメントサマリー、続けて表示中セクションの入力・画像・グリッド・AI所見を並べる

use crate::error::Result;
use inspection_wizard_common::{
    collect_form_data, visible_indices, GridRow, ImageRef, Section, SectionData, WizardData,
    WizardDefinition,
};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;

pub fn render_report(definition: &WizardDefinition, data: &WizardData) -> String {
    let summary = &data.summary;
    let mut out = String::new();

    let _ = writeln!(out, "# {}", if definition.title.is_empty() { "Inspection Report" } else { definition.title.as_str() });
    let _ = writeln!(out);
    let _ = writeln!(out, "| Item | Value |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Equipment type | {} |", cell(&summary.equipment_label));
    let _ = writeln!(out, "| Equipment ID | {} |", cell(&summary.equipment_id));
    let _ = writeln!(out, "| Owner | {} |", cell(&summary.owner));
    let _ = writeln!(out, "| Inspection date | {} |", cell(&summary.inspection_date));
    let _ = writeln!(out, "| Progress | {}% ({}) |", summary.progress, summary.status);
    if let Some(record_id) = &data.record_id {
        let _ = writeln!(out, "| Record | {} |", cell(record_id));
    }

    let form = collect_form_data(&definition.sections, data);
    let empty = SectionData::default();
    for index in visible_indices(&definition.sections, &form) {
        let section = &definition.sections[index];
        let section_data = data.sections.get(index).unwrap_or(&empty);
        let marker = if data.is_completed(index) { "" } else { " (incomplete)" };
        let _ = writeln!(out, "\n## {}{}", section_title(section, index), marker);
        render_section(&mut out, section, section_data);
    }

    if data.analysis.has_report() || !data.analysis.suggestions.is_empty() {
        let _ = writeln!(out, "\n## Findings");
        if data.analysis.has_report() {
            let _ = writeln!(out, "\n{}", data.analysis.report.trim());
        }
        if !data.analysis.suggestions.is_empty() {
            let _ = writeln!(out, "\n### Recommendations");
            for suggestion in &data.analysis.suggestions {
                match &suggestion.field {
                    Some(field) => {
                        let _ = writeln!(out, "- **{}**: {}", field, suggestion.text);
                    }
                    None => {
                        let _ = writeln!(out, "- {}", suggestion.text);
                    }
                }
            }
        }
    }

    out
}

pub fn write_report(definition: &WizardDefinition, data: &WizardData, path: &Path) -> Result<()> {
    std::fs::write(path, render_report(definition, data))?;
    Ok(())
}

fn section_title(section: &Section, index: usize) -> String {
    if section.title.is_empty() {
        format!("Step {}", index + 1)
    } else {
        section.title.clone()
    }
}

fn render_section(out: &mut String, section: &Section, data: &SectionData) {
    if !data.fields.is_empty() {
        let _ = writeln!(out);
        // 定義順 → 定義外のフィールド
        let mut keys: Vec<&str> = section
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .filter(|name| data.fields.contains_key(*name))
            .collect();
        for key in data.fields.keys() {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        for key in keys {
            let label = section
                .fields
                .iter()
                .find(|f| f.name == key)
                .map(|f| {
                    let label = if f.label.is_empty() { f.name.as_str() } else { f.label.as_str() };
                    match &f.unit {
                        Some(unit) => format!("{} [{}]", label, unit),
                        None => label.to_string(),
                    }
                })
                .unwrap_or_else(|| key.to_string());
            let _ = writeln!(out, "- **{}**: {}", label, display(&data.fields[key]));
        }
    }

    if !data.transcript.trim().is_empty() {
        let _ = writeln!(out, "\n> {}", data.transcript.trim());
    }
    if !data.notes.trim().is_empty() {
        let _ = writeln!(out, "\n{}", data.notes.trim());
    }

    let durable: Vec<&ImageRef> = data.images.iter().filter(|i| i.is_durable()).collect();
    if !durable.is_empty() {
        let _ = writeln!(out);
        for (i, image) in durable.iter().enumerate() {
            let _ = writeln!(out, "![{} photo {}]({})", data.title, i + 1, image.locator());
        }
    }

    if !data.grid.is_empty() {
        render_grid(out, section, &data.grid);
    }
}

fn render_grid(out: &mut String, section: &Section, rows: &[GridRow]) {
    let columns: Vec<(String, String)> = if section.grid_columns.is_empty() {
        rows[0].keys().map(|k| (k.clone(), k.clone())).collect()
    } else {
        section
            .grid_columns
            .iter()
            .map(|c| {
                let label = if c.label.is_empty() { c.key.clone() } else { c.label.clone() };
                let label = match &c.unit {
                    Some(unit) => format!("{} [{}]", label, unit),
                    None => label,
                };
                (c.key.clone(), label)
            })
            .collect()
    };

    let _ = writeln!(out);
    let header: Vec<&str> = columns.iter().map(|(_, label)| label.as_str()).collect();
    let _ = writeln!(out, "| {} |", header.join(" | "));
    let _ = writeln!(out, "|{}", "---|".repeat(columns.len()));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|(key, _)| row.get(key).map(display).unwrap_or_default())
            .collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => cell(s),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
