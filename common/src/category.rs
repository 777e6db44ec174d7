//! 設備種別の正規化
//!
//! 入力された種別名を明示的な対応表で正規キーに変換する。
//!
//! ## 規則
//! 1. 区切り文字（`_` `-` 連続空白）を空白1つにし、小文字化して完全一致
//! 2. 前方一致（入力が別名＋語境界で始まる）。表全体で最長の別名、同じ長さなら表の順
//! 3. 3文字以上の入力が別名の先頭に一致（補完）。表の順で最初の一致
//! 4. 入力中の語に別名が含まれる（"PVC tank" → tank）。最長の別名
//! 5. どれにも一致しなければ `general`

use lazy_static::lazy_static;

/// 既定の種別キー
pub const DEFAULT_EQUIPMENT_TYPE: &str = "general";

/// 正規種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquipmentType {
    pub key: &'static str,
    pub label: &'static str,
    pub aliases: &'static [&'static str],
}

lazy_static! {
    /// 種別の対応表（順序が前方一致の優先順位）
    pub static ref EQUIPMENT_TYPES: Vec<EquipmentType> = vec![
        EquipmentType {
            key: "pressure_vessel",
            label: "Pressure Vessel",
            aliases: &["pressure vessel", "vessel", "pv", "drum", "reactor", "column", "圧力容器"],
        },
        EquipmentType {
            key: "heat_exchanger",
            label: "Heat Exchanger",
            aliases: &["heat exchanger", "exchanger", "hx", "cooler", "condenser", "熱交換器"],
        },
        EquipmentType {
            key: "storage_tank",
            label: "Storage Tank",
            aliases: &["storage tank", "tank", "ast", "タンク"],
        },
        EquipmentType {
            key: "piping",
            label: "Piping",
            aliases: &["piping", "pipe", "process piping", "line", "配管"],
        },
        EquipmentType {
            key: "pipeline",
            label: "Pipeline",
            aliases: &["pipeline", "transmission line", "パイプライン"],
        },
        EquipmentType {
            key: "boiler",
            label: "Boiler",
            aliases: &["boiler", "steam generator", "ボイラ", "ボイラー"],
        },
        EquipmentType {
            key: "valve",
            label: "Valve",
            aliases: &["valve", "psv", "prv", "relief valve", "バルブ", "弁"],
        },
        EquipmentType {
            key: "structure",
            label: "Structure",
            aliases: &["structure", "structural", "steel structure", "weld", "構造物"],
        },
        EquipmentType {
            key: DEFAULT_EQUIPMENT_TYPE,
            label: "General Equipment",
            aliases: &["general", "other", "その他"],
        },
    ];
}

/// 種別名を正規キーに変換
pub fn normalize_equipment_type(raw: &str) -> &'static str {
    lookup(raw).map(|t| t.key).unwrap_or(DEFAULT_EQUIPMENT_TYPE)
}

/// 正規キーの表示名
pub fn equipment_label(key: &str) -> &'static str {
    EQUIPMENT_TYPES
        .iter()
        .find(|t| t.key == key)
        .or_else(|| lookup(key))
        .map(|t| t.label)
        .unwrap_or("General Equipment")
}

fn lookup(raw: &str) -> Option<&'static EquipmentType> {
    let needle = canonical_text(raw);
    if needle.is_empty() {
        return None;
    }

    let table: &'static [EquipmentType] = &EQUIPMENT_TYPES;

    // 1. 完全一致
    if let Some(found) = table.iter().find(|t| {
        canonical_text(t.key) == needle
            || t.label.to_lowercase() == needle
            || t.aliases.iter().any(|a| *a == needle)
    }) {
        return Some(found);
    }

    // 2. 前方一致（最長）
    if let Some(found) = longest_alias(table, |alias| {
        needle
            .strip_prefix(alias)
            .is_some_and(|rest| at_word_boundary(alias, rest))
    }) {
        return Some(found);
    }

    // 3. 入力途中の補完
    if needle.chars().count() >= 3 {
        if let Some(found) = table
            .iter()
            .find(|t| t.aliases.iter().any(|alias| alias.starts_with(needle.as_str())))
        {
            return Some(found);
        }
    }

    // 4. 語単位の部分一致（最長）
    longest_alias(table, |alias| {
        needle.match_indices(alias).any(|(start, _)| {
            let before = &needle[..start];
            let rest = &needle[start + alias.len()..];
            (before.is_empty() || before.ends_with(' ')) && at_word_boundary(alias, rest)
        })
    })
}

/// 条件に合う別名のうち最長のものを持つ種別（同じ長さなら表の順）
fn longest_alias<F>(table: &'static [EquipmentType], matches: F) -> Option<&'static EquipmentType>
where
    F: Fn(&str) -> bool,
{
    let mut best: Option<(&'static EquipmentType, usize)> = None;
    for equipment in table {
        for alias in equipment.aliases.iter().copied().filter(|alias| matches(*alias)) {
            let len = alias.chars().count();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((equipment, len));
            }
        }
    }
    best.map(|(equipment, _)| equipment)
}

// 日本語の別名は区切りなしで続くことがある
fn at_word_boundary(alias: &str, rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(next) if !next.is_alphanumeric() => true,
        Some(_) => !alias.is_ascii(),
    }
}

fn canonical_text(raw: &str) -> String {
    raw.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
