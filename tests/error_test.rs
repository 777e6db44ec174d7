//! エラーケーステスト
//!
//! 設定・定義ファイル・計算機の読み込み失敗時のエラーを検証

use inspection_wizard::error::WizardError;
use inspection_wizard_common::{CalculatorCatalog, Error, WizardDefinition};
use std::path::Path;
use tempfile::tempdir;

/// 存在しない定義ファイル
#[test]
fn test_definition_file_not_found() {
    let result = WizardDefinition::from_file(Path::new("/nonexistent/wizard-12345.json"));
    assert!(matches!(result, Err(Error::Io(_))));
}

/// 不正なJSONの定義ファイル
#[test]
fn test_definition_invalid_json() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("wizard.json");
    std::fs::write(&path, "{ invalid json }").unwrap();

    let result = WizardDefinition::from_file(&path);
    assert!(matches!(result, Err(Error::Json(_))));
}

/// 計算機フォルダがない
#[test]
fn test_calculator_dir_missing() {
    let result = CalculatorCatalog::load_dir(Path::new("/nonexistent/calculators"));
    assert!(matches!(result, Err(Error::Config(_))));
}

/// 計算機フォルダの読み込み（JSON以外は無視）
#[test]
fn test_calculator_dir_loads_json_files() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("ut.json"),
        r#"{"id": "ut-thickness", "name": "UT", "aiPrompt": "Estimate tmin."}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "calculators").unwrap();

    let catalog = CalculatorCatalog::load_dir(dir.path()).unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("ut-thickness").is_some());
}

/// 共通エラーの変換
#[test]
fn test_from_common_mapping() {
    assert!(matches!(
        WizardError::from_common(Error::MissingPrompt("x".into())),
        WizardError::MissingPrompt(id) if id == "x"
    ));
    assert!(matches!(
        WizardError::from_common(Error::Parse("bad".into())),
        WizardError::LlmParse(_)
    ));
    assert!(matches!(
        WizardError::from_common(Error::UnknownSection(4)),
        WizardError::Common(Error::UnknownSection(4))
    ));
}

/// エラーメッセージ
#[test]
fn test_error_messages() {
    let err = WizardError::MissingApiKey;
    assert!(err.to_string().contains("config --set-api-key"));

    let err = WizardError::Persistence("503".into());
    assert!(err.to_string().contains("503"));
}
