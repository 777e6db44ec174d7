//! セッションファイル
//!
//! CLIの呼び出し間でウィザード状態を引き継ぐ。正本は記録の保存先にあり、
//! ここにあるのは作業中のコピー（一時バッファは保存しない）。

use crate::error::Result;
use inspection_wizard_common::{RecordContext, WizardData};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const SESSION_FILE_NAME: &str = ".wizard-session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    /// バージョン（互換性チェック用）
    version: u32,
    pub wizard_id: String,
    #[serde(default)]
    pub data: WizardData,
    #[serde(default)]
    pub context: Option<RecordContext>,
}

impl SessionFile {
    const CURRENT_VERSION: u32 = 1;

    pub fn new(wizard_id: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            wizard_id: wizard_id.into(),
            data: WizardData::default(),
            context: None,
        }
    }

    /// 既定のセッションパス
    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join(SESSION_FILE_NAME)
    }

    /// 読み込み（存在しない・壊れている・別ウィザードの場合は新規）
    pub fn load(path: &Path, wizard_id: &str) -> Self {
        if !path.exists() {
            return Self::new(wizard_id);
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return Self::new(wizard_id),
        };

        match serde_json::from_reader::<_, SessionFile>(BufReader::new(file)) {
            Ok(session) if session.version != Self::CURRENT_VERSION => {
                warn!("セッションのバージョン不一致、新規に開始します");
                Self::new(wizard_id)
            }
            Ok(session) if session.wizard_id != wizard_id => {
                warn!(
                    saved = %session.wizard_id,
                    requested = %wizard_id,
                    "別のウィザードのセッションです、新規に開始します"
                );
                Self::new(wizard_id)
            }
            Ok(session) => session,
            Err(e) => {
                warn!("セッションファイルを読めません、新規に開始します: {}", e);
                Self::new(wizard_id)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// セッションを削除（存在しなければ false）
    pub fn clear(path: &Path) -> Result<bool> {
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
