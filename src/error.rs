use thiserror::Error;

#[derive(Error, Debug)]
pub enum WizardError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`inspection-wizard config --set-api-key YOUR_KEY` で設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("ウィザードに表示可能なセクションがありません")]
    NoSections,

    #[error("記録の保存に失敗: {0}")]
    Persistence(String),

    #[error("画像の保存・取得に失敗: {0}")]
    ContentStore(String),

    #[error("LLM呼び出しエラー: {0}")]
    Llm(String),

    #[error("LLMレスポンスのパースに失敗: {0}")]
    LlmParse(String),

    #[error("プロンプトが見つかりません: {0}")]
    MissingPrompt(String),

    #[error("処理が中断されました")]
    Cancelled,

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] inspection_wizard_common::Error),
}

impl WizardError {
    /// 共通エラーのうちプロンプト欠落は専用の種別に寄せる
    pub fn from_common(err: inspection_wizard_common::Error) -> Self {
        match err {
            inspection_wizard_common::Error::MissingPrompt(id) => WizardError::MissingPrompt(id),
            inspection_wizard_common::Error::Parse(msg) => WizardError::LlmParse(msg),
            other => WizardError::Common(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, WizardError>;
