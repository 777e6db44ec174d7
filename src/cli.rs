use clap::{Parser, Subcommand};
use crate::ai_provider::AiProvider;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "inspection-wizard")]
#[command(about = "NDT点検ウィザード（ステップ入力・記録保存・AI解析）", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// ウィザード定義JSON
    #[arg(short, long, default_value = "wizard.json", global = true)]
    pub wizard: PathBuf,

    /// セッションファイル（デフォルト: カレント/.wizard-session.json）
    #[arg(long, global = true)]
    pub session: Option<PathBuf>,

    /// AIプロバイダ（省略時は設定ファイルの値）
    #[arg(long, global = true)]
    pub ai_provider: Option<AiProvider>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// ステップ一覧と進捗を表示
    Steps,

    /// 初期入力ステップを記録
    Input {
        /// フィールド値（key=value、複数可）
        #[arg(short, long = "set", value_parser = parse_key_value)]
        values: Vec<(String, String)>,
    },

    /// セクションに入力
    Fill {
        /// 対象セクション（省略時は現在のセクション）
        #[arg(long)]
        section: Option<usize>,

        /// フィールド値（key=value、複数可）
        #[arg(short, long = "set", value_parser = parse_key_value)]
        values: Vec<(String, String)>,

        /// 音声メモの書き起こし
        #[arg(long)]
        transcript: Option<String>,

        /// 備考
        #[arg(long)]
        notes: Option<String>,
    },

    /// 写真を保存してセクションに追加
    Image {
        /// 画像ファイル
        #[arg(required = true)]
        path: PathBuf,

        /// 対象セクション（省略時は現在のセクション）
        #[arg(long)]
        section: Option<usize>,
    },

    /// 現在のセクションを完了して保存
    Complete {
        /// 次ステップの自動入力を行わない
        #[arg(long)]
        no_populate: bool,

        /// 計算機定義フォルダ
        #[arg(long, default_value = "calculators")]
        calculators: PathBuf,
    },

    /// 前のセクションに戻る
    Back,

    /// 保存済みの記録を開く
    Open {
        #[arg(required = true)]
        record_id: String,
    },

    /// 現在のセクションをAI解析
    Analyze,

    /// ドキュメントサマリーを表示
    Summary {
        /// JSONで出力
        #[arg(long)]
        json: bool,
    },

    /// Markdownレポートを出力
    Report {
        /// 出力ファイル（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 計算機一覧を表示
    Calculators {
        /// 計算機定義フォルダ
        #[arg(long, default_value = "calculators")]
        dir: PathBuf,
    },

    /// セッション管理
    Session {
        /// セッションを削除
        #[arg(long)]
        clear: bool,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 記録APIのURLを設定
        #[arg(long)]
        set_backend_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

/// `key=value` を分解
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("key=value 形式で指定してください: {}", s)),
    }
}

/// 入力文字列をJSON値に変換（数値・真偽値はそのまま、それ以外は文字列）
pub fn field_value(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return serde_json::Value::Null;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => value,
        _ => serde_json::Value::String(raw.to_string()),
    }
}
