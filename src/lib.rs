//! NDT点検ウィザード
//!
//! ステップ進行と表示判定・セクション単位の記録保存・AI解析と次ステップの自動入力

pub mod ai_provider;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod llm;
pub mod logging;
pub mod populate;
pub mod report;
pub mod session;
pub mod store;
