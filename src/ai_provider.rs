use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AiProvider {
    /// Responses API（previous_response_id で会話を継続）
    #[default]
    Responses,
    /// claude CLI（継続なし）
    ClaudeCli,
}

impl AiProvider {
    pub fn command_name(&self) -> &'static str {
        match self {
            AiProvider::Responses => "responses",
            AiProvider::ClaudeCli => "claude",
        }
    }
}
