//! Memory retrieval policy handed to abilities.

use serde::{Deserialize, Serialize};

/// How an ability retrieves prior context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStrategy {
    /// Replay the running debate/analysis history
    History,
    /// Retrieve the `top_k` most similar past situations (default)
    #[default]
    Situation,
}

impl std::fmt::Display for MemoryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryStrategy::History => write!(f, "history"),
            MemoryStrategy::Situation => write!(f, "situation"),
        }
    }
}

impl std::str::FromStr for MemoryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "history" => Ok(MemoryStrategy::History),
            "situation" => Ok(MemoryStrategy::Situation),
            _ => Err(format!(
                "Invalid memory strategy '{}'. Valid values: history, situation",
                s
            )),
        }
    }
}

/// Memory configuration for one unit. Immutable once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub strategy: MemoryStrategy,
    #[serde(
        default,
        rename = "topK",
        alias = "top_k",
        skip_serializing_if = "Option::is_none"
    )]
    pub top_k: Option<u32>,
}

impl MemoryConfig {
    /// The global default: situation retrieval with the two closest matches.
    pub const DEFAULT: MemoryConfig = MemoryConfig {
        strategy: MemoryStrategy::Situation,
        top_k: Some(2),
    };

    pub const fn history() -> Self {
        Self {
            strategy: MemoryStrategy::History,
            top_k: None,
        }
    }

    pub const fn situation(top_k: u32) -> Self {
        Self {
            strategy: MemoryStrategy::Situation,
            top_k: Some(top_k),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
