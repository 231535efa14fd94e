//! Provider identifiers and per-stage response schemas.

use serde::{Deserialize, Serialize};

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    Groq,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Groq => write!(f, "groq"),
        }
    }
}

/// Chat message sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Provider configuration summary (keys never exposed).
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub preferred_provider: String,
    pub openai_configured: bool,
    pub anthropic_configured: bool,
    pub groq_configured: bool,
    pub active_provider: Option<String>,
    pub active_model: Option<String>,
}

// Wire schemas. Missing fields fail deserialization and become RemoteMalformed.

#[derive(Debug, Clone, Deserialize)]
pub struct WireSymptom {
    pub code: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSymptoms {
    pub symptoms: Vec<WireSymptom>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFactor {
    pub factor: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRisk {
    pub risk_level: String,
    pub factors: Vec<WireFactor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRecommendations {
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSafety {
    pub approved: bool,
    #[serde(default)]
    pub redactions: Vec<String>,
}
