//! Remote reasoner: stage inference over hosted LLM APIs.
//!
//! Every call declares its stage, sends only the prior-stage context it needs,
//! and must come back as a JSON object matching that stage's schema. Transport
//! and auth failures surface as `RemoteUnavailable`; anything unparseable as
//! `RemoteMalformed`. There are no retries here.

pub mod config;
pub mod llm;
pub mod prompt;
pub mod providers;
pub mod types;

use async_trait::async_trait;
use sehat_core::{Result, StageInput, StageOutput};

pub use config::LLMConfig;
pub use llm::LlmReasoner;
pub use types::*;

/// A remote capability that can answer any pipeline stage.
#[async_trait]
pub trait RemoteReasoner: Send + Sync {
    /// Label for logs and status output, e.g. `anthropic/claude-...`.
    fn name(&self) -> String;

    /// Answer one stage. The returned output must be for `input.stage()`.
    async fn infer(&self, input: &StageInput) -> Result<StageOutput>;
}
