//! Hosted-LLM implementation of [`RemoteReasoner`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use sehat_core::{Error, Result, StageInput, StageOutput};
use sehat_knowledge::KnowledgeBase;

use crate::config::LLMConfig;
use crate::prompt::{build_messages, parse_output};
use crate::providers::complete;
use crate::types::LLMProvider;
use crate::RemoteReasoner;

const TEMPERATURE: f64 = 0.0;
const MAX_TOKENS: usize = 600;

pub struct LlmReasoner {
    client: Client,
    provider: LLMProvider,
    model: String,
    api_key: String,
    knowledge: Arc<KnowledgeBase>,
}

impl LlmReasoner {
    /// Build from config. `None` when no provider has a key.
    pub fn from_config(
        config: &LLMConfig,
        timeout: Duration,
        knowledge: Arc<KnowledgeBase>,
    ) -> Result<Option<Self>> {
        let Some((provider, model, api_key)) = config.resolve_provider() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;
        Ok(Some(Self {
            client,
            provider,
            model,
            api_key,
            knowledge,
        }))
    }
}

#[async_trait]
impl RemoteReasoner for LlmReasoner {
    fn name(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    async fn infer(&self, input: &StageInput) -> Result<StageOutput> {
        let messages = build_messages(input, &self.knowledge);
        debug!(stage = %input.stage(), provider = %self.provider, "Remote inference");
        let text = complete(
            &self.client,
            self.provider,
            &messages,
            &self.model,
            &self.api_key,
            TEMPERATURE,
            MAX_TOKENS,
        )
        .await?;
        parse_output(input, &text, &self.knowledge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_key_means_no_reasoner() {
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        let config = LLMConfig::default();
        let reasoner = LlmReasoner::from_config(&config, Duration::from_secs(5), kb).unwrap();
        assert!(reasoner.is_none());
    }

    #[test]
    fn test_name_includes_provider_and_model() {
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        let config = LLMConfig {
            groq_api_key: Some("k".into()),
            ..Default::default()
        };
        let reasoner = LlmReasoner::from_config(&config, Duration::from_secs(5), kb)
            .unwrap()
            .unwrap();
        assert_eq!(reasoner.name(), "groq/llama-3.3-70b-versatile");
    }
}
