//! Shared application state.

use std::sync::Arc;

use sehat_core::{Result, SehatConfig};
use sehat_knowledge::KnowledgeBase;
use sehat_reasoner::{LLMConfig, LlmReasoner, ProviderStatus, RemoteReasoner};
use sehat_rules::SafetyPolicy;
use sehat_runtime::{CircuitBreakers, Orchestrator};
use sehat_store::AuditStore;
use tracing::{info, warn};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: SehatConfig,
    pub orchestrator: Orchestrator,
    /// Absent when the audit database could not be opened; analysis still works.
    pub store: Option<Arc<AuditStore>>,
    pub provider_status: ProviderStatus,
}

impl AppState {
    /// Wire knowledge, policy, reasoner, breakers and the audit store from `config`.
    pub fn new(config: SehatConfig, llm_config: LLMConfig) -> Result<Self> {
        let paths = &config.data_paths;
        let knowledge = Arc::new(KnowledgeBase::load_or_builtin(&paths.knowledge_file)?);
        let policy = Arc::new(SafetyPolicy::load_or_builtin(&paths.safety_policy_file)?);

        let remote: Option<Arc<dyn RemoteReasoner>> =
            LlmReasoner::from_config(&llm_config, config.pipeline.remote_timeout, knowledge.clone())?
                .map(|r| Arc::new(r) as Arc<dyn RemoteReasoner>);
        if remote.is_none() {
            info!("No LLM provider configured, every stage will use local rules");
        }

        let breakers = Arc::new(CircuitBreakers::from_settings(&config.pipeline));
        let mut orchestrator = Orchestrator::new(config.pipeline, knowledge, policy, remote, breakers);

        let store = match AuditStore::open(&paths.db_dir) {
            Ok(store) => {
                let store = Arc::new(store);
                orchestrator = orchestrator.with_audit(store.clone());
                Some(store)
            }
            Err(e) => {
                warn!("Audit store unavailable, continuing without audit: {}", e);
                None
            }
        };

        Ok(Self {
            provider_status: llm_config.status(),
            config,
            orchestrator,
            store,
        })
    }
}
