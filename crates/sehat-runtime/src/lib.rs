//! Runtime: stage agents, circuit breakers, the orchestrator state machine
//! and explanation rendering.
//!
//! Each stage tries the remote reasoner when allowed and falls back to local
//! rules per call. The orchestrator never surfaces remote or timeout errors.

pub mod agents;
pub mod breaker;
pub mod explain;
pub mod orchestrator;

pub use agents::{AgentRun, RecommendationAgent, RiskAgent, SafetyAgent, StageExecutor, SymptomAgent};
pub use breaker::{BreakerSnapshot, BreakerStatus, CircuitBreakers};
pub use explain::ExplanationBuilder;
pub use orchestrator::Orchestrator;
