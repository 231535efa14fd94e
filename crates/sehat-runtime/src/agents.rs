//! Stage agents. Each runs one stage on the remote path or the rule path.
//!
//! The remote path is tried when the caller's mode hint prefers it, a reasoner
//! is configured, and that stage's breaker is closed. Any remote failure falls
//! back to [`RuleFallback`] for that call only.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use sehat_core::{
    Error, ModeHint, Query, RecommendationSet, RiskAssessment, RiskFactor, RiskLevel, Result,
    SafetyVerdict, Source, StageInput, StageOutput, SymptomSet, TraceEntry, SAFE_FALLBACK_MESSAGE,
};
use sehat_reasoner::RemoteReasoner;
use sehat_rules::{RuleFallback, SafetyPolicy};

use crate::breaker::CircuitBreakers;

/// What one agent produced, which path produced it, and its trace row.
#[derive(Debug, Clone)]
pub struct AgentRun<T> {
    pub output: T,
    pub source: Source,
    pub entry: TraceEntry,
}

/// Chooses the path for a stage call and applies the per-call remote timeout.
pub struct StageExecutor {
    remote: Option<Arc<dyn RemoteReasoner>>,
    rules: Arc<RuleFallback>,
    breakers: Arc<CircuitBreakers>,
    remote_timeout: Duration,
}

impl StageExecutor {
    pub fn new(
        remote: Option<Arc<dyn RemoteReasoner>>,
        rules: Arc<RuleFallback>,
        breakers: Arc<CircuitBreakers>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            rules,
            breakers,
            remote_timeout,
        }
    }

    pub fn rules(&self) -> &RuleFallback {
        &self.rules
    }

    pub fn remote_name(&self) -> Option<String> {
        self.remote.as_ref().map(|r| r.name())
    }

    pub async fn execute(&self, input: &StageInput, hint: ModeHint) -> (StageOutput, Source) {
        let stage = input.stage();
        if let Some(remote) = self.remote.as_ref().filter(|_| hint.prefers_remote(stage)) {
            if self.breakers.allows_remote(stage) {
                match self.call_remote(remote.as_ref(), input).await {
                    Ok(output) => {
                        self.breakers.record_success(stage);
                        return (output, Source::Remote);
                    }
                    Err(Error::RemoteMalformed(reason)) => {
                        self.breakers.record_inconclusive(stage);
                        warn!(target: "sehat::data_quality", stage = %stage, reason = %reason, "Remote output failed schema validation");
                        warn!(stage = %stage, "Falling back to local rules: malformed remote output");
                    }
                    Err(e) => {
                        self.breakers.record_failure(stage);
                        warn!(stage = %stage, error = %e, "Falling back to local rules");
                    }
                }
            } else {
                debug!(stage = %stage, "Circuit breaker open, skipping remote");
            }
        }
        (self.rules.infer_local(input), Source::Rule)
    }

    async fn call_remote(&self, remote: &dyn RemoteReasoner, input: &StageInput) -> Result<StageOutput> {
        let output = tokio::time::timeout(self.remote_timeout, remote.infer(input))
            .await
            .map_err(|_| {
                Error::RemoteUnavailable(format!("no response within {:?}", self.remote_timeout))
            })??;
        if output.stage() != input.stage() {
            return Err(Error::RemoteMalformed(format!(
                "answered stage {} for a {} request",
                output.stage(),
                input.stage()
            )));
        }
        Ok(output)
    }
}

fn trace_entry(input: &StageInput, output: &StageOutput, source: Source, finding: Option<String>) -> TraceEntry {
    TraceEntry {
        stage: input.stage(),
        mode: source,
        input_summary: input.summary(),
        output_summary: output.summary(),
        finding,
    }
}

pub struct SymptomAgent {
    exec: Arc<StageExecutor>,
}

impl SymptomAgent {
    pub fn new(exec: Arc<StageExecutor>) -> Self {
        Self { exec }
    }

    pub async fn run(&self, query: &Query, hint: ModeHint) -> AgentRun<SymptomSet> {
        let input = StageInput::Symptom { query: query.clone() };
        let (output, source) = self.exec.execute(&input, hint).await;
        let (symptoms, source) = match output {
            StageOutput::Symptoms(set) => (set, source),
            _ => (self.exec.rules().extract(query.raw_text()), Source::Rule),
        };
        let finding = symptoms.entries().first().map(|e| e.code.clone());
        let entry = trace_entry(&input, &StageOutput::Symptoms(symptoms.clone()), source, finding);
        AgentRun {
            output: symptoms,
            source,
            entry,
        }
    }
}

pub struct RiskAgent {
    exec: Arc<StageExecutor>,
}

impl RiskAgent {
    pub fn new(exec: Arc<StageExecutor>) -> Self {
        Self { exec }
    }

    pub async fn run(&self, symptoms: &SymptomSet, hint: ModeHint) -> AgentRun<RiskAssessment> {
        let input = StageInput::Risk {
            symptoms: symptoms.clone(),
        };
        let (output, _) = self.exec.execute(&input, hint).await;
        let risk = match output {
            StageOutput::Risk(risk) => self.with_emergency_floor(risk, symptoms),
            _ => self.exec.rules().assess(symptoms, Source::Rule),
        };
        let source = risk.source;
        let finding = risk.dominant_factor().map(|f| f.factor.clone());
        let entry = trace_entry(&input, &StageOutput::Risk(risk.clone()), source, finding);
        AgentRun {
            output: risk,
            source,
            entry,
        }
    }

    /// Any emergency symptom makes the assessment EMERGENCY, whichever path scored it.
    fn with_emergency_floor(&self, risk: RiskAssessment, symptoms: &SymptomSet) -> RiskAssessment {
        if risk.risk_level == RiskLevel::Emergency {
            return risk;
        }
        let knowledge = self.exec.rules().knowledge();
        let Some(code) = symptoms.codes().into_iter().find(|c| knowledge.is_emergency(c)) else {
            return risk;
        };
        let mut factors = vec![RiskFactor {
            factor: format!("emergency symptom: {code}"),
            weight: 1.0,
        }];
        factors.extend(risk.contributing_factors);
        RiskAssessment {
            risk_level: RiskLevel::Emergency,
            contributing_factors: factors,
            source: risk.source,
        }
    }
}

pub struct RecommendationAgent {
    exec: Arc<StageExecutor>,
}

impl RecommendationAgent {
    pub fn new(exec: Arc<StageExecutor>) -> Self {
        Self { exec }
    }

    pub async fn run(
        &self,
        symptoms: &SymptomSet,
        risk: &RiskAssessment,
        language: &str,
        hint: ModeHint,
    ) -> AgentRun<RecommendationSet> {
        let input = StageInput::Recommendation {
            symptoms: symptoms.clone(),
            risk: risk.clone(),
            language: language.to_string(),
        };
        let (output, source) = self.exec.execute(&input, hint).await;
        let (recs, source) = match output {
            StageOutput::Recommendations(recs) => (recs, source),
            _ => (self.exec.rules().recommend(symptoms, risk, language), Source::Rule),
        };
        let finding = recs.top().map(String::from);
        let entry = trace_entry(&input, &StageOutput::Recommendations(recs.clone()), source, finding);
        AgentRun {
            output: recs,
            source,
            entry,
        }
    }
}

pub struct SafetyAgent {
    exec: Arc<StageExecutor>,
    policy: Arc<SafetyPolicy>,
}

impl SafetyAgent {
    pub fn new(exec: Arc<StageExecutor>, policy: Arc<SafetyPolicy>) -> Self {
        Self { exec, policy }
    }

    /// Review `recs`. The local policy check always runs and can veto any path.
    pub async fn run(
        &self,
        risk: &RiskAssessment,
        recs: &RecommendationSet,
        hint: ModeHint,
    ) -> AgentRun<SafetyVerdict> {
        let input = StageInput::Safety {
            risk: risk.clone(),
            recommendations: recs.clone(),
        };
        let (output, source) = self.exec.execute(&input, hint).await;
        let reviewed = match output {
            StageOutput::Safety(verdict) => verdict,
            _ => SafetyVerdict::approve(),
        };
        let local = self.policy.check(recs);

        let mut redactions = reviewed.redactions;
        for r in local.redactions {
            if !redactions.contains(&r) {
                redactions.push(r);
            }
        }
        // The fixed escalation message cannot be vetoed by a remote review.
        let approved = local.approved && (reviewed.approved || recs.is_escalation());
        let verdict = SafetyVerdict {
            approved,
            redactions,
            escalation: reviewed.escalation || local.escalation || risk.risk_level == RiskLevel::Emergency,
        };

        let finding = if verdict.approved {
            recs.top().map(String::from)
        } else {
            Some(SAFE_FALLBACK_MESSAGE.to_string())
        };
        let entry = trace_entry(&input, &StageOutput::Safety(verdict.clone()), source, finding);
        AgentRun {
            output: verdict,
            source,
            entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerStatus;
    use async_trait::async_trait;
    use sehat_core::{StageKind, SymptomEntry};
    use sehat_knowledge::KnowledgeBase;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        calls: AtomicUsize,
        error: fn() -> Error,
    }

    #[async_trait]
    impl RemoteReasoner for Failing {
        fn name(&self) -> String {
            "failing".into()
        }
        async fn infer(&self, _input: &StageInput) -> Result<StageOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    /// Always answers with a fixed output, whatever the stage.
    struct Fixed(StageOutput);

    #[async_trait]
    impl RemoteReasoner for Fixed {
        fn name(&self) -> String {
            "fixed".into()
        }
        async fn infer(&self, _input: &StageInput) -> Result<StageOutput> {
            Ok(self.0.clone())
        }
    }

    /// Never answers within any sensible per-call timeout.
    struct Stalled {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteReasoner for Stalled {
        fn name(&self) -> String {
            "stalled".into()
        }
        async fn infer(&self, _input: &StageInput) -> Result<StageOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(StageOutput::Symptoms(SymptomSet::new()))
        }
    }

    fn rules() -> Arc<RuleFallback> {
        Arc::new(RuleFallback::new(Arc::new(KnowledgeBase::builtin().unwrap())))
    }

    fn exec(remote: Arc<dyn RemoteReasoner>, breakers: Arc<CircuitBreakers>) -> Arc<StageExecutor> {
        Arc::new(StageExecutor::new(
            Some(remote),
            rules(),
            breakers,
            Duration::from_millis(200),
        ))
    }

    fn query(text: &str) -> Query {
        Query::new(text, Some("en"), None).unwrap()
    }

    #[tokio::test]
    async fn test_unavailable_falls_back_and_counts() {
        let remote = Arc::new(Failing {
            calls: AtomicUsize::new(0),
            error: || Error::RemoteUnavailable("down".into()),
        });
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let agent = SymptomAgent::new(exec(remote.clone(), breakers.clone()));

        for _ in 0..5 {
            let run = agent.run(&query("fever"), ModeHint::Full).await;
            assert_eq!(run.source, Source::Rule);
            assert_eq!(run.output.codes(), vec!["fever"]);
        }
        // Breaker opened after the third failure; no further remote calls.
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
        assert_eq!(breakers.consecutive_failures(StageKind::Symptom), 3);
    }

    #[tokio::test]
    async fn test_per_call_timeout_counts_as_unavailable() {
        let remote = Arc::new(Stalled {
            calls: AtomicUsize::new(0),
        });
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let exec = Arc::new(StageExecutor::new(
            Some(remote.clone() as Arc<dyn RemoteReasoner>),
            rules(),
            breakers.clone(),
            Duration::from_millis(50),
        ));
        let agent = SymptomAgent::new(exec);

        for _ in 0..3 {
            let run = agent.run(&query("fever"), ModeHint::Full).await;
            assert_eq!(run.source, Source::Rule);
            assert_eq!(run.output.codes(), vec!["fever"]);
        }
        assert_eq!(breakers.status(StageKind::Symptom), BreakerStatus::Open);

        let started = std::time::Instant::now();
        let run = agent.run(&query("fever"), ModeHint::Full).await;
        assert_eq!(run.source, Source::Rule);
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_does_not_count() {
        let remote = Arc::new(Failing {
            calls: AtomicUsize::new(0),
            error: || Error::RemoteMalformed("bad json".into()),
        });
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let agent = SymptomAgent::new(exec(remote.clone(), breakers.clone()));
        for _ in 0..4 {
            assert_eq!(agent.run(&query("cough"), ModeHint::Full).await.source, Source::Rule);
        }
        assert_eq!(remote.calls.load(Ordering::SeqCst), 4);
        assert_eq!(breakers.consecutive_failures(StageKind::Symptom), 0);
    }

    #[tokio::test]
    async fn test_wrong_stage_answer_is_rejected() {
        let remote = Arc::new(Fixed(StageOutput::Safety(SafetyVerdict::approve())));
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let agent = SymptomAgent::new(exec(remote, breakers));
        let run = agent.run(&query("fever"), ModeHint::Full).await;
        assert_eq!(run.source, Source::Rule);
    }

    #[tokio::test]
    async fn test_offline_hint_skips_remote() {
        let remote = Arc::new(Failing {
            calls: AtomicUsize::new(0),
            error: || Error::RemoteUnavailable("down".into()),
        });
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let agent = SymptomAgent::new(exec(remote.clone(), breakers));
        agent.run(&query("fever"), ModeHint::Offline).await;
        agent.run(&query("fever"), ModeHint::Quick).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_risk_gets_emergency_floor() {
        let remote_risk = RiskAssessment {
            risk_level: RiskLevel::Medium,
            contributing_factors: vec![RiskFactor {
                factor: "pain".into(),
                weight: 0.4,
            }],
            source: Source::Remote,
        };
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let agent = RiskAgent::new(exec(Arc::new(Fixed(StageOutput::Risk(remote_risk))), breakers));
        let symptoms: SymptomSet = vec![SymptomEntry {
            code: "chest_pain".into(),
            confidence: 0.95,
            source: Source::Remote,
        }]
        .into_iter()
        .collect();

        let run = agent.run(&symptoms, ModeHint::Full).await;
        assert_eq!(run.source, Source::Remote);
        assert_eq!(run.output.risk_level, RiskLevel::Emergency);
        assert_eq!(run.entry.finding.as_deref(), Some("emergency symptom: chest_pain"));
    }

    #[tokio::test]
    async fn test_policy_vetoes_remote_approval() {
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let agent = SafetyAgent::new(
            exec(Arc::new(Fixed(StageOutput::Safety(SafetyVerdict::approve()))), breakers),
            Arc::new(SafetyPolicy::builtin().unwrap()),
        );
        let risk = RiskAssessment::insufficient_information(Source::Remote);
        let recs = RecommendationSet::new(
            vec!["Take paracetamol 3000 mg at once".into()],
            RiskLevel::Low,
            Source::Remote,
        );
        let run = agent.run(&risk, &recs, ModeHint::Full).await;
        assert_eq!(run.source, Source::Remote);
        assert!(!run.output.approved);
        assert_eq!(run.output.redactions.len(), 1);
        assert_eq!(run.entry.finding.as_deref(), Some(SAFE_FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn test_escalation_survives_remote_rejection() {
        let rejecting = SafetyVerdict {
            approved: false,
            redactions: vec!["seek immediate care".into()],
            escalation: false,
        };
        let breakers = Arc::new(CircuitBreakers::new(3, Duration::from_secs(60)));
        let agent = SafetyAgent::new(
            exec(Arc::new(Fixed(StageOutput::Safety(rejecting))), breakers),
            Arc::new(SafetyPolicy::builtin().unwrap()),
        );
        let risk = RiskAssessment {
            risk_level: RiskLevel::Emergency,
            contributing_factors: vec![],
            source: Source::Rule,
        };
        let run = agent.run(&risk, &RecommendationSet::escalation(), ModeHint::Full).await;
        assert!(run.output.approved);
        assert!(run.output.escalation);
    }
}
