//! Orchestrator: runs the four stages in order under a global deadline.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use sehat_core::{
    AuditRecord, AuditSink, Error, ModeHint, Mode, Outcome, PipelineResult, PipelineSettings, Query,
    ReasoningTrace, RecommendationSet, Result, RiskAssessment, RiskLevel, SafetyVerdict, SymptomSet,
    SAFE_FALLBACK_MESSAGE,
};
use sehat_knowledge::KnowledgeBase;
use sehat_reasoner::RemoteReasoner;
use sehat_rules::{RuleFallback, SafetyPolicy};

use crate::agents::{AgentRun, RecommendationAgent, RiskAgent, SafetyAgent, StageExecutor, SymptomAgent};
use crate::breaker::CircuitBreakers;
use crate::explain::ExplanationBuilder;

/// Pipeline position. Each state owns everything produced so far.
enum State {
    Init,
    Symptom,
    Risk {
        symptoms: SymptomSet,
    },
    Recommend {
        symptoms: SymptomSet,
        risk: RiskAssessment,
    },
    Safety {
        symptoms: SymptomSet,
        risk: RiskAssessment,
        recs: RecommendationSet,
        outcome: Outcome,
    },
    Finished {
        symptoms: SymptomSet,
        risk: RiskAssessment,
        recs: RecommendationSet,
        verdict: SafetyVerdict,
        outcome: Outcome,
    },
}

/// Entry point for `analyze`. Shared across requests; holds no per-request state.
pub struct Orchestrator {
    settings: PipelineSettings,
    knowledge: Arc<KnowledgeBase>,
    breakers: Arc<CircuitBreakers>,
    executor: Arc<StageExecutor>,
    symptom: SymptomAgent,
    risk: RiskAgent,
    recommend: RecommendationAgent,
    safety: SafetyAgent,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Orchestrator {
    pub fn new(
        settings: PipelineSettings,
        knowledge: Arc<KnowledgeBase>,
        policy: Arc<SafetyPolicy>,
        remote: Option<Arc<dyn RemoteReasoner>>,
        breakers: Arc<CircuitBreakers>,
    ) -> Self {
        let rules = Arc::new(RuleFallback::new(knowledge.clone()));
        let executor = Arc::new(StageExecutor::new(
            remote,
            rules,
            breakers.clone(),
            settings.remote_timeout,
        ));

        info!(
            remote = executor.remote_name().as_deref().unwrap_or("none"),
            remote_timeout_ms = settings.remote_timeout.as_millis() as u64,
            pipeline_timeout_ms = settings.pipeline_timeout.as_millis() as u64,
            "Orchestrator initialized"
        );

        Self {
            symptom: SymptomAgent::new(executor.clone()),
            risk: RiskAgent::new(executor.clone()),
            recommend: RecommendationAgent::new(executor.clone()),
            safety: SafetyAgent::new(executor.clone(), policy),
            settings,
            knowledge,
            breakers,
            executor,
            audit: None,
        }
    }

    /// Emit an audit record after every finished run.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakers> {
        &self.breakers
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn rules(&self) -> &RuleFallback {
        self.executor.rules()
    }

    pub fn has_remote(&self) -> bool {
        self.executor.remote_name().is_some()
    }

    pub fn remote_name(&self) -> Option<String> {
        self.executor.remote_name()
    }

    pub async fn analyze(
        &self,
        text: &str,
        language_hint: Option<&str>,
        session_id: Option<String>,
    ) -> Result<PipelineResult> {
        self.analyze_with(text, language_hint, session_id, ModeHint::Full)
            .await
    }

    /// Run the pipeline. Fails only with `InvalidQuery`; remote failures and the
    /// deadline degrade the result instead.
    pub async fn analyze_with(
        &self,
        text: &str,
        language_hint: Option<&str>,
        session_id: Option<String>,
        hint: ModeHint,
    ) -> Result<PipelineResult> {
        let query = Query::new(text, language_hint, session_id)?;
        let started = Instant::now();
        let deadline = started + self.settings.pipeline_timeout;
        let mut timed_out = false;
        let mut trace = ReasoningTrace::new();
        let language = query.detected_language().to_string();

        let mut state = State::Init;
        let (symptoms, risk, recs, verdict, outcome) = loop {
            state = match state {
                State::Init => State::Symptom,
                State::Symptom => {
                    let run = bounded(deadline, &mut timed_out, hint, |h| self.symptom.run(&query, h)).await;
                    trace.push(run.entry);
                    State::Risk {
                        symptoms: run.output,
                    }
                }
                State::Risk { symptoms } => {
                    let run = bounded(deadline, &mut timed_out, hint, |h| self.risk.run(&symptoms, h)).await;
                    trace.push(run.entry);
                    let risk = run.output;
                    if risk.risk_level == RiskLevel::Emergency {
                        debug!(session = query.session_id(), "Emergency risk, skipping recommendation stage");
                        State::Safety {
                            symptoms,
                            risk,
                            recs: RecommendationSet::escalation(),
                            outcome: Outcome::Escalated,
                        }
                    } else {
                        State::Recommend { symptoms, risk }
                    }
                }
                State::Recommend { symptoms, risk } => {
                    let run = bounded(deadline, &mut timed_out, hint, |h| {
                        self.recommend.run(&symptoms, &risk, &language, h)
                    })
                    .await;
                    trace.push(run.entry);
                    State::Safety {
                        symptoms,
                        risk,
                        recs: run.output,
                        outcome: Outcome::Done,
                    }
                }
                State::Safety {
                    symptoms,
                    risk,
                    recs,
                    outcome,
                } => {
                    let run = bounded(deadline, &mut timed_out, hint, |h| self.safety.run(&risk, &recs, h)).await;
                    trace.push(run.entry);
                    State::Finished {
                        symptoms,
                        risk,
                        recs,
                        verdict: run.output,
                        outcome,
                    }
                }
                State::Finished {
                    symptoms,
                    risk,
                    recs,
                    verdict,
                    outcome,
                } => break (symptoms, risk, recs, verdict, outcome),
            };
        };

        let answer = if verdict.approved {
            recs.actions().to_vec()
        } else {
            vec![SAFE_FALLBACK_MESSAGE.to_string()]
        };
        let emergency_contacts = if outcome == Outcome::Escalated || verdict.escalation {
            self.knowledge.emergency_contacts().to_vec()
        } else {
            Vec::new()
        };
        let mode = Mode::from_sources(&trace.sources(), timed_out);
        let explanation = ExplanationBuilder::build(&trace, &self.knowledge.summary_templates(&language));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = PipelineResult {
            session_id: query.session_id().to_string(),
            disclaimer: self.knowledge.disclaimer(&language).to_string(),
            language,
            symptoms,
            risk,
            recommendations: recs,
            safety_verdict: verdict,
            answer,
            trace,
            explanation,
            mode,
            outcome,
            timed_out,
            emergency_contacts,
            elapsed_ms,
        };

        info!(
            session = %result.session_id,
            mode = %result.mode,
            risk = %result.risk.risk_level,
            outcome = result.outcome.as_str(),
            elapsed_ms,
            "Pipeline complete"
        );
        self.emit_audit(&result);

        Ok(result)
    }

    fn emit_audit(&self, result: &PipelineResult) {
        let Some(sink) = self.audit.clone() else {
            return;
        };
        let record = AuditRecord::from_result(result);
        tokio::spawn(async move {
            let session = record.session_id.clone();
            if let Err(e) = sink.record(record).await {
                warn!(session = %session, error = %e, "Failed to persist audit record");
            }
        });
    }
}

/// Run one stage within the pipeline deadline. Once the deadline has passed the
/// in-flight call is dropped and this and every later stage run on local rules.
async fn bounded<T, F, Fut>(deadline: Instant, timed_out: &mut bool, hint: ModeHint, run: F) -> AgentRun<T>
where
    F: Fn(ModeHint) -> Fut,
    Fut: Future<Output = AgentRun<T>>,
{
    if !*timed_out {
        match tokio::time::timeout_at(deadline, run(hint)).await {
            Ok(done) => return done,
            Err(_) => {
                *timed_out = true;
                warn!(error = %Error::PipelineTimeout, "Finishing remaining stages on local rules");
            }
        }
    }
    run(ModeHint::Offline).await
}
