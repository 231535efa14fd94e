//! Pipeline data model shared by every stage.
//!
//! Stage outputs are produced once and handed forward by value or shared
//! reference; none of these types expose in-place mutation besides the
//! append-only [`ReasoningTrace`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed recommendation used when the risk stage reports an emergency.
pub const ESCALATION_MESSAGE: &str = "seek immediate care";

/// Most actions a recommendation set may carry, whichever path drafted it.
pub const MAX_ACTIONS: usize = 10;

/// Answer shown in place of recommendations the safety gate rejected.
pub const SAFE_FALLBACK_MESSAGE: &str =
    "We could not provide safe self-care guidance for this query. Please consult a qualified healthcare professional.";

/// One step of the reasoning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Symptom,
    Risk,
    Recommendation,
    Safety,
}

impl StageKind {
    /// All stages in pipeline order.
    pub fn all() -> &'static [StageKind] {
        &[Self::Symptom, Self::Risk, Self::Recommendation, Self::Safety]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symptom => "symptom",
            Self::Risk => "risk",
            Self::Recommendation => "recommendation",
            Self::Safety => "safety",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which reasoning path produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Remote,
    Rule,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Rule => write!(f, "rule"),
        }
    }
}

/// Overall risk classification, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Emergency,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Emergency => "EMERGENCY",
        }
    }

    /// Lenient parse used for remote model output ("medium", "Critical", ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" | "MODERATE" => Some(Self::Medium),
            "HIGH" | "MEDIUM_HIGH" => Some(Self::High),
            "EMERGENCY" | "CRITICAL" => Some(Self::Emergency),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality of a finished pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every executed stage used the remote reasoner.
    Full,
    /// Every executed stage used local rules, or the deadline was exceeded.
    Degraded,
    /// Some stages remote, some local.
    Mixed,
}

impl Mode {
    pub fn from_sources(sources: &[Source], timed_out: bool) -> Self {
        if timed_out || sources.iter().all(|s| *s == Source::Rule) {
            Self::Degraded
        } else if sources.iter().all(|s| *s == Source::Remote) {
            Self::Full
        } else {
            Self::Mixed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Degraded => "degraded",
            Self::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller preference for how the pipeline should reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeHint {
    /// Remote reasoner preferred for every stage.
    #[default]
    Full,
    /// Local extraction and risk scoring; remote preferred for drafting and review.
    Quick,
    /// Rule path only, no network.
    Offline,
}

impl ModeHint {
    pub fn prefers_remote(&self, stage: StageKind) -> bool {
        match self {
            Self::Full => true,
            Self::Quick => matches!(stage, StageKind::Recommendation | StageKind::Safety),
            Self::Offline => false,
        }
    }
}

/// Normalized user query. Language detection and transliteration happen upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    raw_text: String,
    detected_language: String,
    session_id: String,
}

impl Query {
    /// Build a query, rejecting empty text before any stage runs.
    pub fn new(
        raw_text: impl Into<String>,
        language_hint: Option<&str>,
        session_id: Option<String>,
    ) -> Result<Self> {
        let raw_text = raw_text.into().trim().to_string();
        if raw_text.is_empty() {
            return Err(Error::InvalidQuery("query text is empty".into()));
        }
        let detected_language = language_hint
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != "auto")
            .unwrap_or("en")
            .to_string();
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            raw_text,
            detected_language,
            session_id,
        })
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn detected_language(&self) -> &str {
        &self.detected_language
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// A recognised symptom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomEntry {
    pub code: String,
    pub confidence: f32,
    pub source: Source,
}

/// Ordered set of symptoms keyed by code; first insertion wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymptomSet {
    entries: Vec<SymptomEntry>,
}

impl SymptomSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry unless its code is already present. Confidence is clamped to [0, 1].
    pub fn insert(&mut self, mut entry: SymptomEntry) -> bool {
        if self.contains(&entry.code) {
            return false;
        }
        entry.confidence = entry.confidence.clamp(0.0, 1.0);
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }

    pub fn entries(&self) -> &[SymptomEntry] {
        &self.entries
    }

    pub fn codes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.code.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<SymptomEntry> for SymptomSet {
    fn from_iter<I: IntoIterator<Item = SymptomEntry>>(iter: I) -> Self {
        let mut set = Self::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub weight: f32,
}

/// Risk verdict derived from a [`SymptomSet`] and knowledge facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub contributing_factors: Vec<RiskFactor>,
    pub source: Source,
}

impl RiskAssessment {
    /// Conservative verdict for an empty symptom set.
    pub fn insufficient_information(source: Source) -> Self {
        Self {
            risk_level: RiskLevel::Low,
            contributing_factors: vec![RiskFactor {
                factor: "insufficient information".into(),
                weight: 0.0,
            }],
            source,
        }
    }

    /// Highest-weight factor; earliest wins ties.
    pub fn dominant_factor(&self) -> Option<&RiskFactor> {
        self.contributing_factors
            .iter()
            .fold(None, |best: Option<&RiskFactor>, f| match best {
                Some(b) if b.weight >= f.weight => Some(b),
                _ => Some(f),
            })
    }
}

/// Priority-ordered plain-language actions, tagged with the risk level they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    actions: Vec<String>,
    risk_level: RiskLevel,
    source: Source,
}

impl RecommendationSet {
    pub fn new(actions: Vec<String>, risk_level: RiskLevel, source: Source) -> Self {
        Self {
            actions,
            risk_level,
            source,
        }
    }

    /// The fixed answer for an emergency; replaces normal drafting.
    pub fn escalation() -> Self {
        Self::new(
            vec![ESCALATION_MESSAGE.to_string()],
            RiskLevel::Emergency,
            Source::Rule,
        )
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn top(&self) -> Option<&str> {
        self.actions.first().map(String::as_str)
    }

    pub fn is_escalation(&self) -> bool {
        self.actions.len() == 1 && self.actions[0] == ESCALATION_MESSAGE
    }
}

/// Terminal gate outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub approved: bool,
    pub redactions: Vec<String>,
    pub escalation: bool,
}

impl SafetyVerdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            redactions: Vec::new(),
            escalation: false,
        }
    }
}

/// What a stage received, for remote and local reasoning alike.
#[derive(Debug, Clone)]
pub enum StageInput {
    Symptom {
        query: Query,
    },
    Risk {
        symptoms: SymptomSet,
    },
    Recommendation {
        symptoms: SymptomSet,
        risk: RiskAssessment,
        language: String,
    },
    Safety {
        risk: RiskAssessment,
        recommendations: RecommendationSet,
    },
}

impl StageInput {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Symptom { .. } => StageKind::Symptom,
            Self::Risk { .. } => StageKind::Risk,
            Self::Recommendation { .. } => StageKind::Recommendation,
            Self::Safety { .. } => StageKind::Safety,
        }
    }

    /// Short description for the reasoning trace. Never contains raw query text.
    pub fn summary(&self) -> String {
        match self {
            Self::Symptom { query } => format!(
                "query of {} chars (lang={})",
                query.raw_text().chars().count(),
                query.detected_language()
            ),
            Self::Risk { symptoms } => {
                if symptoms.is_empty() {
                    "no symptoms".into()
                } else {
                    format!("{} symptoms: {}", symptoms.len(), symptoms.codes().join(", "))
                }
            }
            Self::Recommendation { symptoms, risk, .. } => format!(
                "risk {} for {} symptoms",
                risk.risk_level,
                symptoms.len()
            ),
            Self::Safety {
                risk,
                recommendations,
            } => format!(
                "{} actions at risk {}",
                recommendations.actions().len(),
                risk.risk_level
            ),
        }
    }
}

/// What a stage produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Symptoms(SymptomSet),
    Risk(RiskAssessment),
    Recommendations(RecommendationSet),
    Safety(SafetyVerdict),
}

impl StageOutput {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Symptoms(_) => StageKind::Symptom,
            Self::Risk(_) => StageKind::Risk,
            Self::Recommendations(_) => StageKind::Recommendation,
            Self::Safety(_) => StageKind::Safety,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Symptoms(set) => {
                if set.is_empty() {
                    "no symptoms recognised".into()
                } else {
                    set.entries()
                        .iter()
                        .map(|e| format!("{} ({:.2})", e.code, e.confidence))
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            }
            Self::Risk(risk) => format!(
                "{} from {} factors",
                risk.risk_level,
                risk.contributing_factors.len()
            ),
            Self::Recommendations(recs) => format!("{} actions", recs.actions().len()),
            Self::Safety(verdict) => {
                let mut s = if verdict.approved {
                    "approved".to_string()
                } else {
                    format!("rejected ({} redactions)", verdict.redactions.len())
                };
                if verdict.escalation {
                    s.push_str(", escalated");
                }
                s
            }
        }
    }
}

/// One reasoning-trace row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub stage: StageKind,
    pub mode: Source,
    pub input_summary: String,
    pub output_summary: String,
    /// Headline of the stage output (top symptom, dominant factor, top action, final answer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding: Option<String>,
}

/// Append-only record of executed stages, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasoningTrace {
    entries: Vec<TraceEntry>,
}

impl ReasoningTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn get(&self, stage: StageKind) -> Option<&TraceEntry> {
        self.entries.iter().find(|e| e.stage == stage)
    }

    pub fn stages(&self) -> Vec<StageKind> {
        self.entries.iter().map(|e| e.stage).collect()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.entries.iter().map(|e| e.mode).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationStep {
    pub position: usize,
    pub stage: StageKind,
    pub mode: Source,
    pub text: String,
}

/// Human-readable rendering of a [`ReasoningTrace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,
    pub steps: Vec<ExplanationStep>,
}

/// Terminal state the pipeline converged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Done,
    Escalated,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Escalated => "escalated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything one `analyze` invocation returns. Owned by that invocation only.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub session_id: String,
    pub language: String,
    pub symptoms: SymptomSet,
    pub risk: RiskAssessment,
    pub recommendations: RecommendationSet,
    pub safety_verdict: SafetyVerdict,
    /// What the user should be shown: the recommendations, or the safe fallback.
    pub answer: Vec<String>,
    pub trace: ReasoningTrace,
    pub explanation: Explanation,
    pub mode: Mode,
    pub outcome: Outcome,
    pub timed_out: bool,
    pub disclaimer: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emergency_contacts: Vec<EmergencyContact>,
    pub elapsed_ms: u64,
}
