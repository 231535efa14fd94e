//! Per-stage prompt construction and response validation.

use sehat_core::{
    Error, RecommendationSet, Result, RiskAssessment, RiskFactor, RiskLevel, SafetyVerdict, Source,
    StageInput, StageKind, StageOutput, SymptomEntry, SymptomSet, MAX_ACTIONS,
};
use sehat_knowledge::KnowledgeBase;
use serde::de::DeserializeOwned;

use crate::types::*;

const SYSTEM_PREAMBLE: &str = "You are a cautious health triage assistant for users in Pakistan. \
You never diagnose, never prescribe, and always favour referral to a doctor when in doubt. \
Reply with a single JSON object and nothing else.";

/// Messages for one stage call. Only the prior-stage context the stage needs is sent.
pub fn build_messages(input: &StageInput, knowledge: &KnowledgeBase) -> Vec<ChatMessage> {
    let (instructions, context) = match input {
        StageInput::Symptom { query } => {
            let codes: Vec<&str> = knowledge.symptoms().iter().map(|s| s.code.as_str()).collect();
            (
                format!(
                    "Stage: symptom. Extract the symptoms the user reports. Prefer these codes: {}. \
                     Schema: {{\"symptoms\": [{{\"code\": string, \"confidence\": number 0-1}}]}}",
                    codes.join(", ")
                ),
                format!(
                    "Language: {}\nQuery: {}",
                    query.detected_language(),
                    query.raw_text()
                ),
            )
        }
        StageInput::Risk { symptoms } => (
            "Stage: risk. Classify overall risk as LOW, MEDIUM, HIGH or EMERGENCY and list the \
             contributing factors, most important first. \
             Schema: {\"risk_level\": string, \"factors\": [{\"factor\": string, \"weight\": number}]}"
                .to_string(),
            format!("Symptoms: {}", describe_symptoms(symptoms)),
        ),
        StageInput::Recommendation {
            symptoms,
            risk,
            language,
        } => (
            format!(
                "Stage: recommendation. Give at most 10 short, plain-language self-care actions in \
                 priority order, written in language '{}'. No diagnoses, no doses above label limits. \
                 Schema: {{\"actions\": [string]}}",
                language
            ),
            format!(
                "Symptoms: {}\nRisk: {}\nFactors: {}",
                describe_symptoms(symptoms),
                risk.risk_level,
                risk.contributing_factors
                    .iter()
                    .map(|f| f.factor.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
        ),
        StageInput::Safety {
            risk,
            recommendations,
        } => (
            "Stage: safety. Review the actions. Set approved to false and copy any unsafe action \
             (diagnosis, prescription, dangerous dose, advice to avoid care) into redactions. \
             Schema: {\"approved\": boolean, \"redactions\": [string]}"
                .to_string(),
            format!(
                "Risk: {}\nActions:\n{}",
                risk.risk_level,
                recommendations
                    .actions()
                    .iter()
                    .map(|a| format!("- {a}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        ),
    };

    vec![
        ChatMessage::system(format!("{SYSTEM_PREAMBLE}\n{instructions}")),
        ChatMessage::user(context),
    ]
}

fn describe_symptoms(symptoms: &SymptomSet) -> String {
    if symptoms.is_empty() {
        return "none".into();
    }
    symptoms
        .entries()
        .iter()
        .map(|e| format!("{} ({:.2})", e.code, e.confidence))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a raw completion against the schema for `input`'s stage.
pub fn parse_output(input: &StageInput, text: &str, knowledge: &KnowledgeBase) -> Result<StageOutput> {
    match input.stage() {
        StageKind::Symptom => {
            let wire: WireSymptoms = decode(text)?;
            let mut set = SymptomSet::new();
            for s in wire.symptoms {
                if !(0.0..=1.0).contains(&s.confidence) {
                    return Err(Error::RemoteMalformed(format!(
                        "confidence {} for {} outside [0, 1]",
                        s.confidence, s.code
                    )));
                }
                let code = match knowledge.resolve_symptom(&s.code) {
                    Some(fact) => fact.code.clone(),
                    None => s.code.trim().to_lowercase().replace(' ', "_"),
                };
                if code.is_empty() {
                    return Err(Error::RemoteMalformed("empty symptom code".into()));
                }
                set.insert(SymptomEntry {
                    code,
                    confidence: s.confidence,
                    source: Source::Remote,
                });
            }
            Ok(StageOutput::Symptoms(set))
        }
        StageKind::Risk => {
            let wire: WireRisk = decode(text)?;
            let risk_level = RiskLevel::parse(&wire.risk_level).ok_or_else(|| {
                Error::RemoteMalformed(format!("unknown risk level {:?}", wire.risk_level))
            })?;
            if wire.factors.is_empty() {
                return Err(Error::RemoteMalformed("no contributing factors".into()));
            }
            let mut factors: Vec<RiskFactor> = wire
                .factors
                .into_iter()
                .map(|f| RiskFactor {
                    factor: f.factor,
                    weight: f.weight,
                })
                .collect();
            factors.sort_by(|a, b| b.weight.total_cmp(&a.weight));
            Ok(StageOutput::Risk(RiskAssessment {
                risk_level,
                contributing_factors: factors,
                source: Source::Remote,
            }))
        }
        StageKind::Recommendation => {
            let wire: WireRecommendations = decode(text)?;
            let actions: Vec<String> = wire
                .actions
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .take(MAX_ACTIONS)
                .collect();
            if actions.is_empty() {
                return Err(Error::RemoteMalformed("no actions".into()));
            }
            let risk_level = match input {
                StageInput::Recommendation { risk, .. } => risk.risk_level,
                _ => RiskLevel::Low,
            };
            Ok(StageOutput::Recommendations(RecommendationSet::new(
                actions,
                risk_level,
                Source::Remote,
            )))
        }
        StageKind::Safety => {
            let wire: WireSafety = decode(text)?;
            Ok(StageOutput::Safety(SafetyVerdict {
                approved: wire.approved,
                redactions: wire.redactions,
                escalation: false,
            }))
        }
    }
}

/// Decode the first JSON object in `text`, tolerating code fences and chatter around it.
fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    let start = text.find('{');
    let end = text.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if e > s => &text[s..=e],
        _ => return Err(Error::RemoteMalformed("no JSON object in response".into())),
    };
    serde_json::from_str(body).map_err(|e| Error::RemoteMalformed(e.to_string()))
}
