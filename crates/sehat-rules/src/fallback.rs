//! Rule fallback: keyword extraction and table-driven scoring.

use sehat_core::{
    RecommendationSet, RiskAssessment, RiskFactor, RiskLevel, SafetyVerdict, Source, StageInput,
    StageOutput, SymptomEntry, SymptomSet, MAX_ACTIONS,
};
use sehat_knowledge::KnowledgeBase;
use std::sync::Arc;

/// Deterministic local inference for every stage. Pure and synchronous.
#[derive(Debug, Clone)]
pub struct RuleFallback {
    knowledge: Arc<KnowledgeBase>,
}

impl RuleFallback {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Answer `input` locally. Never fails; unmatched input yields conservative defaults.
    pub fn infer_local(&self, input: &StageInput) -> StageOutput {
        match input {
            StageInput::Symptom { query } => StageOutput::Symptoms(self.extract(query.raw_text())),
            StageInput::Risk { symptoms } => StageOutput::Risk(self.assess(symptoms, Source::Rule)),
            StageInput::Recommendation {
                symptoms,
                risk,
                language,
            } => StageOutput::Recommendations(self.recommend(symptoms, risk, language)),
            StageInput::Safety { risk, .. } => StageOutput::Safety(SafetyVerdict {
                escalation: risk.risk_level == RiskLevel::Emergency,
                ..SafetyVerdict::approve()
            }),
        }
    }

    /// Keyword extraction against the knowledge aliases.
    pub fn extract(&self, text: &str) -> SymptomSet {
        self.knowledge
            .scan(text)
            .into_iter()
            .map(|m| SymptomEntry {
                code: m.code,
                confidence: m.confidence,
                source: Source::Rule,
            })
            .collect()
    }

    /// Score a symptom set with table weights and combination rules.
    ///
    /// `source` tags the assessment; the scoring itself is the same for both paths.
    pub fn assess(&self, symptoms: &SymptomSet, source: Source) -> RiskAssessment {
        let mut factors = Vec::new();
        let mut emergency = false;

        for entry in symptoms.entries() {
            let Some(fact) = self.knowledge.symptom(&entry.code) else {
                continue;
            };
            emergency |= fact.emergency;
            factors.push(RiskFactor {
                factor: fact.code.clone(),
                weight: round2(fact.weight * entry.confidence),
            });
        }
        if factors.is_empty() {
            return RiskAssessment::insufficient_information(source);
        }

        let codes = symptoms.codes();
        for rule in self.knowledge.combinations() {
            if rule.matches(&codes) {
                factors.push(RiskFactor {
                    factor: rule.factor.clone(),
                    weight: round2(rule.weight),
                });
            }
        }

        // Stable: equal weights keep symptom order.
        factors.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        let score: f32 = factors.iter().map(|f| f.weight).sum();
        let risk_level = if emergency {
            RiskLevel::Emergency
        } else {
            self.knowledge.thresholds().level_for(score)
        };

        RiskAssessment {
            risk_level,
            contributing_factors: factors,
            source,
        }
    }

    /// Advice for each symptom in extraction order, deduplicated and capped.
    pub fn recommend(
        &self,
        symptoms: &SymptomSet,
        risk: &RiskAssessment,
        language: &str,
    ) -> RecommendationSet {
        if risk.risk_level == RiskLevel::Emergency {
            return RecommendationSet::escalation();
        }

        let mut actions: Vec<String> = Vec::new();
        if risk.risk_level == RiskLevel::High {
            if let Some(msg) = self.knowledge.see_doctor(language) {
                actions.push(msg.to_string());
            }
        }
        for entry in symptoms.entries() {
            let Some(fact) = self.knowledge.symptom(&entry.code) else {
                continue;
            };
            for advice in fact.advice_for(language) {
                if !actions.contains(advice) {
                    actions.push(advice.clone());
                }
            }
        }
        if actions.is_empty() {
            actions = self.knowledge.general_guidance(language).to_vec();
        }
        actions.truncate(MAX_ACTIONS);

        RecommendationSet::new(actions, risk.risk_level, Source::Rule)
    }

    /// Emergency symptom codes mentioned in `text`.
    pub fn emergency_check(&self, text: &str) -> Vec<String> {
        self.knowledge
            .scan(text)
            .into_iter()
            .filter(|m| self.knowledge.is_emergency(&m.code))
            .map(|m| m.code)
            .collect()
    }
}

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use sehat_core::Query;

    fn rules() -> RuleFallback {
        RuleFallback::new(Arc::new(KnowledgeBase::builtin().unwrap()))
    }

    fn symptoms_for(rules: &RuleFallback, text: &str) -> SymptomSet {
        rules.extract(text)
    }

    #[test]
    fn test_extract_fever_headache() {
        let rules = rules();
        let query = Query::new("fever and headache for 3 days", None, None).unwrap();
        let StageOutput::Symptoms(set) = rules.infer_local(&StageInput::Symptom { query }) else {
            panic!("wrong stage output");
        };
        assert_eq!(set.codes(), vec!["fever", "headache"]);
        assert_eq!(set.entries()[0].confidence, 0.9);
        assert_eq!(set.entries()[1].confidence, 0.85);
        assert!(set.entries().iter().all(|e| e.source == Source::Rule));
    }

    #[test]
    fn test_empty_set_is_low_insufficient() {
        let rules = rules();
        let risk = rules.assess(&SymptomSet::new(), Source::Rule);
        assert_eq!(risk.risk_level, RiskLevel::Low);
        assert_eq!(risk.contributing_factors[0].factor, "insufficient information");
    }

    #[test]
    fn test_fever_headache_is_medium() {
        let rules = rules();
        let set = symptoms_for(&rules, "fever and headache for 3 days");
        let risk = rules.assess(&set, Source::Rule);
        assert_eq!(risk.risk_level, RiskLevel::Medium);
        assert_eq!(risk.dominant_factor().unwrap().factor, "fever");
        assert!(risk
            .contributing_factors
            .iter()
            .any(|f| f.factor.contains("dengue or typhoid")));
        let weights: Vec<f32> = risk.contributing_factors.iter().map(|f| f.weight).collect();
        assert!(weights.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_emergency_symptom_forces_emergency() {
        let rules = rules();
        let set = symptoms_for(&rules, "severe chest pain");
        let risk = rules.assess(&set, Source::Rule);
        assert_eq!(risk.risk_level, RiskLevel::Emergency);
        assert_eq!(rules.emergency_check("seene mein dard"), vec!["chest_pain"]);
        assert!(rules.emergency_check("mild cough").is_empty());
    }

    #[test]
    fn test_cough_fever_fatigue_is_high_with_doctor_first() {
        let rules = rules();
        let set = symptoms_for(&rules, "cough, fever and fatigue");
        let risk = rules.assess(&set, Source::Rule);
        assert_eq!(risk.risk_level, RiskLevel::High);

        let recs = rules.recommend(&set, &risk, "en");
        assert!(recs.top().unwrap().contains("see a doctor"));
        assert!(recs.actions().len() <= MAX_ACTIONS);
        assert_eq!(recs.risk_level(), RiskLevel::High);
    }

    #[test]
    fn test_recommendations_localized_and_deduplicated() {
        let rules = rules();
        let set = symptoms_for(&rules, "bukhar aur sir dard");
        let risk = rules.assess(&set, Source::Rule);
        let recs = rules.recommend(&set, &risk, "roman_urdu");
        assert_eq!(recs.top(), Some("Thandi jagah par aaram karein"));
        let mut seen = std::collections::HashSet::new();
        assert!(recs.actions().iter().all(|a| seen.insert(a.clone())));
    }

    #[test]
    fn test_no_symptoms_gives_general_guidance() {
        let rules = rules();
        let set = SymptomSet::new();
        let risk = rules.assess(&set, Source::Rule);
        let recs = rules.recommend(&set, &risk, "en");
        assert_eq!(recs.top(), Some("Rest and stay hydrated"));
    }

    #[test]
    fn test_safety_default_approves() {
        let rules = rules();
        let risk = RiskAssessment::insufficient_information(Source::Rule);
        let recs = RecommendationSet::new(vec!["rest".into()], RiskLevel::Low, Source::Rule);
        let out = rules.infer_local(&StageInput::Safety {
            risk,
            recommendations: recs,
        });
        assert_eq!(out, StageOutput::Safety(SafetyVerdict::approve()));
    }

    #[test]
    fn test_deterministic() {
        let rules = rules();
        let a = rules.assess(&symptoms_for(&rules, "diarrhea and vomiting"), Source::Rule);
        let b = rules.assess(&symptoms_for(&rules, "diarrhea and vomiting"), Source::Rule);
        assert_eq!(a, b);
    }
}
