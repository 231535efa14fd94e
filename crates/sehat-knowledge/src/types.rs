//! Fact records and the on-disk knowledge document.

use sehat_core::{EmergencyContact, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Language-keyed text; lookups fall back to `en`.
pub type Localized<T> = BTreeMap<String, T>;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Pick the entry for `language`, falling back to English.
pub fn localized<'a, T>(map: &'a Localized<T>, language: &str) -> Option<&'a T> {
    map.get(language).or_else(|| map.get(DEFAULT_LANGUAGE))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomFact {
    pub code: String,
    pub aliases: Vec<String>,
    /// Confidence assigned by keyword extraction.
    pub confidence: f32,
    /// Contribution to the risk score at full confidence.
    pub weight: f32,
    #[serde(default)]
    pub emergency: bool,
    #[serde(default)]
    pub related_conditions: Vec<String>,
    #[serde(default)]
    pub advice: Localized<Vec<String>>,
    #[serde(default)]
    pub see_doctor_if: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SymptomFact {
    pub fn advice_for(&self, language: &str) -> &[String] {
        localized(&self.advice, language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionFact {
    pub code: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub severity: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevalence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionFact {
    pub code: String,
    pub name: String,
    pub aliases: Vec<String>,
    #[serde(default)]
    pub nutrients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

/// Result of a successful [`KnowledgeBase::lookup`](crate::KnowledgeBase::lookup).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fact {
    Symptom(SymptomFact),
    Condition(ConditionFact),
    Nutrition(NutritionFact),
}

impl Fact {
    pub fn code(&self) -> &str {
        match self {
            Fact::Symptom(f) => &f.code,
            Fact::Condition(f) => &f.code,
            Fact::Nutrition(f) => &f.code,
        }
    }
}

/// Extra risk factor for co-occurring symptoms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationRule {
    /// Every code here must be present.
    pub requires: Vec<String>,
    /// If non-empty, at least one of these must also be present.
    #[serde(default)]
    pub with_any: Vec<String>,
    pub factor: String,
    pub weight: f32,
}

impl CombinationRule {
    pub fn matches(&self, codes: &[&str]) -> bool {
        self.requires.iter().all(|r| codes.contains(&r.as_str()))
            && (self.with_any.is_empty() || self.with_any.iter().any(|w| codes.contains(&w.as_str())))
    }
}

/// Score boundaries between risk levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub medium: f32,
    pub high: f32,
}

impl RiskThresholds {
    pub fn level_for(&self, score: f32) -> RiskLevel {
        if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 0.5,
            high: 1.2,
        }
    }
}

/// Basic first-aid steps for one situation, e.g. burns or choking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstAidFact {
    pub code: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub steps: Localized<Vec<String>>,
}

impl FirstAidFact {
    pub fn steps_for(&self, language: &str) -> &[String] {
        localized(&self.steps, language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Explanation summary sentences. `{factor}` and `{top}` are substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTemplates {
    pub factor_and_top: String,
    pub factor_only: String,
    pub top_only: String,
    pub empty: String,
}

impl Default for SummaryTemplates {
    fn default() -> Self {
        Self {
            factor_and_top: "Main risk factor: {factor}. Top recommendation: {top}.".into(),
            factor_only: "Main risk factor: {factor}.".into(),
            top_only: "Top recommendation: {top}.".into(),
            empty: "No findings recorded.".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default)]
    pub disclaimer: Localized<String>,
    #[serde(default)]
    pub see_doctor: Localized<String>,
    #[serde(default)]
    pub general_guidance: Localized<Vec<String>>,
    #[serde(default)]
    pub summary: Localized<SummaryTemplates>,
    #[serde(default)]
    pub first_aid_note: Localized<String>,
    #[serde(default)]
    pub emergency_advice: Localized<String>,
}

/// The JSON document a [`KnowledgeBase`](crate::KnowledgeBase) is built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeData {
    #[serde(default)]
    pub transliteration: HashMap<String, String>,
    #[serde(default)]
    pub symptoms: Vec<SymptomFact>,
    #[serde(default)]
    pub conditions: Vec<ConditionFact>,
    #[serde(default)]
    pub nutrition: Vec<NutritionFact>,
    #[serde(default)]
    pub combinations: Vec<CombinationRule>,
    #[serde(default)]
    pub risk_thresholds: RiskThresholds,
    #[serde(default)]
    pub messages: Messages,
    /// Attached to escalated results.
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
    /// Full helpline listing served offline.
    #[serde(default)]
    pub contact_directory: Vec<EmergencyContact>,
    #[serde(default)]
    pub first_aid: Vec<FirstAidFact>,
}
