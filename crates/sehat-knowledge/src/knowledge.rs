//! Knowledge base: alias index over the fact tables.

use sehat_core::{EmergencyContact, Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::normalize::Normalizer;
use crate::types::*;

const BUILTIN: &str = include_str!("../data/knowledge.json");

#[derive(Debug, Clone, Copy)]
enum FactRef {
    Symptom(usize),
    Condition(usize),
    Nutrition(usize),
}

/// A symptom found in free text.
#[derive(Debug, Clone, PartialEq)]
pub struct SymptomMatch {
    pub code: String,
    pub confidence: f32,
    /// Token offset of the first occurrence.
    pub position: usize,
}

/// Preloaded, read-only fact tables. Shared across requests behind an `Arc`.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    data: KnowledgeData,
    normalizer: Normalizer,
    index: HashMap<String, FactRef>,
    /// (alias tokens, symptom index), used by `scan`.
    patterns: Vec<(Vec<String>, usize)>,
    first_aid: HashMap<String, usize>,
}

impl KnowledgeBase {
    /// The tables compiled into the binary.
    pub fn builtin() -> Result<Self> {
        let data: KnowledgeData = serde_json::from_str(BUILTIN)?;
        Self::from_data(data)
    }

    /// Load tables from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let data: KnowledgeData = serde_json::from_str(&content)
            .map_err(|e| Error::Knowledge(format!("{}: {}", path.display(), e)))?;
        let kb = Self::from_data(data)?;
        info!("Loaded knowledge tables from {}", path.display());
        Ok(kb)
    }

    /// Load `path` if it exists, otherwise the built-in tables.
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::builtin()
        }
    }

    pub fn from_data(data: KnowledgeData) -> Result<Self> {
        let normalizer = Normalizer::new(&data.transliteration);
        let mut index = HashMap::new();
        let mut patterns = Vec::new();

        for (i, fact) in data.symptoms.iter().enumerate() {
            if fact.code.trim().is_empty() {
                return Err(Error::Knowledge("symptom with empty code".into()));
            }
            if !(0.0..=1.0).contains(&fact.confidence) {
                return Err(Error::Knowledge(format!(
                    "symptom {} has confidence {} outside [0, 1]",
                    fact.code, fact.confidence
                )));
            }
            for term in std::iter::once(&fact.code).chain(&fact.aliases) {
                let tokens = normalizer.tokens(term);
                if tokens.is_empty() {
                    continue;
                }
                insert_key(&mut index, tokens.join(" "), FactRef::Symptom(i));
                patterns.push((tokens, i));
            }
        }
        for (i, fact) in data.conditions.iter().enumerate() {
            for term in std::iter::once(&fact.code).chain(&fact.aliases) {
                insert_key(&mut index, normalizer.key(term), FactRef::Condition(i));
            }
        }
        for (i, fact) in data.nutrition.iter().enumerate() {
            for term in std::iter::once(&fact.code).chain(&fact.aliases) {
                insert_key(&mut index, normalizer.key(term), FactRef::Nutrition(i));
            }
        }

        let mut first_aid = HashMap::new();
        for (i, fact) in data.first_aid.iter().enumerate() {
            for term in std::iter::once(&fact.code).chain(&fact.aliases) {
                let key = normalizer.key(term);
                if !key.is_empty() {
                    first_aid.entry(key).or_insert(i);
                }
            }
        }

        debug!(
            symptoms = data.symptoms.len(),
            conditions = data.conditions.len(),
            nutrition = data.nutrition.len(),
            keys = index.len(),
            first_aid = data.first_aid.len(),
            "Knowledge index built"
        );

        Ok(Self {
            data,
            normalizer,
            index,
            patterns,
            first_aid,
        })
    }

    /// Resolve a term in any supported script to its fact.
    pub fn lookup(&self, term: &str) -> Option<Fact> {
        let key = self.normalizer.key(term);
        self.index.get(&key).map(|r| match *r {
            FactRef::Symptom(i) => Fact::Symptom(self.data.symptoms[i].clone()),
            FactRef::Condition(i) => Fact::Condition(self.data.conditions[i].clone()),
            FactRef::Nutrition(i) => Fact::Nutrition(self.data.nutrition[i].clone()),
        })
    }

    /// Symptom fact by exact code.
    pub fn symptom(&self, code: &str) -> Option<&SymptomFact> {
        self.data.symptoms.iter().find(|s| s.code == code)
    }

    /// Symptom fact by code or any alias.
    pub fn resolve_symptom(&self, term: &str) -> Option<&SymptomFact> {
        if let Some(fact) = self.symptom(term) {
            return Some(fact);
        }
        match self.index.get(&self.normalizer.key(term)) {
            Some(FactRef::Symptom(i)) => Some(&self.data.symptoms[*i]),
            _ => None,
        }
    }

    pub fn condition(&self, code: &str) -> Option<&ConditionFact> {
        self.data.conditions.iter().find(|c| c.code == code)
    }

    /// Every known symptom mentioned in `text`, ordered by first occurrence.
    pub fn scan(&self, text: &str) -> Vec<SymptomMatch> {
        let tokens = self.normalizer.tokens(text);
        let mut first_seen: HashMap<usize, usize> = HashMap::new();

        for (pattern, symptom) in &self.patterns {
            if let Some(pos) = find_window(&tokens, pattern) {
                first_seen
                    .entry(*symptom)
                    .and_modify(|p| *p = (*p).min(pos))
                    .or_insert(pos);
            }
        }

        let mut matches: Vec<(usize, usize)> = first_seen.into_iter().map(|(s, p)| (p, s)).collect();
        matches.sort_unstable();
        matches
            .into_iter()
            .map(|(position, i)| SymptomMatch {
                code: self.data.symptoms[i].code.clone(),
                confidence: self.data.symptoms[i].confidence,
                position,
            })
            .collect()
    }

    pub fn is_emergency(&self, code: &str) -> bool {
        self.symptom(code).is_some_and(|s| s.emergency)
    }

    pub fn symptoms(&self) -> &[SymptomFact] {
        &self.data.symptoms
    }

    pub fn combinations(&self) -> &[CombinationRule] {
        &self.data.combinations
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.data.risk_thresholds
    }

    pub fn disclaimer(&self, language: &str) -> &str {
        localized(&self.data.messages.disclaimer, language)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn see_doctor(&self, language: &str) -> Option<&str> {
        localized(&self.data.messages.see_doctor, language).map(String::as_str)
    }

    pub fn general_guidance(&self, language: &str) -> &[String] {
        localized(&self.data.messages.general_guidance, language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn emergency_contacts(&self) -> &[EmergencyContact] {
        &self.data.emergency_contacts
    }

    /// Every helpline. Falls back to the escalation contacts when no directory is configured.
    pub fn contact_directory(&self) -> &[EmergencyContact] {
        if self.data.contact_directory.is_empty() {
            &self.data.emergency_contacts
        } else {
            &self.data.contact_directory
        }
    }

    pub fn emergency_advice(&self, language: &str) -> &str {
        localized(&self.data.messages.emergency_advice, language)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// First-aid entry by code or alias, in any script ("Heat Stroke", "heat_stroke").
    pub fn first_aid(&self, term: &str) -> Option<&FirstAidFact> {
        self.first_aid
            .get(&self.normalizer.key(term))
            .map(|&i| &self.data.first_aid[i])
    }

    pub fn first_aid_topics(&self) -> Vec<&str> {
        self.data.first_aid.iter().map(|f| f.code.as_str()).collect()
    }

    pub fn first_aid_note(&self, language: &str) -> &str {
        localized(&self.data.messages.first_aid_note, language)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Explanation summary sentences for `language`, English when none are configured.
    pub fn summary_templates(&self, language: &str) -> SummaryTemplates {
        localized(&self.data.messages.summary, language)
            .cloned()
            .unwrap_or_default()
    }
}

fn insert_key(index: &mut HashMap<String, FactRef>, key: String, fact: FactRef) {
    if key.is_empty() {
        return;
    }
    if let Some(existing) = index.get(&key) {
        debug!(key = %key, ?existing, "Duplicate knowledge alias ignored");
        return;
    }
    index.insert(key, fact);
}

fn find_window(tokens: &[String], pattern: &[String]) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > tokens.len() {
        return None;
    }
    tokens.windows(pattern.len()).position(|w| w == pattern)
}
