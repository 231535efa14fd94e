//! Safety policy: blocked action classes and dosage ceilings.

use regex::{Regex, RegexBuilder};
use sehat_core::{Error, RecommendationSet, Result, RiskLevel, SafetyVerdict};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tracing::{info, warn};

const BUILTIN: &str = include_str!("../data/safety-policy.json");

const AMOUNT: &str = r"\d[\d,]*(?:\.\d+)?";
const UNIT: &str = r"mg|milligrams?|g|grams?";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedClass {
    pub class: String,
    pub patterns: Vec<String>,
    /// Whether an `allowed` phrase reaching into a hit (e.g. "do not ...") clears it.
    #[serde(default)]
    pub negatable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DosageLimit {
    pub drug: String,
    pub aliases: Vec<String>,
    pub max_single_mg: f64,
}

/// The JSON document a [`SafetyPolicy`] is compiled from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyData {
    #[serde(default)]
    pub blocked: Vec<BlockedClass>,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub dosage_limits: Vec<DosageLimit>,
}

/// One disallowed action found in a recommendation set.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub class: String,
    pub action: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.class, self.action)
    }
}

#[derive(Debug, Clone)]
struct BlockedPattern {
    class: String,
    negatable: bool,
    re: Regex,
}

#[derive(Debug, Clone)]
struct DosageRule {
    limit: DosageLimit,
    name_first: Regex,
    amount_first: Regex,
}

/// Compiled policy. Checks run locally and never consult the remote reasoner.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    blocked: Vec<BlockedPattern>,
    allowed: Vec<Regex>,
    dosage: Vec<DosageRule>,
}

impl SafetyPolicy {
    pub fn builtin() -> Result<Self> {
        Self::from_data(serde_json::from_str(BUILTIN)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let data: PolicyData = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let policy = Self::from_data(data)?;
        info!("Loaded safety policy from {}", path.display());
        Ok(policy)
    }

    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::builtin()
        }
    }

    pub fn from_data(data: PolicyData) -> Result<Self> {
        let mut blocked = Vec::new();
        for class in &data.blocked {
            for pattern in &class.patterns {
                blocked.push(BlockedPattern {
                    class: class.class.clone(),
                    negatable: class.negatable,
                    re: compile(pattern)?,
                });
            }
        }
        let allowed = data
            .allowed
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;

        let mut dosage = Vec::new();
        for limit in data.dosage_limits {
            let names = limit
                .aliases
                .iter()
                .chain(std::iter::once(&limit.drug))
                .map(|a| regex::escape(a))
                .collect::<Vec<_>>()
                .join("|");
            let name_first = compile(&format!(
                r"\b(?:{names})\b\D{{0,30}}?({AMOUNT})\s*({UNIT})\b"
            ))?;
            let amount_first = compile(&format!(
                r"({AMOUNT})\s*({UNIT})\b\D{{0,30}}?\b(?:{names})\b"
            ))?;
            dosage.push(DosageRule {
                limit,
                name_first,
                amount_first,
            });
        }

        Ok(Self {
            blocked,
            allowed,
            dosage,
        })
    }

    /// Every disallowed action in `recs`, in action order.
    pub fn review(&self, recs: &RecommendationSet) -> Vec<Violation> {
        let mut out = Vec::new();
        for action in recs.actions() {
            if let Some(class) = self.blocked_class(action) {
                out.push(Violation {
                    class: class.to_string(),
                    action: action.clone(),
                });
            }
            if let Some(limit) = self.over_limit(action) {
                out.push(Violation {
                    class: format!("dosage above {} mg {}", limit.max_single_mg, limit.drug),
                    action: action.clone(),
                });
            }
        }
        out
    }

    /// Local verdict for `recs`. Emergencies always escalate.
    pub fn check(&self, recs: &RecommendationSet) -> SafetyVerdict {
        let violations = self.review(recs);
        for v in &violations {
            warn!(class = %v.class, "Safety policy rejected an action");
        }
        SafetyVerdict {
            approved: violations.is_empty(),
            redactions: violations.iter().map(ToString::to_string).collect(),
            escalation: recs.risk_level() == RiskLevel::Emergency,
        }
    }

    /// First class with a hit in `action`. A hit in a negatable class is
    /// cleared only when an allowed phrase starts before it and runs into it.
    fn blocked_class(&self, action: &str) -> Option<&str> {
        let negations: Vec<Range<usize>> = self
            .allowed
            .iter()
            .flat_map(|re| re.find_iter(action).map(|m| m.range()))
            .collect();
        self.blocked
            .iter()
            .find(|rule| {
                rule.re.find_iter(action).any(|hit| {
                    !(rule.negatable
                        && negations
                            .iter()
                            .any(|n| n.start <= hit.start() && hit.start() < n.end))
                })
            })
            .map(|rule| rule.class.as_str())
    }

    fn over_limit(&self, action: &str) -> Option<&DosageLimit> {
        self.dosage
            .iter()
            .find(|rule| {
                [&rule.name_first, &rule.amount_first].into_iter().any(|re| {
                    re.captures_iter(action)
                        .filter_map(|caps| dose_mg(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
                        .any(|mg| mg > rule.limit.max_single_mg)
                })
            })
            .map(|rule| &rule.limit)
    }
}

fn dose_mg(amount: &str, unit: &str) -> Option<f64> {
    let amount: f64 = amount.replace(',', "").parse().ok()?;
    Some(if unit.to_ascii_lowercase().starts_with('g') {
        amount * 1000.0
    } else {
        amount
    })
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Config(format!("invalid safety pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sehat_core::Source;

    fn recs(actions: &[&str], level: RiskLevel, source: Source) -> RecommendationSet {
        RecommendationSet::new(actions.iter().map(|s| s.to_string()).collect(), level, source)
    }

    #[test]
    fn test_clean_set_approved() {
        let policy = SafetyPolicy::builtin().unwrap();
        let v = policy.check(&recs(
            &[
                "Take paracetamol for fever (NOT aspirin if dengue suspected)",
                "Avoid NSAIDs (ibuprofen, aspirin)",
                "Take paracetamol 500 mg up to three times a day",
            ],
            RiskLevel::Medium,
            Source::Rule,
        ));
        assert!(v.approved, "{:?}", v.redactions);
        assert!(v.redactions.is_empty());
        assert!(!v.escalation);
    }

    #[test]
    fn test_dosage_ceiling() {
        let policy = SafetyPolicy::builtin().unwrap();
        for action in [
            "Take paracetamol 2 g at once",
            "Take 2000mg of panadol... paracetamol 2000 mg",
            "Take 3000 mg paracetamol at once",
            "Take 2 g of paracetamol now",
            "Take paracetamol 1,500 mg",
            "1,200 milligrams of acetaminophen",
        ] {
            let v = policy.check(&recs(&[action], RiskLevel::Low, Source::Remote));
            assert!(!v.approved, "{action}");
        }
        let v = policy.check(&recs(&["Brufen 600 mg after meals"], RiskLevel::Low, Source::Rule));
        assert!(!v.approved);
        assert!(v.redactions[0].contains("ibuprofen"));

        for action in ["Take 500 mg paracetamol every 6 hours", "paracetamol 1,000 mg at most"] {
            let v = policy.check(&recs(&[action], RiskLevel::Low, Source::Remote));
            assert!(v.approved, "{action}");
        }
    }

    #[test]
    fn test_blocked_classes_regardless_of_source() {
        let policy = SafetyPolicy::builtin().unwrap();
        for source in [Source::Remote, Source::Rule] {
            let v = policy.check(&recs(
                &["Drink water", "You definitely have typhoid"],
                RiskLevel::Medium,
                source,
            ));
            assert!(!v.approved);
            assert_eq!(v.redactions, vec!["diagnosis assertion: You definitely have typhoid"]);

            let v = policy.check(&recs(&["Stop taking your prescribed medication"], RiskLevel::Low, source));
            assert!(!v.approved);
        }
    }

    #[test]
    fn test_allowlist_exempts_negated_advice() {
        let policy = SafetyPolicy::builtin().unwrap();
        let v = policy.check(&recs(
            &["Do not stop taking prescribed medication without asking your doctor"],
            RiskLevel::Low,
            Source::Remote,
        ));
        assert!(v.approved);
    }

    #[test]
    fn test_negation_does_not_cover_later_clauses() {
        let policy = SafetyPolicy::builtin().unwrap();
        for action in [
            "Do not self-diagnose; you are suffering from dengue",
            "Don't panic, stop taking your prescribed medication",
            "Don't worry, you definitely have typhoid",
            "Never self-diagnose. Your diagnosis is malaria",
        ] {
            let v = policy.check(&recs(&[action], RiskLevel::Medium, Source::Remote));
            assert!(!v.approved, "{action}");
        }

        let v = policy.check(&recs(&["Never self-diagnose"], RiskLevel::Low, Source::Rule));
        assert!(v.approved, "{:?}", v.redactions);
    }

    #[test]
    fn test_negation_never_clears_diagnosis() {
        let data = PolicyData {
            blocked: vec![BlockedClass {
                class: "diagnosis assertion".into(),
                patterns: vec![r"\byou have dengue\b".into()],
                negatable: false,
            }],
            allowed: vec![r"\bdo not\b.{0,20}you have".into()],
            ..Default::default()
        };
        let policy = SafetyPolicy::from_data(data).unwrap();
        let v = policy.check(&recs(&["Do not assume you have dengue"], RiskLevel::Low, Source::Remote));
        assert!(!v.approved);
    }

    #[test]
    fn test_escalation_flag_follows_risk() {
        let policy = SafetyPolicy::builtin().unwrap();
        let v = policy.check(&RecommendationSet::escalation());
        assert!(v.approved);
        assert!(v.escalation);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let data = PolicyData {
            allowed: vec!["(unclosed".into()],
            ..Default::default()
        };
        assert!(matches!(SafetyPolicy::from_data(data), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("safety-policy.json");
        std::fs::write(&path, r#"{"blocked":[{"class":"herbal","patterns":["\\bherbal cure\\b"]}]}"#).unwrap();
        let policy = SafetyPolicy::load_or_builtin(&path).unwrap();
        let v = policy.check(&recs(&["Try a herbal cure"], RiskLevel::Low, Source::Rule));
        assert_eq!(v.redactions, vec!["herbal: Try a herbal cure"]);
    }
}
