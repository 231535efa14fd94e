//! Template rendering of a reasoning trace. No model calls.

use sehat_core::{Explanation, ExplanationStep, ReasoningTrace, StageKind, TraceEntry};
use sehat_knowledge::SummaryTemplates;

pub struct ExplanationBuilder;

impl ExplanationBuilder {
    /// Render `trace` with the summary sentences of the query's language.
    /// Steps mirror the trace 1:1 in stage order.
    pub fn build(trace: &ReasoningTrace, templates: &SummaryTemplates) -> Explanation {
        let factor = finding(trace, StageKind::Risk);
        // The safety stage records what the user is finally shown.
        let top = finding(trace, StageKind::Safety).or_else(|| finding(trace, StageKind::Recommendation));

        let template = match (factor, top) {
            (Some(_), Some(_)) => &templates.factor_and_top,
            (Some(_), None) => &templates.factor_only,
            (None, Some(_)) => &templates.top_only,
            (None, None) => &templates.empty,
        };
        let summary = template
            .replace("{factor}", factor.unwrap_or_default())
            .replace("{top}", top.unwrap_or_default());

        let steps = trace
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| ExplanationStep {
                position: i + 1,
                stage: entry.stage,
                mode: entry.mode,
                text: describe(entry),
            })
            .collect();

        Explanation { summary, steps }
    }
}

fn finding(trace: &ReasoningTrace, stage: StageKind) -> Option<&str> {
    trace.get(stage).and_then(|e| e.finding.as_deref())
}

fn describe(entry: &TraceEntry) -> String {
    format!(
        "{} via {}: {} -> {}",
        entry.stage, entry.mode, entry.input_summary, entry.output_summary
    )
}
