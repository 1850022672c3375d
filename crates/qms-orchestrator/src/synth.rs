use std::sync::Arc;

use qms_agents::Reasoner;
use serde_json::{Map, Value};

const SYSTEM_PROMPT: &str = "Reply to the user in first person, summarizing the results of \
the work just completed in plain language. Never mention internal agent names, task ids, or \
raw JSON; never present the summary as clinical advice.";

/// Appended to every user-facing reply this turn produced, success or
/// failure: relying on a prompt instruction alone leaves the disclaimer
/// absent whenever the reasoner can't or doesn't follow it.
pub const CLINICAL_DISCLAIMER: &str =
    "This is quality-improvement planning support, not clinical guidance; treatment decisions \
     remain with your care team and a qualified statistician or QI mentor should review any \
     analysis plan before it's finalized.";

/// Turns the executor's results map into a user-facing reply, falling back
/// to a deterministic bullet list if the LLM call fails.
pub struct ResponseSynthesizer {
    reasoner: Arc<dyn Reasoner>,
}

impl ResponseSynthesizer {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    pub async fn synthesize(&self, results: &Map<String, Value>) -> String {
        let user_prompt = serde_json::to_string_pretty(results).unwrap_or_default();
        let body = match self.reasoner.complete(SYSTEM_PROMPT, &user_prompt).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            _ => deterministic_fallback(results),
        };
        format!("{body}\n\n{CLINICAL_DISCLAIMER}")
    }
}

fn deterministic_fallback(results: &Map<String, Value>) -> String {
    let mut lines = vec!["Here is a summary of what was completed:".to_string()];
    let mut keys: Vec<&String> = results.keys().collect();
    keys.sort();
    for key in keys {
        lines.push(format!("- {key}: {}", summarize_value(&results[key])));
    }
    lines.join("\n")
}

fn summarize_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.chars().take(160).collect(),
        Value::Array(items) => format!("{} item(s)", items.len()),
        Value::Object(_) => "see details".to_string(),
        other => other.to_string(),
    }
}

/// Static phase-keyed next-step suggestions, 3-5 per phase.
pub struct SuggestionEngine;

impl SuggestionEngine {
    pub fn suggestions(phase_key: &str) -> Vec<&'static str> {
        match phase_key {
            "intake" => vec![
                "Describe the quality improvement problem you want to address",
                "Tell me the patient population and setting",
                "Ask me to help draft a PICOT question",
            ],
            "picot_drafted" => vec![
                "Ask me to search the literature for this PICOT question",
                "Refine the comparison or time frame",
                "Ask for a quick literature search to sanity-check feasibility",
            ],
            "searching" => vec![
                "Ask me to validate the citations I found",
                "Ask me to broaden or narrow the search terms",
                "Ask which findings are most relevant",
            ],
            "validated" => vec![
                "Ask me to synthesize the validated evidence",
                "Ask about the evidence level of a specific finding",
                "Ask me to flag any retracted studies",
            ],
            "synthesized" => vec![
                "Ask me to propose a statistical analysis plan",
                "Ask me to draft the background section",
                "Ask me to build a project timeline",
            ],
            "analyzed" => vec![
                "Ask me to draft the methods section",
                "Ask me to set milestones for data collection",
                "Ask me to summarize the sample size rationale",
            ],
            _ => vec![
                "Ask me to draft the next report section",
                "Ask me to review the project timeline",
                "Ask what's still open before submission",
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_are_phase_appropriate_and_bounded() {
        for phase in ["intake", "picot_drafted", "searching", "validated", "synthesized", "analyzed", "writing"] {
            let suggestions = SuggestionEngine::suggestions(phase);
            assert!(suggestions.len() >= 3 && suggestions.len() <= 5);
        }
    }

    #[test]
    fn deterministic_fallback_lists_every_result_key() {
        let mut results = Map::new();
        results.insert("search_results".to_string(), Value::Array(vec![Value::Null, Value::Null]));
        let summary = deterministic_fallback(&results);
        assert!(summary.contains("search_results"));
        assert!(summary.contains("2 item(s)"));
    }
}
