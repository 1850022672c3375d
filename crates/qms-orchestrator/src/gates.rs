use qms_types::{CitationAssertion, Finding, Verdict};
use serde_json::Value;

/// Declarative pass/fail check run between workflow phases. Each gate is an
/// independently unit-testable object, the same small-trait-object shape the
/// teacher uses for `Tool`/`Provider`/`MissionReducer`.
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, inputs: &GateInputs) -> GateResult;
}

#[derive(Debug, Clone)]
pub struct GateResult {
    pub passed: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GateInputs {
    pub picot_text: Option<String>,
    pub findings: Vec<Finding>,
    pub citation_assertions: Vec<CitationAssertion>,
    pub synthesis_text: Option<String>,
    pub analysis: Option<Value>,
}

pub struct PicotGate;

impl Gate for PicotGate {
    fn name(&self) -> &'static str {
        "picot"
    }

    fn evaluate(&self, inputs: &GateInputs) -> GateResult {
        let Some(text) = &inputs.picot_text else {
            return GateResult {
                passed: false,
                reasons: vec!["no PICOT draft present".to_string()],
            };
        };

        let mut reasons = Vec::new();
        let lower = text.to_lowercase();
        for (label, keyword) in [
            ("Population", "population"),
            ("Intervention", "intervention"),
            ("Comparison", "comparison"),
            ("Outcome", "outcome"),
            ("Time", "time"),
        ] {
            if !lower.contains(keyword) {
                reasons.push(format!("PICOT draft is missing the {label} component"));
            }
        }
        if !text.trim_end().ends_with('?') {
            reasons.push("PICOT question must end with `?`".to_string());
        }
        if text.len() < 200 {
            reasons.push(format!(
                "PICOT draft is only {} characters; needs at least 200",
                text.len()
            ));
        }
        GateResult {
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

pub struct SearchGate;

impl Gate for SearchGate {
    fn name(&self) -> &'static str {
        "search"
    }

    fn evaluate(&self, inputs: &GateInputs) -> GateResult {
        let distinct = inputs
            .findings
            .iter()
            .map(|f| (f.identifier_kind, f.identifier.clone()))
            .collect::<std::collections::HashSet<_>>()
            .len();
        if distinct >= 3 {
            GateResult {
                passed: true,
                reasons: Vec::new(),
            }
        } else {
            GateResult {
                passed: false,
                reasons: vec![format!(
                    "only {distinct} distinct finding(s); need >= 3 before validation — broaden the search terms or refuse"
                )],
            }
        }
    }
}

pub struct ValidationGate;

impl Gate for ValidationGate {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn evaluate(&self, inputs: &GateInputs) -> GateResult {
        let mut reasons = Vec::new();
        let grounded = inputs
            .citation_assertions
            .iter()
            .filter(|a| a.verdict == Verdict::Grounded)
            .count();
        if grounded < 3 {
            reasons.push(format!("only {grounded} grounded citation(s); need >= 3"));
        }

        if !inputs.findings.is_empty() {
            let retracted = inputs.findings.iter().filter(|f| f.retracted).count();
            let rate = retracted as f64 / inputs.findings.len() as f64;
            if rate >= 0.2 {
                reasons.push(format!(
                    "retraction rate {:.0}% is >= 20%; downstream synthesis must be refused",
                    rate * 100.0
                ));
            }
        }

        GateResult {
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

pub struct SynthesisGate;

impl Gate for SynthesisGate {
    fn name(&self) -> &'static str {
        "synthesis"
    }

    fn evaluate(&self, inputs: &GateInputs) -> GateResult {
        let Some(text) = &inputs.synthesis_text else {
            return GateResult {
                passed: false,
                reasons: vec!["no synthesis text present".to_string()],
            };
        };

        let mut reasons = Vec::new();
        for label in ["evidence", "strength", "implications"] {
            if !text.to_lowercase().contains(label) {
                reasons.push(format!("synthesis is missing a labeled `{label}` section"));
            }
        }
        if text.len() < 500 {
            reasons.push(format!(
                "synthesis is only {} characters; needs at least 500",
                text.len()
            ));
        }

        let cited = qms_agents::extract_identifiers(text);
        let validated: std::collections::HashSet<_> = inputs
            .findings
            .iter()
            .map(|f| (f.identifier_kind, f.identifier.clone()))
            .collect();
        let referenced_and_validated = cited.iter().filter(|c| validated.contains(c)).count();
        if referenced_and_validated < 2 {
            reasons.push(format!(
                "only {referenced_and_validated} identifier(s) referenced that are also in the validated set; need >= 2"
            ));
        }

        GateResult {
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

pub struct AnalysisGate;

impl Gate for AnalysisGate {
    fn name(&self) -> &'static str {
        "analysis"
    }

    fn evaluate(&self, inputs: &GateInputs) -> GateResult {
        let Some(analysis) = &inputs.analysis else {
            return GateResult {
                passed: false,
                reasons: vec!["no data analysis artifact present".to_string()],
            };
        };

        let mut reasons = Vec::new();
        for field in [
            "design",
            "primary_outcome_metric",
            "assumed_effect",
            "alpha",
            "power",
        ] {
            if analysis.get(field).is_none() {
                reasons.push(format!("analysis artifact is missing `{field}`"));
            }
        }

        match analysis.get("sample_size_n").and_then(Value::as_i64) {
            Some(n) if (10..=2000).contains(&n) => {}
            Some(n) => {
                if analysis.get("sample_size_justification").is_none() {
                    reasons.push(format!(
                        "sample_size_n {n} is outside [10, 2000] and carries no justification"
                    ));
                }
            }
            None => reasons.push("analysis artifact is missing `sample_size_n`".to_string()),
        }

        match analysis.get("confidence").and_then(Value::as_f64) {
            Some(c) if (0.0..=1.0).contains(&c) => {}
            _ => reasons.push("analysis `confidence` must be present and in [0, 1]".to_string()),
        }

        GateResult {
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qms_types::IdentifierKind;

    fn finding(identifier: &str, retracted: bool) -> Finding {
        Finding {
            finding_id: identifier.to_string(),
            project_id: "proj-1".to_string(),
            source: "pubmed".to_string(),
            identifier_kind: IdentifierKind::Pmid,
            identifier: identifier.to_string(),
            title: "Study".to_string(),
            authors: Vec::new(),
            publication_year: Some(2022),
            venue: None,
            abstract_text: None,
            evidence_level: Some(2),
            retracted,
            selected: true,
            retrieved_at: Utc::now(),
        }
    }

    #[test]
    fn picot_gate_requires_terminal_question_mark_and_min_length() {
        let inputs = GateInputs {
            picot_text: Some("Population intervention comparison outcome time short".to_string()),
            ..Default::default()
        };
        let result = PicotGate.evaluate(&inputs);
        assert!(!result.passed);
        assert!(result.reasons.iter().any(|r| r.contains("end with")));
    }

    #[test]
    fn search_gate_fails_below_three_distinct_findings() {
        let inputs = GateInputs {
            findings: vec![finding("1", false)],
            ..Default::default()
        };
        assert!(!SearchGate.evaluate(&inputs).passed);
    }

    #[test]
    fn validation_gate_fails_on_high_retraction_rate() {
        let inputs = GateInputs {
            findings: vec![finding("1", true), finding("2", false)],
            citation_assertions: Vec::new(),
            ..Default::default()
        };
        let result = ValidationGate.evaluate(&inputs);
        assert!(!result.passed);
        assert!(result.reasons.iter().any(|r| r.contains("retraction rate")));
    }

    #[test]
    fn analysis_gate_allows_out_of_range_n_with_justification() {
        let analysis = serde_json::json!({
            "design": "pre-post",
            "primary_outcome_metric": "fall rate",
            "assumed_effect": 0.2,
            "alpha": 0.05,
            "power": 0.8,
            "sample_size_n": 5000,
            "sample_size_justification": "matches unit census",
            "confidence": 0.7,
        });
        let inputs = GateInputs {
            analysis: Some(analysis),
            ..Default::default()
        };
        assert!(AnalysisGate.evaluate(&inputs).passed);
    }
}
