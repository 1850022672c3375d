use async_trait::async_trait;
use once_cell::sync::Lazy;
use qms_types::{AgentOutput, AgentReply, QmsError};
use regex::Regex;
use serde_json::json;

use crate::core::{refuse, Agent, AgentContext};
use crate::stats::two_proportion_sample_size;

const DESIGN: &str = "two-arm two-proportion z-test (pre/post comparison)";
const MIN_SAMPLE_SIZE: u32 = 10;
const MAX_SAMPLE_SIZE: u32 = 2000;
const DEFAULT_ALPHA: f64 = 0.05;
const DEFAULT_POWER: f64 = 0.8;
const DEFAULT_BASELINE_RATE: f64 = 0.5;

static EFFECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*(reduction|increase|decrease)\s*(?:in\s+([a-z][a-z \-]*))?")
        .unwrap()
});
static ALPHA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)alpha\s*(?:of|=|:)?\s*(\d*\.\d+|\d+)").unwrap());
static POWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*power|power\s*(?:of|=|:)?\s*(\d*\.\d+)").unwrap());
static BASELINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)baseline(?:\s+rate)?\s*(?:of|=|:)?\s*(\d+(?:\.\d+)?)\s*%").unwrap());

struct ParsedRequest {
    relative_effect: f64,
    direction_is_reduction: bool,
    outcome_metric: String,
    alpha: f64,
    power: f64,
    baseline_rate: f64,
    baseline_explicit: bool,
}

fn parse_request(text: &str) -> Option<ParsedRequest> {
    let effect_caps = EFFECT_RE.captures(text)?;
    let relative_effect: f64 = effect_caps[1].parse().ok()?;
    let direction_is_reduction = effect_caps[2].to_lowercase() != "increase";
    let outcome_metric = effect_caps
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "primary outcome".to_string());

    let alpha = ALPHA_RE
        .captures(text)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(DEFAULT_ALPHA);

    let power = POWER_RE
        .captures(text)
        .and_then(|c| {
            c.get(1)
                .map(|m| m.as_str().parse::<f64>().ok().map(|p| p / 100.0))
                .or_else(|| Some(c.get(2).and_then(|m| m.as_str().parse::<f64>().ok())))
        })
        .flatten()
        .unwrap_or(DEFAULT_POWER);

    let (baseline_rate, baseline_explicit) = BASELINE_RE
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|pct| (pct / 100.0, true))
        .unwrap_or((DEFAULT_BASELINE_RATE, false));

    Some(ParsedRequest {
        relative_effect: relative_effect / 100.0,
        direction_is_reduction,
        outcome_metric,
        alpha,
        power,
        baseline_rate,
        baseline_explicit,
    })
}

/// Computes a deterministic sample-size / power plan, never delegating the
/// arithmetic to a model: two-proportion z-test against a stated or
/// assumed baseline rate, refusing outright when the computed size falls
/// outside what's feasible for a unit-level QI project.
pub struct StatisticalPlanningAgent;

impl StatisticalPlanningAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StatisticalPlanningAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for StatisticalPlanningAgent {
    fn key(&self) -> &'static str {
        "statistical_planning"
    }

    fn display_name(&self) -> &'static str {
        "Statistical Planning"
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError> {
        let request = ctx
            .task
            .params
            .get("request")
            .or_else(|| ctx.task.params.get("text"))
            .or_else(|| ctx.task.params.get("picot"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if request.trim().is_empty() {
            return Ok(refuse(
                "missing_request",
                "I need the assumed effect size (and ideally alpha/power) before I can compute a sample size.",
            ));
        }

        let Some(parsed) = parse_request(request) else {
            return Ok(refuse(
                "missing_effect_size",
                "I couldn't find an assumed effect size (e.g. \"30% reduction in falls\") in that request, so I can't compute a sample size.",
            ));
        };

        if parsed.relative_effect <= 0.0 || parsed.relative_effect >= 1.0 {
            return Ok(refuse(
                "implausible_effect_size",
                "The assumed effect size has to be a percentage strictly between 0 and 100.",
            ));
        }

        let p1 = parsed.baseline_rate;
        let p2 = if parsed.direction_is_reduction {
            p1 * (1.0 - parsed.relative_effect)
        } else {
            (p1 * (1.0 + parsed.relative_effect)).min(0.999)
        };

        let sample_size_n = two_proportion_sample_size(p1, p2, parsed.alpha, parsed.power);

        if !(MIN_SAMPLE_SIZE..=MAX_SAMPLE_SIZE).contains(&sample_size_n) {
            return Ok(refuse(
                "infeasible_sample_size",
                format!(
                    "That assumption implies a sample size of {sample_size_n}, which is outside the \
                     {MIN_SAMPLE_SIZE}-{MAX_SAMPLE_SIZE} range this tool treats as feasible for a \
                     unit-level QI project; narrow the scope or revisit the assumed effect."
                ),
            ));
        }

        let confidence = if parsed.baseline_explicit { 0.8 } else { 0.5 };

        Ok(AgentReply::Ok(AgentOutput {
            task_id: ctx.task.task_id.clone(),
            agent_key: self.key().to_string(),
            result: json!({
                "design": DESIGN,
                "primary_outcome_metric": parsed.outcome_metric,
                "assumed_effect": {
                    "baseline_rate": p1,
                    "target_rate": p2,
                    "relative_effect": parsed.relative_effect,
                },
                "alpha": parsed.alpha,
                "power": parsed.power,
                "sample_size_n": sample_size_n,
                "confidence": confidence,
            }),
            artifacts: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qms_types::AgentTask;
    use serde_json::Map;
    use std::collections::HashSet;

    fn ctx(request: &str) -> AgentContext {
        let mut params = Map::new();
        params.insert("request".to_string(), json!(request));
        AgentContext {
            project_id: "proj-1".to_string(),
            task: AgentTask {
                task_id: "t1".to_string(),
                agent_key: "statistical_planning".to_string(),
                params,
                depends_on: Vec::new(),
                parallel_group: None,
            },
            verified_identifiers: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn computes_a_feasible_sample_size_for_a_moderate_effect() {
        let agent = StatisticalPlanningAgent::new();
        let reply = agent
            .run(&ctx("Calculate sample size for 30% reduction in falls, 80% power, alpha 0.05"))
            .await
            .unwrap();
        let AgentReply::Ok(output) = reply else {
            panic!("expected Ok, got a refusal");
        };
        let n = output.result["sample_size_n"].as_u64().unwrap();
        assert!((10..=2000).contains(&n));
        assert_eq!(output.result["design"], DESIGN);
        assert_eq!(output.result["alpha"], 0.05);
        assert_eq!(output.result["power"], 0.8);
    }

    #[tokio::test]
    async fn refuses_when_no_effect_size_is_stated() {
        let agent = StatisticalPlanningAgent::new();
        let reply = agent.run(&ctx("Help me plan the analysis")).await.unwrap();
        assert!(matches!(reply, AgentReply::Refusal(_)));
    }

    #[tokio::test]
    async fn refuses_when_the_implied_sample_size_is_infeasible() {
        let agent = StatisticalPlanningAgent::new();
        // A near-undetectable effect on a rare baseline blows past 2000.
        let reply = agent
            .run(&ctx("Detect a 2% reduction in a baseline rate of 5%, alpha 0.05"))
            .await
            .unwrap();
        assert!(matches!(reply, AgentReply::Refusal(_)));
    }
}
