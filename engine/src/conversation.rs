use chrono::Utc;
use qms_orchestrator::gates::{AnalysisGate, Gate, GateInputs, PicotGate, SearchGate, SynthesisGate, ValidationGate};
use qms_orchestrator::{ConversationContext, ExecutionSummary, Phase, PlanOutcome, CLINICAL_DISCLAIMER};
use qms_types::{AuditEntry, CitationAssertion, Finding};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub reply: String,
    pub phase: &'static str,
    pub suggestions: Vec<&'static str>,
    pub gate_notes: Vec<String>,
}

/// Drives one user turn end to end: rehydrate context, plan, execute,
/// evaluate the gate for whatever phase the turn just reached, synthesize
/// a reply, persist, and record the audit trail.
pub async fn handle_message(
    state: &AppState,
    project_id: &str,
    message: &str,
) -> anyhow::Result<ConversationResponse> {
    let runtime = state.projects.runtime(project_id).await?;

    let mut ctx = ConversationContext::new(project_id, "default", runtime.store.clone());
    ctx.load_from_db().await?;
    ctx.add_message("user", message, Value::Null).await;

    let context_summary = ctx.get_summary();
    let previously_used_agents = previously_used_agent_keys(&ctx);

    let outcome = state
        .planner
        .plan(
            project_id,
            message,
            &context_summary,
            &state.capabilities,
            &previously_used_agents,
        )
        .await
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    let (reply, results_for_audit) = match outcome {
        PlanOutcome::Clarify { canonical_prompts } => {
            let suggestions_text = canonical_prompts.join("\n- ");
            (
                format!(
                    "I wasn't able to map that to a concrete next step. Here are some things I can help with:\n- {suggestions_text}\n\n{CLINICAL_DISCLAIMER}"
                ),
                Vec::new(),
            )
        }
        PlanOutcome::Plan(plan) => {
            let summary: ExecutionSummary = runtime
                .executor
                .execute(&plan, &mut ctx, CancellationToken::new())
                .await
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;

            for outcome in &summary.outcomes {
                state
                    .audit
                    .append(&AuditEntry {
                        entry_id: uuid::Uuid::new_v4().to_string(),
                        project_id: project_id.to_string(),
                        agent_key: outcome.agent_key.clone(),
                        event: "agent_turn".to_string(),
                        recorded_at: Utc::now(),
                        detail: outcome_detail(outcome),
                    })
                    .await
                    .ok();
            }

            let results = results_map(&summary);
            let reply = state.synthesizer.synthesize(&results).await;
            (reply, summary.outcomes.iter().map(|o| o.task_id.clone()).collect())
        }
    };

    let phase = ctx.phase();
    let gate_notes = evaluate_gate_for_phase(phase, &ctx);

    ctx.add_message("assistant", &reply, Value::Null).await;
    ctx.save_to_db().await?;

    tracing::info!(project_id, tasks = ?results_for_audit, "conversation turn completed");

    Ok(ConversationResponse {
        reply,
        phase: phase.key(),
        suggestions: qms_orchestrator::SuggestionEngine::suggestions(phase.key()),
        gate_notes,
    })
}

fn outcome_detail(outcome: &qms_orchestrator::TaskOutcome) -> Value {
    match (&outcome.reply, &outcome.error) {
        (Some(reply), _) => serde_json::to_value(reply).unwrap_or(Value::Null),
        (None, Some(err)) => serde_json::json!({ "error": err.to_string(), "kind": err.kind() }),
        (None, None) => serde_json::json!({ "skipped": outcome.skipped }),
    }
}

fn results_map(summary: &ExecutionSummary) -> Map<String, Value> {
    let mut results = Map::new();
    for outcome in &summary.outcomes {
        let value = match &outcome.reply {
            Some(qms_types::AgentReply::Ok(output)) => output.result.clone(),
            Some(qms_types::AgentReply::Refusal(reason)) => {
                serde_json::json!({ "refused": reason.code, "message": reason.message })
            }
            None if outcome.skipped => serde_json::json!({ "skipped": true }),
            None => serde_json::json!({
                "error": outcome.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
            }),
        };
        results.insert(outcome.task_id.clone(), value);
    }
    results
}

fn previously_used_agent_keys(ctx: &ConversationContext) -> Vec<String> {
    const MAPPING: &[(&str, &str)] = &[
        ("picot", "picot"),
        ("search_results", "literature_search"),
        ("validated_articles", "citation_validation"),
        ("synthesis", "evidence_synthesis"),
        ("analysis", "statistical_planning"),
        ("writing_draft", "writing"),
    ];
    MAPPING
        .iter()
        .filter(|(artifact_key, _)| ctx.has_artifact(artifact_key))
        .map(|(_, agent_key)| agent_key.to_string())
        .collect()
}

/// Evaluates the gate associated with whatever phase the conversation is
/// currently in, surfacing unmet requirements to the user rather than
/// silently blocking the next turn; the planner decides what runs next,
/// the gate only reports readiness.
fn evaluate_gate_for_phase(phase: Phase, ctx: &ConversationContext) -> Vec<String> {
    let inputs = build_gate_inputs(ctx);
    let result = match phase {
        Phase::PicotDrafted => PicotGate.evaluate(&inputs),
        Phase::Searching => SearchGate.evaluate(&inputs),
        Phase::Validated => ValidationGate.evaluate(&inputs),
        Phase::Synthesized => SynthesisGate.evaluate(&inputs),
        Phase::Analyzed => AnalysisGate.evaluate(&inputs),
        Phase::Intake | Phase::Writing => return Vec::new(),
    };
    if result.passed {
        Vec::new()
    } else {
        result.reasons
    }
}

fn build_gate_inputs(ctx: &ConversationContext) -> GateInputs {
    let picot_text = ctx
        .get_artifact("picot")
        .and_then(|v| v.get("picot_draft"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let findings: Vec<Finding> = ctx
        .get_artifact("search_results")
        .and_then(|v| v.get("findings"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let citation_assertions: Vec<CitationAssertion> = ctx
        .get_artifact("validated_articles")
        .and_then(|v| v.get("assertions"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let synthesis_text = ctx
        .get_artifact("synthesis")
        .and_then(|v| v.get("synthesis"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let analysis = ctx.get_artifact("analysis").cloned();

    GateInputs {
        picot_text,
        findings,
        citation_assertions,
        synthesis_text,
        analysis,
    }
}
