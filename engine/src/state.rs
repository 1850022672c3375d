use std::sync::Arc;

use qms_agents::{EchoReasoner, Reasoner};
use qms_audit::AuditLog;
use qms_resilience::CircuitRegistry;
use qms_orchestrator::{AgentCapability, Planner, ResponseSynthesizer};

use crate::config::EngineConfig;
use crate::projects::ProjectRegistry;
use crate::reasoner::HttpReasoner;

const AUDIT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Capability table handed to the planner's LLM decomposition prompt,
/// mirroring the fixed seven-agent registry `qms_agents::build_registry`
/// wires up. Kept here rather than derived from the registry at runtime
/// since a capability description is a planning-time concept that has no
/// other runtime representation.
pub fn agent_capabilities() -> Vec<AgentCapability> {
    vec![
        AgentCapability {
            agent_key: "picot".to_string(),
            capability: "drafts a PICOT-formatted research question".to_string(),
            actions: vec!["draft".to_string()],
        },
        AgentCapability {
            agent_key: "literature_search".to_string(),
            capability: "searches bibliographic sources for relevant studies".to_string(),
            actions: vec!["search".to_string()],
        },
        AgentCapability {
            agent_key: "citation_validation".to_string(),
            capability: "checks citations in a draft against verified search results".to_string(),
            actions: vec!["validate".to_string()],
        },
        AgentCapability {
            agent_key: "evidence_synthesis".to_string(),
            capability: "synthesizes saved findings into a themed evidence summary".to_string(),
            actions: vec!["synthesize".to_string()],
        },
        AgentCapability {
            agent_key: "statistical_planning".to_string(),
            capability: "proposes a statistical analysis plan for a PICOT question".to_string(),
            actions: vec!["plan".to_string()],
        },
        AgentCapability {
            agent_key: "timeline".to_string(),
            capability: "lists or updates project milestones".to_string(),
            actions: vec!["list".to_string(), "upsert".to_string()],
        },
        AgentCapability {
            agent_key: "writing".to_string(),
            capability: "drafts a report section from instructions".to_string(),
            actions: vec!["draft".to_string()],
        },
    ]
}

#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<ProjectRegistry>,
    pub planner: Arc<Planner>,
    pub synthesizer: Arc<ResponseSynthesizer>,
    pub audit: Arc<AuditLog>,
    pub circuits: Arc<CircuitRegistry>,
    pub capabilities: Arc<Vec<AgentCapability>>,
}

impl AppState {
    pub fn build(config: EngineConfig) -> anyhow::Result<Self> {
        let circuits = config.adapters.circuits.clone();
        let adapters = Arc::new(qms_providers::build_registry(config.adapters));

        let reasoner: Arc<dyn Reasoner> = if config.llm.api_key.trim().is_empty() {
            Arc::new(EchoReasoner)
        } else {
            Arc::new(HttpReasoner::new(&config.llm))
        };

        let projects = Arc::new(ProjectRegistry::new(
            config.store.project_data_root.clone(),
            adapters,
            reasoner.clone(),
        ));
        let planner = Arc::new(Planner::new(reasoner.clone()));
        let synthesizer = Arc::new(ResponseSynthesizer::new(reasoner));
        let audit = Arc::new(AuditLog::new(config.store.audit_log_root.clone(), AUDIT_MAX_BYTES));

        Ok(Self {
            projects,
            planner,
            synthesizer,
            audit,
            circuits,
            capabilities: Arc::new(agent_capabilities()),
        })
    }
}
