mod citation_validation;
mod core;
mod evidence_synthesis;
mod grounding;
mod literature_search;
mod picot;
mod reasoner;
mod stats;
mod statistical_planning;
mod timeline;
mod writing;

pub use core::{Agent, AgentContext, AgentRegistry};
pub use grounding::{extract_identifiers, grounding_check};
pub use reasoner::{EchoReasoner, Reasoner};

use std::sync::Arc;

use qms_providers::AdapterRegistry;
use qms_store::ProjectStore;

/// Builds the fixed seven-agent registry. These are not user-authored
/// via markdown frontmatter: the domain calls for a closed set of
/// specialized agents, so the registry is a compiled default table with
/// no custom-agent loader.
pub fn build_registry(
    adapters: Arc<AdapterRegistry>,
    store: Arc<ProjectStore>,
    reasoner: Arc<dyn Reasoner>,
) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(picot::PicotAgent::new(reasoner.clone())));
    registry.register(Arc::new(literature_search::LiteratureSearchAgent::new(
        adapters.clone(),
        store.clone(),
    )));
    registry.register(Arc::new(citation_validation::CitationValidationAgent::new(
        adapters.clone(),
        store.clone(),
    )));
    registry.register(Arc::new(evidence_synthesis::EvidenceSynthesisAgent::new(
        store.clone(),
        reasoner.clone(),
    )));
    registry.register(Arc::new(statistical_planning::StatisticalPlanningAgent::new()));
    registry.register(Arc::new(timeline::TimelineAgent::new(store.clone())));
    registry.register(Arc::new(writing::WritingAgent::new(store, reasoner)));
    registry
}
