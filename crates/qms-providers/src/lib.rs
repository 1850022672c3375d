mod adapter;
mod arxiv;
mod clinicaltrials;
mod core_api;
mod doaj;
mod document_reader;
mod medrxiv;
mod openfda;
mod pubmed;
mod semantic_scholar;
mod web_search;

pub use adapter::{AdapterConfig, AdapterRegistry, EndpointConfig, ToolAdapter};

use std::sync::Arc;

/// Builds the full adapter registry from configuration: every adapter is
/// always registered, optional ones (those needing an API key that
/// wasn't supplied) register in a disabled state and return
/// `ToolError::Unavailable` rather than failing registry construction.
pub fn build_registry(config: AdapterConfig) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(pubmed::PubMedAdapter::new(&config)));
    registry.register(Arc::new(arxiv::ArxivAdapter::new(&config)));
    registry.register(Arc::new(clinicaltrials::ClinicalTrialsAdapter::new(&config)));
    registry.register(Arc::new(medrxiv::MedRxivAdapter::new(&config)));
    registry.register(Arc::new(semantic_scholar::SemanticScholarAdapter::new(&config)));
    registry.register(Arc::new(core_api::CoreAdapter::new(&config)));
    registry.register(Arc::new(doaj::DoajAdapter::new(&config)));
    registry.register(Arc::new(openfda::OpenFdaAdapter::new(&config)));
    registry.register(Arc::new(web_search::WebSearchAdapter::new(&config)));
    registry.register(Arc::new(document_reader::DocumentReaderAdapter::new(&config)));
    registry
}
