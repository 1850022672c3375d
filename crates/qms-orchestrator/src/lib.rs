pub mod context;
pub mod executor;
pub mod gates;
pub mod planner;
pub mod synth;

pub use context::{ConversationContext, Phase};
pub use executor::{ExecutionSummary, Executor, TaskOutcome};
pub use gates::{Gate, GateInputs, GateResult};
pub use planner::{AgentCapability, PlanOutcome, Planner};
pub use synth::{ResponseSynthesizer, SuggestionEngine, CLINICAL_DISCLAIMER};
