//! Auto-response runtime.
//!
//! This crate drives a seller pass end to end:
//! - asks the draft generator (`llm`) for a candidate reply and intent
//! - routes, gates and validates it with the deterministic rules from `replyguard-core`
//! - publishes through the channel connector (`connector`)
//! - records every terminal decision in the audit log
//!
//! # Safety Principle
//!
//! The generator is strictly a writer. It NEVER decides whether a reply is sent; scenario
//! routing, the rating gate, link policy and guardrails do.

pub mod connector;
pub mod llm;
pub mod orchestrator;

pub use connector::{ChannelConnector, ConnectorError, HttpChannelConnector, SendRequest};
pub use llm::{Draft, DraftError, DraftGenerator, HttpDraftGenerator, ThreadContext};
pub use orchestrator::{
    AutoResponseOrchestrator, InteractionOutcome, OrchestratorError, OrchestratorPorts,
    OrchestratorSettings, Pacer, PassReport, PassStatus, TokioPacer,
};
