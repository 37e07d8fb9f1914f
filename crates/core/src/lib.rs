pub mod audit;
pub mod config;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod guardrails;
pub mod linking;
pub mod pacing;
pub mod router;

pub use audit::{decision_key, ActionTaken, AuditEvent};
pub use decision::{
    enrich_with_promo, rating_gate, CheckedText, Enrichment, ManualReplyCheck, PreviewOutcome,
    PreviewRequest, ReplyGuard, MIN_AUTO_REVIEW_RATING,
};
pub use domain::interaction::{
    metadata_keys, Channel, Interaction, InteractionId, InteractionStatus, SellerId,
};
pub use domain::lease::SellerLease;
pub use domain::promo::{PromoCode, PromoId};
pub use domain::scenario::{
    migrate_legacy_intents, Intent, ScenarioAction, ScenarioConfig, SellerSettings,
    SellerSettingsDocument,
};
pub use errors::{ApplicationError, DomainError};
pub use guardrails::{
    GuardrailCategory, GuardrailValidator, GuardrailViolation, PhraseSanitizer, Severity,
    ValidationReport,
};
pub use linking::{LinkCandidate, LinkPolicyDecision, LinkResolver, LinkType, MatchReason};
pub use router::{RouteAction, RouteDecision, ScenarioRouter};
