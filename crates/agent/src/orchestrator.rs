//! Auto-Response Orchestrator.
//!
//! One pass handles one seller: take the seller lease, derive eligible interactions from
//! persisted state, and drive each one through the gates sequentially. Per-interaction
//! failures become skipped outcomes; only lease or eligibility storage failures abort a pass.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use replyguard_core::audit::{ActionTaken, AuditEvent};
use replyguard_core::config::{AppConfig, MAX_INTERACTIONS_PER_CYCLE};
use replyguard_core::decision::{enrich_with_promo, rating_gate, CheckedText, ReplyGuard};
use replyguard_core::domain::interaction::{metadata_keys, Channel, Interaction, InteractionId, SellerId};
use replyguard_core::domain::promo::PromoCode;
use replyguard_core::domain::scenario::SellerSettings;
use replyguard_core::linking::{LinkCandidate, TimelineEntry};
use replyguard_core::pacing::send_delay;
use replyguard_core::router::RouteAction;
use replyguard_db::repositories::{
    AuditRepository, InteractionRepository, LeaseRepository, PromoRepository, RepositoryError,
    SellerSettingsRepository,
};

use crate::connector::{ChannelConnector, ConnectorError, SendRequest};
use crate::llm::{Draft, DraftError, DraftGenerator, ThreadContext};

/// Pending interactions fetched per processing slot, so scope filtering can still fill the cap.
const ELIGIBILITY_SCAN_FACTOR: u32 = 5;

/// Upper bound for configured durations converted to calendar time.
const MAX_CALENDAR_SECS: u64 = 10 * 366 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub max_per_cycle: u32,
    pub pass_deadline: Duration,
    pub lease_ttl: chrono::Duration,
    pub policy_version: String,
    pub history_window: chrono::Duration,
    pub generator_timeout: Duration,
    pub connector_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let orchestrator = &config.orchestrator;
        Self {
            max_per_cycle: orchestrator.max_per_cycle.clamp(1, MAX_INTERACTIONS_PER_CYCLE),
            pass_deadline: Duration::from_secs(orchestrator.pass_deadline_secs),
            lease_ttl: calendar_secs(orchestrator.lease_ttl_secs),
            policy_version: orchestrator.policy_version.clone(),
            history_window: calendar_secs(u64::from(orchestrator.history_window_days) * 86_400),
            generator_timeout: Duration::from_secs(config.draft_generator.timeout_secs),
            connector_timeout: Duration::from_secs(config.connector.timeout_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_per_cycle: MAX_INTERACTIONS_PER_CYCLE,
            pass_deadline: Duration::from_secs(240),
            lease_ttl: chrono::Duration::seconds(600),
            policy_version: "guardrails-v1".to_string(),
            history_window: chrono::Duration::days(90),
            generator_timeout: Duration::from_secs(30),
            connector_timeout: Duration::from_secs(15),
        }
    }
}

fn calendar_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs.min(MAX_CALENDAR_SECS)).unwrap_or_default())
}

/// Waits between consecutive sends of one pass.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Storage and external capabilities the orchestrator drives.
#[derive(Clone)]
pub struct OrchestratorPorts {
    pub interactions: Arc<dyn InteractionRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub seller_settings: Arc<dyn SellerSettingsRepository>,
    pub promos: Arc<dyn PromoRepository>,
    pub leases: Arc<dyn LeaseRepository>,
    pub generator: Arc<dyn DraftGenerator>,
    pub connector: Arc<dyn ChannelConnector>,
    pub pacer: Arc<dyn Pacer>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("seller lease storage failed: {0}")]
    Lease(#[source] RepositoryError),
    #[error("eligibility query failed: {0}")]
    Eligibility(#[source] RepositoryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    DeadlineExceeded,
    LockContended,
    SellerDisabled,
    ConfigUnavailable,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::LockContended => "lock_contended",
            Self::SellerDisabled => "seller_disabled",
            Self::ConfigUnavailable => "config_unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InteractionOutcome {
    pub interaction_id: InteractionId,
    pub action: ActionTaken,
    pub reason: String,
    pub safety_event: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
}

impl InteractionOutcome {
    fn new(interaction_id: &InteractionId, action: ActionTaken, reason: &str) -> Self {
        Self {
            interaction_id: interaction_id.clone(),
            action,
            reason: reason.to_string(),
            safety_event: false,
            final_text: None,
        }
    }

    fn skipped(interaction_id: &InteractionId, reason: &str) -> Self {
        Self::new(interaction_id, ActionTaken::Skipped, reason)
    }

    fn safety(mut self) -> Self {
        self.safety_event = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PassReport {
    pub seller_id: SellerId,
    pub correlation_id: String,
    pub status: PassStatus,
    pub outcomes: Vec<InteractionOutcome>,
    /// Eligible interactions left for the next invocation (cap or deadline).
    pub deferred: usize,
}

impl PassReport {
    fn empty(seller_id: &SellerId, correlation_id: &str, status: PassStatus) -> Self {
        Self {
            seller_id: seller_id.clone(),
            correlation_id: correlation_id.to_string(),
            status,
            outcomes: Vec::new(),
            deferred: 0,
        }
    }

    pub fn count(&self, action: ActionTaken) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.action == action).count()
    }
}

/// Read-only state shared by every interaction of one pass.
struct PassContext<'a> {
    seller_id: &'a SellerId,
    correlation_id: &'a str,
    settings: &'a SellerSettings,
    decision_scope: &'a str,
    promos: &'a [PromoCode],
    history: &'a [Interaction],
}

pub struct AutoResponseOrchestrator {
    guard: ReplyGuard,
    ports: OrchestratorPorts,
    settings: OrchestratorSettings,
    holder_id: String,
}

impl AutoResponseOrchestrator {
    pub fn new(guard: ReplyGuard, ports: OrchestratorPorts, settings: OrchestratorSettings) -> Self {
        let holder_id = format!("pass-{}-{}", std::process::id(), Uuid::new_v4());
        Self { guard, ports, settings, holder_id }
    }

    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Runs one pass for `seller_id`. Lock contention is a normal, empty report.
    pub async fn run_pass(&self, seller_id: &SellerId) -> Result<PassReport, OrchestratorError> {
        let correlation_id = Uuid::new_v4().to_string();

        let lease = self
            .ports
            .leases
            .try_acquire(seller_id, &self.holder_id, Utc::now(), self.settings.lease_ttl)
            .await
            .map_err(OrchestratorError::Lease)?;
        if lease.is_none() {
            info!(
                event_name = "auto_response.pass.lock_contended",
                seller_id = %seller_id.0,
                correlation_id = %correlation_id,
                "another pass holds the seller lease; skipping this invocation"
            );
            return Ok(PassReport::empty(seller_id, &correlation_id, PassStatus::LockContended));
        }

        info!(
            event_name = "auto_response.pass.started",
            seller_id = %seller_id.0,
            correlation_id = %correlation_id,
            holder_id = %self.holder_id,
            "seller pass started"
        );

        let result = self.run_locked(seller_id, &correlation_id).await;

        match self.ports.leases.release(seller_id, &self.holder_id).await {
            Ok(true) => {}
            Ok(false) => warn!(
                event_name = "auto_response.pass.lease_lost",
                seller_id = %seller_id.0,
                correlation_id = %correlation_id,
                "seller lease expired or changed hands before release"
            ),
            Err(error) => warn!(
                event_name = "auto_response.pass.lease_release_failed",
                seller_id = %seller_id.0,
                correlation_id = %correlation_id,
                error = %error,
                "failed to release seller lease; it will expire on its own"
            ),
        }

        if let Ok(report) = &result {
            info!(
                event_name = "auto_response.pass.finished",
                seller_id = %seller_id.0,
                correlation_id = %correlation_id,
                status = report.status.as_str(),
                sent = report.count(ActionTaken::Sent),
                drafted = report.count(ActionTaken::Drafted),
                blocked = report.count(ActionTaken::Blocked),
                skipped = report.count(ActionTaken::Skipped),
                deferred = report.deferred,
                "seller pass finished"
            );
        }

        result
    }

    async fn run_locked(
        &self,
        seller_id: &SellerId,
        correlation_id: &str,
    ) -> Result<PassReport, OrchestratorError> {
        let started = Instant::now();

        let settings = match self.ports.seller_settings.load(seller_id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!(
                    event_name = "auto_response.skipped.no_settings",
                    seller_id = %seller_id.0,
                    correlation_id = %correlation_id,
                    "seller has no auto-response settings"
                );
                return Ok(PassReport::empty(seller_id, correlation_id, PassStatus::SellerDisabled));
            }
            Err(error) => {
                warn!(
                    event_name = "auto_response.config.unreadable",
                    seller_id = %seller_id.0,
                    correlation_id = %correlation_id,
                    error = %error,
                    "seller settings could not be read; skipping pass"
                );
                return Ok(PassReport::empty(
                    seller_id,
                    correlation_id,
                    PassStatus::ConfigUnavailable,
                ));
            }
        };

        if !settings.enabled {
            debug!(
                event_name = "auto_response.skipped.disabled",
                seller_id = %seller_id.0,
                correlation_id = %correlation_id,
                "auto-response disabled for seller"
            );
            return Ok(PassReport::empty(seller_id, correlation_id, PassStatus::SellerDisabled));
        }

        let decision_scope = settings.decision_scope(&self.settings.policy_version);
        let channels: Vec<Channel> = settings.allowed_channels.iter().copied().collect();
        let scan_limit = self.settings.max_per_cycle.saturating_mul(ELIGIBILITY_SCAN_FACTOR);
        let pending = self
            .ports
            .interactions
            .list_awaiting_response(seller_id, &channels, &decision_scope, scan_limit)
            .await
            .map_err(OrchestratorError::Eligibility)?;

        let mut eligible = Vec::with_capacity(pending.len());
        let mut out_of_scope = Vec::new();
        for interaction in pending {
            if !settings.allows_channel(interaction.channel) {
                debug!(
                    event_name = "auto_response.skipped.channel_not_allowed",
                    seller_id = %seller_id.0,
                    interaction_id = %interaction.id.0,
                    correlation_id = %correlation_id,
                    channel = interaction.channel.as_str(),
                    "channel not enabled for auto-response"
                );
                continue;
            }
            if !settings.product_in_scope(interaction.product_id.as_deref()) {
                debug!(
                    event_name = "auto_response.skipped.out_of_scope",
                    seller_id = %seller_id.0,
                    interaction_id = %interaction.id.0,
                    correlation_id = %correlation_id,
                    "product outside the seller whitelist"
                );
                out_of_scope.push(interaction);
                continue;
            }
            eligible.push(interaction);
        }

        let cap = self.settings.max_per_cycle as usize;
        let mut deferred = eligible.len().saturating_sub(cap);
        eligible.truncate(cap);

        let now = Utc::now();
        let promos = match self.ports.promos.list_active(seller_id).await {
            Ok(promos) => promos,
            Err(error) => {
                warn!(
                    event_name = "auto_response.promo.unavailable",
                    seller_id = %seller_id.0,
                    correlation_id = %correlation_id,
                    error = %error,
                    "promo codes unavailable; replies go out without promo"
                );
                Vec::new()
            }
        };
        let history = match self
            .ports
            .interactions
            .list_since(seller_id, now - self.settings.history_window)
            .await
        {
            Ok(history) => history,
            Err(error) => {
                warn!(
                    event_name = "auto_response.linking.history_unavailable",
                    seller_id = %seller_id.0,
                    correlation_id = %correlation_id,
                    error = %error,
                    "interaction history unavailable; linking without prior interactions"
                );
                Vec::new()
            }
        };

        let context = PassContext {
            seller_id,
            correlation_id,
            settings: &settings,
            decision_scope: &decision_scope,
            promos: &promos,
            history: &history,
        };

        for interaction in out_of_scope {
            self.commit_decision(interaction, RouteAction::Skip, "product_out_of_scope", &[], &context)
                .await;
        }

        let total = eligible.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut status = PassStatus::Completed;

        for (index, interaction) in eligible.into_iter().enumerate() {
            if started.elapsed() >= self.settings.pass_deadline {
                warn!(
                    event_name = "auto_response.pass.deadline_exceeded",
                    seller_id = %seller_id.0,
                    correlation_id = %correlation_id,
                    remaining = total - index,
                    "pass deadline reached; remaining interactions wait for the next invocation"
                );
                status = PassStatus::DeadlineExceeded;
                deferred += total - index;
                break;
            }

            let outcome = self.process_interaction(interaction, &context).await;

            if outcome.action == ActionTaken::Sent && index + 1 < total {
                let delay = send_delay(outcome.final_text.as_deref().unwrap_or_default());
                debug!(
                    event_name = "auto_response.pacing",
                    seller_id = %seller_id.0,
                    correlation_id = %correlation_id,
                    delay_ms = delay.as_millis() as u64,
                    "pausing before next send"
                );
                self.ports.pacer.pause(delay).await;
            }

            outcomes.push(outcome);
        }

        Ok(PassReport {
            seller_id: seller_id.clone(),
            correlation_id: correlation_id.to_string(),
            status,
            outcomes,
            deferred,
        })
    }

    async fn process_interaction(
        &self,
        interaction: Interaction,
        ctx: &PassContext<'_>,
    ) -> InteractionOutcome {
        if let Err(error) = interaction.validate() {
            warn!(
                event_name = "auto_response.skipped.invalid_interaction",
                seller_id = %ctx.seller_id.0,
                interaction_id = %interaction.id.0,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "interaction violates its invariants"
            );
            let outcome = InteractionOutcome::skipped(&interaction.id, "invalid_interaction");
            self.commit_decision(interaction, RouteAction::Skip, "invalid_interaction", &[], ctx)
                .await;
            return outcome;
        }

        match self.ports.audit.has_sent(&interaction.id).await {
            Ok(false) => {}
            Ok(true) => return self.repair_already_sent(interaction, ctx).await,
            Err(error) => {
                warn!(
                    event_name = "auto_response.skipped.audit_unavailable",
                    seller_id = %ctx.seller_id.0,
                    interaction_id = %interaction.id.0,
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "cannot confirm the interaction was not already answered"
                );
                return InteractionOutcome::skipped(&interaction.id, "audit_unavailable");
            }
        }

        let candidates = self.guard.resolver().resolve(&interaction, ctx.history);
        let thread_context = ThreadContext::from_candidates(self.guard.resolver(), &candidates);
        let thread_context = (!thread_context.is_empty()).then_some(&thread_context);

        let draft = match self.generate(&interaction, thread_context).await {
            Ok(draft) => draft,
            Err((reason, detail)) => {
                warn!(
                    event_name = "auto_response.skipped.generation_failed",
                    seller_id = %ctx.seller_id.0,
                    interaction_id = %interaction.id.0,
                    correlation_id = %ctx.correlation_id,
                    reason,
                    error = %detail,
                    "draft generation failed"
                );
                let event = self
                    .audit_event(&interaction, ctx, ActionTaken::Skipped, reason)
                    .with_link(candidates.first());
                self.record(event, ctx).await;
                return InteractionOutcome::skipped(&interaction.id, reason);
            }
        };

        let route = self.guard.router().route(draft.intent, interaction.channel, ctx.settings);
        if route.action != RouteAction::Block {
            if let Some(reason) = rating_gate(interaction.channel, interaction.rating) {
                return self
                    .block_low_rating(interaction, draft, route.action, reason, &candidates, ctx)
                    .await;
            }
        }

        match route.action {
            RouteAction::Skip => {
                debug!(
                    event_name = "auto_response.skipped.scenario",
                    seller_id = %ctx.seller_id.0,
                    interaction_id = %interaction.id.0,
                    correlation_id = %ctx.correlation_id,
                    intent = %draft.intent,
                    reason = route.reason,
                    "no active scenario for this intent and channel"
                );
                let outcome = InteractionOutcome::skipped(&interaction.id, route.reason);
                self.commit_decision(interaction, RouteAction::Skip, route.reason, &candidates, ctx)
                    .await;
                outcome
            }
            RouteAction::Block => {
                let safety_event = route.is_safety_block();
                if safety_event {
                    warn!(
                        event_name = "auto_response.blocked.safety_gate",
                        seller_id = %ctx.seller_id.0,
                        interaction_id = %interaction.id.0,
                        correlation_id = %ctx.correlation_id,
                        safety_event = true,
                        intent = %draft.intent,
                        reason = route.reason,
                        "intent is never answered automatically"
                    );
                } else {
                    info!(
                        event_name = "auto_response.blocked.scenario",
                        seller_id = %ctx.seller_id.0,
                        interaction_id = %interaction.id.0,
                        correlation_id = %ctx.correlation_id,
                        intent = %draft.intent,
                        reason = route.reason,
                        "seller scenario blocks this intent"
                    );
                }
                let event = self
                    .audit_event(&interaction, ctx, ActionTaken::Blocked, route.reason)
                    .with_intent(draft.intent, draft.confidence)
                    .with_link(candidates.first())
                    .with_texts(Some(draft.text), None);
                self.record(event, ctx).await;

                let outcome =
                    InteractionOutcome::new(&interaction.id, ActionTaken::Blocked, route.reason);
                self.commit_decision(interaction, RouteAction::Block, route.reason, &candidates, ctx)
                    .await;
                if safety_event {
                    outcome.safety()
                } else {
                    outcome
                }
            }
            RouteAction::Draft => {
                self.store_draft(interaction, draft, route.reason, &candidates, ctx).await
            }
            RouteAction::Auto => self.auto_reply(interaction, draft, &candidates, ctx).await,
        }
    }

    /// Reviews below the rating floor are blocked whatever scenario the intent routes to.
    async fn block_low_rating(
        &self,
        interaction: Interaction,
        draft: Draft,
        route_action: RouteAction,
        reason: &'static str,
        candidates: &[LinkCandidate],
        ctx: &PassContext<'_>,
    ) -> InteractionOutcome {
        warn!(
            event_name = "auto_response.blocked.safety_gate",
            seller_id = %ctx.seller_id.0,
            interaction_id = %interaction.id.0,
            correlation_id = %ctx.correlation_id,
            safety_event = true,
            rating = ?interaction.rating,
            scenario_action = route_action.as_str(),
            reason,
            "review rating below the automatic reply floor"
        );
        let event = self
            .audit_event(&interaction, ctx, ActionTaken::Blocked, reason)
            .with_intent(draft.intent, draft.confidence)
            .with_link(candidates.first())
            .with_texts(Some(draft.text), None);
        self.record(event, ctx).await;

        let outcome = InteractionOutcome::new(&interaction.id, ActionTaken::Blocked, reason).safety();
        self.commit_decision(interaction, RouteAction::Block, reason, candidates, ctx).await;
        outcome
    }

    async fn auto_reply(
        &self,
        mut interaction: Interaction,
        draft: Draft,
        candidates: &[LinkCandidate],
        ctx: &PassContext<'_>,
    ) -> InteractionOutcome {
        if let Some(policy) = self.guard.resolver().best_policy(candidates) {
            if !policy.auto_action_allowed {
                info!(
                    event_name = "auto_response.downgraded.link_policy",
                    seller_id = %ctx.seller_id.0,
                    interaction_id = %interaction.id.0,
                    correlation_id = %ctx.correlation_id,
                    reason = policy.reason,
                    "thread link does not authorize an automatic reply; drafting instead"
                );
                return self.store_draft(interaction, draft, policy.reason, candidates, ctx).await;
            }
        }

        let enrichment = enrich_with_promo(
            &draft.text,
            &interaction,
            ctx.settings.promo_opt_in,
            ctx.promos,
            Utc::now(),
        );
        let CheckedText { final_text, report } = self.guard.check_text(&enrichment.text, &interaction);

        if report.is_blocking() {
            info!(
                event_name = "auto_response.blocked.guardrail",
                seller_id = %ctx.seller_id.0,
                interaction_id = %interaction.id.0,
                correlation_id = %ctx.correlation_id,
                violations = ?report.violations,
                "reply failed guardrail validation"
            );
            let event = self
                .audit_event(&interaction, ctx, ActionTaken::Blocked, "guardrail_violation")
                .with_intent(draft.intent, draft.confidence)
                .with_link(candidates.first())
                .with_report(&report)
                .with_texts(Some(draft.text), None);
            self.record(event, ctx).await;

            let outcome =
                InteractionOutcome::new(&interaction.id, ActionTaken::Blocked, "guardrail_violation");
            self.commit_decision(
                interaction,
                RouteAction::Block,
                "guardrail_violation",
                candidates,
                ctx,
            )
            .await;
            return outcome;
        }

        let request = SendRequest {
            channel: interaction.channel,
            external_id: interaction.external_id.clone(),
            text: final_text.clone(),
            extra: BTreeMap::new(),
        };
        if let Err((reason, detail)) = self.dispatch(&request).await {
            warn!(
                event_name = "auto_response.skipped.dispatch_failed",
                seller_id = %ctx.seller_id.0,
                interaction_id = %interaction.id.0,
                correlation_id = %ctx.correlation_id,
                reason,
                error = %detail,
                "reply was not delivered; interaction stays eligible"
            );
            let event = self
                .audit_event(&interaction, ctx, ActionTaken::Skipped, reason)
                .with_intent(draft.intent, draft.confidence)
                .with_link(candidates.first())
                .with_report(&report)
                .with_texts(Some(draft.text), None);
            self.record(event, ctx).await;
            return InteractionOutcome::skipped(&interaction.id, reason);
        }

        let event = self
            .audit_event(&interaction, ctx, ActionTaken::Sent, "all_gates_passed")
            .with_intent(draft.intent, draft.confidence)
            .with_link(candidates.first())
            .with_report(&report)
            .with_texts(Some(draft.text), Some(final_text.clone()));
        self.record(event, ctx).await;

        interaction.record_auto_reply(&final_text, &self.settings.policy_version, Utc::now());
        self.annotate(&mut interaction, RouteAction::Auto, "all_gates_passed", candidates, ctx);
        if let Err(error) = self.ports.interactions.save(interaction.clone()).await {
            error!(
                event_name = "auto_response.commit_failed",
                seller_id = %ctx.seller_id.0,
                interaction_id = %interaction.id.0,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "reply sent but interaction state was not saved; next pass repairs it"
            );
        }

        if let Some(promo_id) = &enrichment.promo_id {
            if let Err(error) = self.ports.promos.increment_usage(promo_id).await {
                warn!(
                    event_name = "auto_response.promo.usage_not_recorded",
                    seller_id = %ctx.seller_id.0,
                    interaction_id = %interaction.id.0,
                    correlation_id = %ctx.correlation_id,
                    promo_id = %promo_id.0,
                    error = %error,
                    "promo usage counter not incremented"
                );
            }
        }

        info!(
            event_name = "auto_response.sent",
            seller_id = %ctx.seller_id.0,
            interaction_id = %interaction.id.0,
            correlation_id = %ctx.correlation_id,
            intent = %draft.intent,
            warnings = report.warnings.len(),
            "automatic reply sent"
        );

        let mut outcome =
            InteractionOutcome::new(&interaction.id, ActionTaken::Sent, "all_gates_passed");
        outcome.final_text = Some(final_text);
        outcome
    }

    async fn store_draft(
        &self,
        mut interaction: Interaction,
        draft: Draft,
        reason: &'static str,
        candidates: &[LinkCandidate],
        ctx: &PassContext<'_>,
    ) -> InteractionOutcome {
        let CheckedText { final_text, report } = self.guard.check_text(&draft.text, &interaction);

        interaction.metadata.insert(metadata_keys::DRAFT_TEXT.to_string(), final_text.clone().into());
        interaction
            .metadata
            .insert(metadata_keys::DRAFT_INTENT.to_string(), draft.intent.as_str().into());
        interaction.metadata.insert(
            metadata_keys::DRAFT_VIOLATIONS.to_string(),
            serde_json::to_value(&report.violations).unwrap_or_default(),
        );
        self.annotate(&mut interaction, RouteAction::Draft, reason, candidates, ctx);

        if let Err(error) = self.ports.interactions.save(interaction.clone()).await {
            warn!(
                event_name = "auto_response.skipped.draft_not_saved",
                seller_id = %ctx.seller_id.0,
                interaction_id = %interaction.id.0,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "draft could not be stored"
            );
            let event = self
                .audit_event(&interaction, ctx, ActionTaken::Skipped, "persistence_failed")
                .with_intent(draft.intent, draft.confidence)
                .with_link(candidates.first())
                .with_texts(Some(final_text), None);
            self.record(event, ctx).await;
            return InteractionOutcome::skipped(&interaction.id, "persistence_failed");
        }

        info!(
            event_name = "auto_response.drafted",
            seller_id = %ctx.seller_id.0,
            interaction_id = %interaction.id.0,
            correlation_id = %ctx.correlation_id,
            intent = %draft.intent,
            reason,
            violations = report.violations.len(),
            "draft stored for operator review"
        );
        let event = self
            .audit_event(&interaction, ctx, ActionTaken::Drafted, reason)
            .with_intent(draft.intent, draft.confidence)
            .with_link(candidates.first())
            .with_report(&report)
            .with_texts(Some(final_text), None);
        self.record(event, ctx).await;

        InteractionOutcome::new(&interaction.id, ActionTaken::Drafted, reason)
    }

    /// A `sent` audit record exists but the interaction still looks pending: fix the state,
    /// never send again.
    async fn repair_already_sent(
        &self,
        mut interaction: Interaction,
        ctx: &PassContext<'_>,
    ) -> InteractionOutcome {
        let previous = match self.ports.audit.list_for_interaction(&interaction.id).await {
            Ok(events) => {
                events.into_iter().rev().find(|event| event.action_taken == ActionTaken::Sent)
            }
            Err(_) => None,
        };
        let (text, policy_version, replied_at) = match previous {
            Some(event) => (
                event.final_text.unwrap_or_default(),
                event.policy_version,
                event.occurred_at,
            ),
            None => (String::new(), self.settings.policy_version.clone(), Utc::now()),
        };

        interaction.record_auto_reply(&text, &policy_version, replied_at);
        let repaired = self.ports.interactions.save(interaction.clone()).await.is_ok();

        warn!(
            event_name = "auto_response.skipped.already_sent",
            seller_id = %ctx.seller_id.0,
            interaction_id = %interaction.id.0,
            correlation_id = %ctx.correlation_id,
            repaired,
            "interaction already has a sent record; not sending again"
        );
        InteractionOutcome::skipped(&interaction.id, "already_sent")
    }

    async fn generate(
        &self,
        interaction: &Interaction,
        thread_context: Option<&ThreadContext>,
    ) -> Result<Draft, (&'static str, String)> {
        let call = self.ports.generator.generate_draft(interaction, thread_context);
        match timeout(self.settings.generator_timeout, call).await {
            Ok(Ok(draft)) if draft.text.trim().is_empty() => {
                Err(("empty_draft", "draft generator returned empty text".to_string()))
            }
            Ok(Ok(draft)) => Ok(draft),
            Ok(Err(error @ DraftError::Timeout(_))) => Err(("generation_timeout", error.to_string())),
            Ok(Err(error)) => Err(("generation_failed", error.to_string())),
            Err(_) => Err((
                "generation_timeout",
                format!("no draft within {:?}", self.settings.generator_timeout),
            )),
        }
    }

    async fn dispatch(&self, request: &SendRequest) -> Result<(), (&'static str, String)> {
        match timeout(self.settings.connector_timeout, self.ports.connector.send(request)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error @ ConnectorError::Timeout(_))) => Err(("dispatch_timeout", error.to_string())),
            Ok(Err(error)) => Err(("dispatch_failed", error.to_string())),
            Err(_) => Err((
                "dispatch_timeout",
                format!("no connector response within {:?}", self.settings.connector_timeout),
            )),
        }
    }

    /// Stores the thread links and the scenario decision for the operator timeline.
    fn annotate(
        &self,
        interaction: &mut Interaction,
        action: RouteAction,
        reason: &str,
        candidates: &[LinkCandidate],
        ctx: &PassContext<'_>,
    ) {
        let resolver = self.guard.resolver();
        let timeline: Vec<TimelineEntry> = candidates
            .iter()
            .map(|candidate| {
                let policy = resolver.policy(candidate);
                TimelineEntry {
                    candidate: candidate.clone(),
                    auto_action_allowed: policy.auto_action_allowed,
                    policy_reason: policy.reason,
                }
            })
            .collect();

        interaction.metadata.insert(
            metadata_keys::THREAD_LINK_CANDIDATES.to_string(),
            serde_json::to_value(&timeline).unwrap_or_default(),
        );
        interaction.record_decision(action.as_str(), reason, ctx.decision_scope, Utc::now());
    }

    /// Persists a decision that needs no further automatic work under the current scope.
    async fn commit_decision(
        &self,
        mut interaction: Interaction,
        action: RouteAction,
        reason: &str,
        candidates: &[LinkCandidate],
        ctx: &PassContext<'_>,
    ) {
        self.annotate(&mut interaction, action, reason, candidates, ctx);
        let interaction_id = interaction.id.0.clone();
        if let Err(error) = self.ports.interactions.save(interaction).await {
            warn!(
                event_name = "auto_response.decision_not_saved",
                seller_id = %ctx.seller_id.0,
                interaction_id = %interaction_id,
                correlation_id = %ctx.correlation_id,
                action = action.as_str(),
                error = %error,
                "decision not stored; the interaction will be evaluated again next pass"
            );
        }
    }

    fn audit_event(
        &self,
        interaction: &Interaction,
        ctx: &PassContext<'_>,
        action: ActionTaken,
        reason: &str,
    ) -> AuditEvent {
        AuditEvent::new(interaction, ctx.correlation_id, &self.settings.policy_version, action, reason)
    }

    async fn record(&self, event: AuditEvent, ctx: &PassContext<'_>) {
        let interaction_id = event.interaction_id.0.clone();
        let action = event.action_taken;
        if let Err(error) = self.ports.audit.append(event).await {
            error!(
                event_name = "auto_response.audit_failed",
                seller_id = %ctx.seller_id.0,
                interaction_id = %interaction_id,
                correlation_id = %ctx.correlation_id,
                action = action.as_str(),
                error = %error,
                "audit event could not be written"
            );
        }
    }
}

/// Value kept under `metadata_keys::SCENARIO_DECISION`.
pub fn scenario_decision(interaction: &Interaction) -> Option<&Value> {
    interaction.metadata.get(metadata_keys::SCENARIO_DECISION)
}
