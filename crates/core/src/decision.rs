//! Reply gates shared by the orchestrator, the preview entry point and manual replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::interaction::{Channel, Interaction};
use crate::domain::promo::{PromoCode, PromoId};
use crate::domain::scenario::SellerSettings;
use crate::errors::ApplicationError;
use crate::guardrails::{GuardrailValidator, GuardrailViolation, PhraseSanitizer, ValidationReport};
use crate::linking::LinkResolver;
use crate::router::ScenarioRouter;

/// Minimum review rating for an automatic reply. Not seller-configurable.
pub const MIN_AUTO_REVIEW_RATING: u8 = 4;

/// Rating that qualifies a review for promo enrichment.
pub const PROMO_REVIEW_RATING: u8 = 5;

/// Hard rating gate. Returns the block reason when the interaction may not be auto-answered.
pub fn rating_gate(channel: Channel, rating: Option<u8>) -> Option<&'static str> {
    match (channel, rating) {
        (Channel::Review, Some(rating)) if rating >= MIN_AUTO_REVIEW_RATING => None,
        (Channel::Review, _) => Some("rating_below_threshold"),
        _ => None,
    }
}

/// Text after optional promo injection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enrichment {
    pub text: String,
    pub promo_id: Option<PromoId>,
}

/// Picks the least-used eligible promo; ties go to the lowest id.
pub fn select_promo<'a>(
    promos: &'a [PromoCode],
    channel: Channel,
    rating: Option<u8>,
    now: DateTime<Utc>,
) -> Option<&'a PromoCode> {
    promos
        .iter()
        .filter(|promo| promo.is_eligible(channel, rating, now))
        .min_by(|left, right| {
            left.usage_count.cmp(&right.usage_count).then_with(|| left.id.0.cmp(&right.id.0))
        })
}

/// Appends a promo snippet to five-star review replies when the seller opted in.
///
/// Finding no promo is not an error; the draft is returned unchanged.
pub fn enrich_with_promo(
    draft: &str,
    interaction: &Interaction,
    promo_opt_in: bool,
    promos: &[PromoCode],
    now: DateTime<Utc>,
) -> Enrichment {
    let qualifies = promo_opt_in
        && interaction.channel == Channel::Review
        && interaction.rating == Some(PROMO_REVIEW_RATING);
    if !qualifies {
        return Enrichment { text: draft.to_string(), promo_id: None };
    }

    match select_promo(promos, interaction.channel, interaction.rating, now) {
        Some(promo) => {
            let snippet = promo.render_snippet();
            if snippet.trim().is_empty() {
                return Enrichment { text: draft.to_string(), promo_id: None };
            }
            Enrichment {
                text: format!("{}\n\n{}", draft.trim_end(), snippet.trim()),
                promo_id: Some(promo.id.clone()),
            }
        }
        None => Enrichment { text: draft.to_string(), promo_id: None },
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckedText {
    pub final_text: String,
    pub report: ValidationReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManualReplyCheck {
    pub allowed: bool,
    pub violations: Vec<GuardrailViolation>,
    pub warnings: Vec<GuardrailViolation>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub interaction: Interaction,
    pub draft_text: String,
    #[serde(default)]
    pub promo_opt_in: bool,
    #[serde(default)]
    pub promos: Vec<PromoCode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PreviewOutcome {
    pub auto_action_allowed: bool,
    pub reason: String,
    pub final_text: Option<String>,
    pub promo_id: Option<PromoId>,
    pub violations: Vec<GuardrailViolation>,
    pub warnings: Vec<GuardrailViolation>,
}

/// The compiled rule set: sanitizer, validator, link resolver and scenario router.
#[derive(Clone, Debug)]
pub struct ReplyGuard {
    sanitizer: PhraseSanitizer,
    validator: GuardrailValidator,
    resolver: LinkResolver,
    router: ScenarioRouter,
}

impl ReplyGuard {
    pub fn new() -> Result<Self, ApplicationError> {
        Ok(Self {
            sanitizer: PhraseSanitizer::new()?,
            validator: GuardrailValidator::new()?,
            resolver: LinkResolver::new(),
            router: ScenarioRouter,
        })
    }

    pub fn with_resolver(mut self, resolver: LinkResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn validator(&self) -> &GuardrailValidator {
        &self.validator
    }

    pub fn sanitizer(&self) -> &PhraseSanitizer {
        &self.sanitizer
    }

    pub fn resolver(&self) -> &LinkResolver {
        &self.resolver
    }

    pub fn router(&self) -> &ScenarioRouter {
        &self.router
    }

    /// Sanitizes then validates against the customer's original text.
    pub fn check_text(&self, text: &str, interaction: &Interaction) -> CheckedText {
        let final_text = self.sanitizer.sanitize(text);
        let report = self.validator.validate(&final_text, interaction.channel, &interaction.text);
        CheckedText { final_text, report }
    }

    /// Validates an operator-written reply as is. Error-severity hits block manual sends too.
    pub fn check_manual_reply(&self, interaction: &Interaction, text: &str) -> ManualReplyCheck {
        let report = self.validator.validate(text, interaction.channel, &interaction.text);
        ManualReplyCheck {
            allowed: !report.is_blocking(),
            violations: report.violations,
            warnings: report.warnings,
        }
    }

    /// Runs the rating gate, promo enrichment and guardrails without dispatch or persistence.
    pub fn preview(&self, request: &PreviewRequest, now: DateTime<Utc>) -> PreviewOutcome {
        let interaction = &request.interaction;

        if let Some(reason) = rating_gate(interaction.channel, interaction.rating) {
            return PreviewOutcome {
                auto_action_allowed: false,
                reason: reason.to_string(),
                final_text: None,
                promo_id: None,
                violations: Vec::new(),
                warnings: Vec::new(),
            };
        }

        if request.draft_text.trim().is_empty() {
            return PreviewOutcome {
                auto_action_allowed: false,
                reason: "empty_draft".to_string(),
                final_text: None,
                promo_id: None,
                violations: Vec::new(),
                warnings: Vec::new(),
            };
        }

        let enrichment = enrich_with_promo(
            &request.draft_text,
            interaction,
            request.promo_opt_in,
            &request.promos,
            now,
        );
        let checked = self.check_text(&enrichment.text, interaction);
        let blocked = checked.report.is_blocking();

        PreviewOutcome {
            auto_action_allowed: !blocked,
            reason: if blocked { "guardrail_violation" } else { "all_gates_passed" }.to_string(),
            final_text: Some(checked.final_text),
            promo_id: enrichment.promo_id,
            violations: checked.report.violations,
            warnings: checked.report.warnings,
        }
    }

    /// Preview using a seller's stored settings for the promo opt-in.
    pub fn preview_for_seller(
        &self,
        interaction: Interaction,
        draft_text: String,
        settings: &SellerSettings,
        promos: Vec<PromoCode>,
        now: DateTime<Utc>,
    ) -> PreviewOutcome {
        let request =
            PreviewRequest { interaction, draft_text, promo_opt_in: settings.promo_opt_in, promos };
        self.preview(&request, now)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{Duration, Utc};

    use super::{enrich_with_promo, rating_gate, PreviewRequest, ReplyGuard};
    use crate::domain::interaction::{
        Channel, Interaction, InteractionId, InteractionStatus, SellerId,
    };
    use crate::domain::promo::{PromoCode, PromoId};
    use crate::guardrails::GuardrailCategory;

    fn guard() -> ReplyGuard {
        ReplyGuard::new().expect("rule tables compile")
    }

    fn review(text: &str, rating: Option<u8>) -> Interaction {
        let now = Utc::now();
        Interaction {
            id: InteractionId("int-1".to_string()),
            seller_id: SellerId("seller-1".to_string()),
            channel: Channel::Review,
            external_id: "fb-1".to_string(),
            customer_id: None,
            customer_name: None,
            order_id: None,
            product_id: None,
            article: None,
            rating,
            text: text.to_string(),
            status: InteractionStatus::Open,
            needs_response: true,
            is_auto_response: false,
            priority: 0,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn promo(id: &str, usage_count: u32) -> PromoCode {
        PromoCode {
            id: PromoId(id.to_string()),
            seller_id: SellerId("seller-1".to_string()),
            code: format!("CODE-{id}"),
            message_template: "Ваш промокод на следующую покупку: {code}".to_string(),
            channels: BTreeSet::from([Channel::Review]),
            min_rating: 5,
            active: true,
            usage_count,
            expires_at: None,
        }
    }

    #[test]
    fn rating_gate_blocks_low_or_missing_review_ratings_only() {
        for rating in [None, Some(1), Some(2), Some(3)] {
            assert_eq!(rating_gate(Channel::Review, rating), Some("rating_below_threshold"));
        }
        assert_eq!(rating_gate(Channel::Review, Some(4)), None);
        assert_eq!(rating_gate(Channel::Review, Some(5)), None);
        assert_eq!(rating_gate(Channel::Question, None), None);
        assert_eq!(rating_gate(Channel::Chat, None), None);
    }

    #[test]
    fn five_star_thanks_preview_passes_every_gate() {
        let request = PreviewRequest {
            interaction: review("Отличный товар!", Some(5)),
            draft_text: "Спасибо за высокую оценку! Рады, что товар вам понравился.".to_string(),
            promo_opt_in: false,
            promos: Vec::new(),
        };

        let outcome = guard().preview(&request, Utc::now());

        assert!(outcome.auto_action_allowed);
        assert_eq!(outcome.reason, "all_gates_passed");
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn three_star_preview_is_blocked_by_rating_gate() {
        let request = PreviewRequest {
            interaction: review("Отличный товар!", Some(3)),
            draft_text: "Спасибо за высокую оценку! Рады, что товар вам понравился.".to_string(),
            promo_opt_in: true,
            promos: vec![promo("p1", 0)],
        };

        let outcome = guard().preview(&request, Utc::now());

        assert!(!outcome.auto_action_allowed);
        assert_eq!(outcome.reason, "rating_below_threshold");
        assert!(outcome.final_text.is_none());
    }

    #[test]
    fn promo_is_appended_and_the_final_text_is_validated() {
        let mut unsafe_promo = promo("p1", 0);
        unsafe_promo.message_template = "Гарантируем возврат денег с кодом {code}".to_string();
        let request = PreviewRequest {
            interaction: review("Отличный товар!", Some(5)),
            draft_text: "Спасибо за высокую оценку! Рады, что товар вам понравился.".to_string(),
            promo_opt_in: true,
            promos: vec![unsafe_promo],
        };

        let outcome = guard().preview(&request, Utc::now());

        let final_text = outcome.final_text.expect("final text");
        assert!(final_text.contains("CODE-p1"));
        assert!(outcome.promo_id.is_some());
        // The sanitizer rewrites the promise, so the final text is clean.
        assert!(!final_text.to_lowercase().contains("гарантируем возврат"));
        assert!(outcome.auto_action_allowed);
    }

    #[test]
    fn promo_enrichment_prefers_least_used_and_skips_non_five_star() {
        let now = Utc::now();
        let promos = vec![promo("p2", 5), promo("p1", 1)];
        let draft = "Спасибо за отзыв!";

        let five = enrich_with_promo(draft, &review("Супер", Some(5)), true, &promos, now);
        assert_eq!(five.promo_id, Some(PromoId("p1".to_string())));
        assert!(five.text.starts_with("Спасибо за отзыв!\n\n"));

        let four = enrich_with_promo(draft, &review("Хорошо", Some(4)), true, &promos, now);
        assert_eq!(four.text, draft);
        assert!(four.promo_id.is_none());

        let opted_out = enrich_with_promo(draft, &review("Супер", Some(5)), false, &promos, now);
        assert!(opted_out.promo_id.is_none());

        let mut expired = promo("p3", 0);
        expired.expires_at = Some(now - Duration::days(1));
        let none_left = enrich_with_promo(draft, &review("Супер", Some(5)), true, &[expired], now);
        assert_eq!(none_left.text, draft);
    }

    #[test]
    fn manual_replies_are_blocked_by_error_violations() {
        let guard = guard();
        let interaction = review("Пришло не то", Some(2));

        let blocked = guard.check_manual_reply(&interaction, "Мы гарантируем возврат денег");
        assert!(!blocked.allowed);
        assert_eq!(blocked.violations[0].category, GuardrailCategory::Promise);

        let allowed = guard.check_manual_reply(
            &interaction,
            "Нам жаль, что так вышло. Напишите нам в чат, разберемся в ситуации.",
        );
        assert!(allowed.allowed, "{:?}", allowed.violations);
    }
}
