use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InteractionId(pub String);

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SellerId(pub String);

impl fmt::Display for SellerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Review,
    Question,
    Chat,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Review, Channel::Question, Channel::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Question => "question",
            Self::Chat => "chat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "review" => Some(Self::Review),
            "question" => Some(Self::Question),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }

    /// Public channels are visible to every shopper on the product card.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Review | Self::Question)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Open,
    Responded,
    Closed,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Responded => "responded",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "responded" => Some(Self::Responded),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Metadata keys written by the auto-response pipeline.
pub mod metadata_keys {
    pub const LAST_REPLY_TEXT: &str = "last_reply_text";
    pub const LAST_REPLY_SOURCE: &str = "last_reply_source";
    pub const LAST_REPLY_AT: &str = "last_reply_at";
    pub const POLICY_VERSION: &str = "policy_version";
    pub const THREAD_LINK_CANDIDATES: &str = "thread_link_candidates";
    pub const SCENARIO_DECISION: &str = "scenario_decision";
    pub const DRAFT_TEXT: &str = "draft_text";
    pub const DRAFT_INTENT: &str = "draft_intent";
    pub const DRAFT_VIOLATIONS: &str = "draft_violations";

    pub const AUTO_RESPONSE_SOURCE: &str = "auto_response";
}

/// A customer-initiated communication awaiting a seller reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub seller_id: SellerId,
    pub channel: Channel,
    pub external_id: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub order_id: Option<String>,
    /// Marketplace catalogue id (nm_id).
    pub product_id: Option<String>,
    /// Seller-side article.
    pub article: Option<String>,
    pub rating: Option<u8>,
    pub text: String,
    pub status: InteractionStatus,
    pub needs_response: bool,
    pub is_auto_response: bool,
    pub priority: i32,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interaction {
    pub fn validate(&self) -> Result<(), DomainError> {
        match (self.channel, self.rating) {
            (Channel::Review, Some(rating)) if !(1..=5).contains(&rating) => {
                return Err(DomainError::InvariantViolation(format!(
                    "review rating must be within 1..=5, got {rating}"
                )));
            }
            (Channel::Question | Channel::Chat, Some(_)) => {
                return Err(DomainError::InvariantViolation(format!(
                    "rating is only meaningful for reviews, found on {}",
                    self.channel
                )));
            }
            _ => {}
        }

        if self.is_auto_response && self.status != InteractionStatus::Responded {
            return Err(DomainError::InvariantViolation(
                "auto-responded interaction must have status `responded`".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.needs_response && self.status == InteractionStatus::Open
    }

    /// Marks the interaction as answered by the auto-response pipeline.
    pub fn record_auto_reply(
        &mut self,
        reply_text: &str,
        policy_version: &str,
        replied_at: DateTime<Utc>,
    ) {
        use metadata_keys::*;

        self.status = InteractionStatus::Responded;
        self.needs_response = false;
        self.is_auto_response = true;
        self.updated_at = replied_at;
        self.metadata.insert(LAST_REPLY_TEXT.to_string(), reply_text.into());
        self.metadata.insert(LAST_REPLY_SOURCE.to_string(), AUTO_RESPONSE_SOURCE.into());
        self.metadata.insert(LAST_REPLY_AT.to_string(), replied_at.to_rfc3339().into());
        self.metadata.insert(POLICY_VERSION.to_string(), policy_version.into());
    }

    /// Stores the pipeline's terminal decision for this interaction.
    ///
    /// `scope` identifies the policy version and seller settings the decision was made under;
    /// an interaction decided under the current scope is not picked up again.
    pub fn record_decision(
        &mut self,
        action: &str,
        reason: &str,
        scope: &str,
        decided_at: DateTime<Utc>,
    ) {
        self.updated_at = decided_at;
        self.metadata.insert(
            metadata_keys::SCENARIO_DECISION.to_string(),
            serde_json::json!({
                "action": action,
                "reason": reason,
                "scope": scope,
                "decided_at": decided_at.to_rfc3339(),
            }),
        );
    }

    pub fn decision_scope(&self) -> Option<&str> {
        self.metadata.get(metadata_keys::SCENARIO_DECISION)?.get("scope")?.as_str()
    }

    /// Awaiting a reply and not yet decided under `scope`.
    pub fn is_eligible_under(&self, scope: &str) -> bool {
        self.is_awaiting_response() && self.decision_scope() != Some(scope)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::{metadata_keys, Channel, Interaction, InteractionId, InteractionStatus, SellerId};

    fn review(rating: Option<u8>) -> Interaction {
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
            text: "Отличный товар!".to_string(),
            status: InteractionStatus::Open,
            needs_response: true,
            is_auto_response: false,
            priority: 0,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rating_outside_review_channel_is_rejected() {
        let mut interaction = review(Some(5));
        interaction.channel = Channel::Chat;
        assert!(interaction.validate().is_err());
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        assert!(review(Some(0)).validate().is_err());
        assert!(review(Some(6)).validate().is_err());
        assert!(review(Some(4)).validate().is_ok());
        assert!(review(None).validate().is_ok());
    }

    #[test]
    fn auto_reply_flag_requires_responded_status() {
        let mut interaction = review(Some(5));
        interaction.is_auto_response = true;
        assert!(interaction.validate().is_err());
    }

    #[test]
    fn record_auto_reply_keeps_invariants_and_policy_version() {
        let mut interaction = review(Some(5));
        interaction.record_auto_reply("Спасибо за отзыв!", "guardrails-v1", Utc::now());

        assert!(interaction.validate().is_ok());
        assert_eq!(interaction.status, InteractionStatus::Responded);
        assert!(!interaction.needs_response);
        assert_eq!(
            interaction.metadata.get(metadata_keys::POLICY_VERSION),
            Some(&serde_json::Value::from("guardrails-v1"))
        );
    }

    #[test]
    fn recorded_decision_is_scoped() {
        let mut interaction = review(Some(2));
        assert!(interaction.is_eligible_under("guardrails-v1:aaaa"));

        interaction.record_decision("block", "rating_below_threshold", "guardrails-v1:aaaa", Utc::now());

        assert_eq!(interaction.decision_scope(), Some("guardrails-v1:aaaa"));
        assert!(interaction.is_awaiting_response());
        assert!(!interaction.is_eligible_under("guardrails-v1:aaaa"));
        assert!(interaction.is_eligible_under("guardrails-v2:aaaa"));
    }

    #[test]
    fn channel_storage_encoding_is_stable() {
        for channel in Channel::ALL {
            assert_eq!(Channel::parse(channel.as_str()), Some(channel));
        }
    }
}
