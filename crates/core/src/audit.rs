use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::interaction::{Interaction, InteractionId, SellerId};
use crate::domain::scenario::Intent;
use crate::guardrails::{GuardrailViolation, ValidationReport};
use crate::linking::{LinkCandidate, LinkType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    Sent,
    Drafted,
    Blocked,
    Skipped,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Drafted => "drafted",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(Self::Sent),
            "drafted" => Some(Self::Drafted),
            "blocked" => Some(Self::Blocked),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Append-only record of one terminal auto-response decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub interaction_id: InteractionId,
    pub seller_id: SellerId,
    pub correlation_id: String,
    pub occurred_at: DateTime<Utc>,
    pub policy_version: String,
    pub intent: Option<Intent>,
    pub intent_confidence: Option<f64>,
    pub link_type: Option<LinkType>,
    pub confidence: Option<f64>,
    pub action_taken: ActionTaken,
    pub policy_reason: String,
    pub violations: Vec<GuardrailViolation>,
    pub warnings: Vec<GuardrailViolation>,
    pub draft_text: Option<String>,
    pub final_text: Option<String>,
    pub decision_key: String,
}

impl AuditEvent {
    pub fn new(
        interaction: &Interaction,
        correlation_id: impl Into<String>,
        policy_version: impl Into<String>,
        action_taken: ActionTaken,
        policy_reason: impl Into<String>,
    ) -> Self {
        let policy_version = policy_version.into();
        Self {
            event_id: Uuid::new_v4().to_string(),
            interaction_id: interaction.id.clone(),
            seller_id: interaction.seller_id.clone(),
            correlation_id: correlation_id.into(),
            occurred_at: Utc::now(),
            decision_key: decision_key(&interaction.id, &policy_version, ""),
            policy_version,
            intent: None,
            intent_confidence: None,
            link_type: None,
            confidence: None,
            action_taken,
            policy_reason: policy_reason.into(),
            violations: Vec::new(),
            warnings: Vec::new(),
            draft_text: None,
            final_text: None,
        }
    }

    pub fn with_intent(mut self, intent: Intent, confidence: f64) -> Self {
        self.intent = Some(intent);
        self.intent_confidence = Some(confidence);
        self
    }

    pub fn with_link(mut self, candidate: Option<&LinkCandidate>) -> Self {
        if let Some(candidate) = candidate {
            self.link_type = Some(candidate.link_type);
            self.confidence = Some(candidate.confidence);
        }
        self
    }

    pub fn with_report(mut self, report: &ValidationReport) -> Self {
        self.violations = report.violations.clone();
        self.warnings = report.warnings.clone();
        self
    }

    /// Sets the texts and re-keys the decision on the text that was (or would be) sent.
    pub fn with_texts(mut self, draft_text: Option<String>, final_text: Option<String>) -> Self {
        let keyed = final_text.as_deref().or(draft_text.as_deref()).unwrap_or_default();
        self.decision_key = decision_key(&self.interaction_id, &self.policy_version, keyed);
        self.draft_text = draft_text;
        self.final_text = final_text;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// Hex SHA-256 over the interaction id, policy version and reply text.
pub fn decision_key(interaction_id: &InteractionId, policy_version: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(interaction_id.0.as_bytes());
    hasher.update([0x1f]);
    hasher.update(policy_version.as_bytes());
    hasher.update([0x1f]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
