//! Draft Generator seam.
//!
//! The generator writes the candidate reply and classifies the interaction into the fixed
//! intent taxonomy. It never decides whether the reply is sent; every gate after it is
//! deterministic.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replyguard_core::config::DraftGeneratorConfig;
use replyguard_core::domain::interaction::{Channel, Interaction};
use replyguard_core::domain::scenario::Intent;
use replyguard_core::linking::{LinkCandidate, LinkResolver};

#[derive(Clone, Debug, PartialEq)]
pub struct Draft {
    pub text: String,
    pub intent: Intent,
    pub confidence: f64,
}

/// Related interactions handed to the generator.
///
/// Only `authoritative` links passed the link policy; `assist_only` links are context the
/// generator may use for tone but must not treat as established facts.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ThreadContext {
    pub authoritative: Vec<LinkCandidate>,
    pub assist_only: Vec<LinkCandidate>,
}

impl ThreadContext {
    pub fn from_candidates(resolver: &LinkResolver, candidates: &[LinkCandidate]) -> Self {
        let (authoritative, assist_only) = candidates
            .iter()
            .cloned()
            .partition(|candidate| resolver.policy(candidate).auto_action_allowed);
        Self { authoritative, assist_only }
    }

    pub fn is_empty(&self) -> bool {
        self.authoritative.is_empty() && self.assist_only.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("draft generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("draft generator transport error: {0}")]
    Transport(String),
    #[error("draft generator returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("draft generator response is invalid: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate_draft(
        &self,
        interaction: &Interaction,
        thread_context: Option<&ThreadContext>,
    ) -> Result<Draft, DraftError>;
}

#[derive(Debug, Serialize)]
struct DraftRequestBody<'a> {
    interaction_id: &'a str,
    channel: Channel,
    external_id: &'a str,
    text: &'a str,
    rating: Option<u8>,
    customer_name: Option<&'a str>,
    product_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_context: Option<&'a ThreadContext>,
}

impl<'a> DraftRequestBody<'a> {
    fn new(interaction: &'a Interaction, thread_context: Option<&'a ThreadContext>) -> Self {
        Self {
            interaction_id: &interaction.id.0,
            channel: interaction.channel,
            external_id: &interaction.external_id,
            text: &interaction.text,
            rating: interaction.rating,
            customer_name: interaction.customer_name.as_deref(),
            product_id: interaction.product_id.as_deref(),
            thread_context,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DraftResponseBody {
    text: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl DraftResponseBody {
    fn into_draft(self) -> Result<Draft, DraftError> {
        let confidence = self.confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DraftError::InvalidResponse(format!(
                "intent confidence {confidence} is outside [0, 1]"
            )));
        }

        Ok(Draft {
            text: self.text,
            intent: self.intent.as_deref().map_or(Intent::Unclassified, Intent::parse),
            confidence,
        })
    }
}

/// JSON-over-HTTP draft generator: `POST {base_url}/v1/drafts`.
pub struct HttpDraftGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpDraftGenerator {
    pub fn from_config(config: &DraftGeneratorConfig) -> Result<Self, DraftError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| DraftError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/drafts", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DraftGenerator for HttpDraftGenerator {
    async fn generate_draft(
        &self,
        interaction: &Interaction,
        thread_context: Option<&ThreadContext>,
    ) -> Result<Draft, DraftError> {
        let body = DraftRequestBody::new(interaction, thread_context);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                DraftError::Timeout(self.timeout)
            } else {
                DraftError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DraftError::Upstream { status: status.as_u16(), message });
        }

        let body: DraftResponseBody = response.json().await.map_err(|error| {
            if error.is_timeout() {
                DraftError::Timeout(self.timeout)
            } else {
                DraftError::InvalidResponse(error.to_string())
            }
        })?;
        body.into_draft()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use secrecy::SecretString;

    use replyguard_core::config::DraftGeneratorConfig;
    use replyguard_core::domain::interaction::{
        Channel, Interaction, InteractionId, InteractionStatus, SellerId,
    };
    use replyguard_core::domain::scenario::Intent;
    use replyguard_core::linking::{LinkCandidate, LinkResolver, LinkType, MatchReason};

    use super::{DraftError, DraftRequestBody, DraftResponseBody, HttpDraftGenerator, ThreadContext};

    fn candidate(external_id: &str, link_type: LinkType, confidence: f64) -> LinkCandidate {
        LinkCandidate {
            interaction_id: InteractionId(format!("int-{external_id}")),
            channel: Channel::Chat,
            external_id: external_id.to_string(),
            confidence,
            match_reason: match link_type {
                LinkType::Deterministic => MatchReason::OrderIdExact,
                LinkType::Probabilistic => MatchReason::Probabilistic,
            },
            link_type,
        }
    }

    #[test]
    fn thread_context_splits_on_link_policy() {
        let resolver = LinkResolver::new();
        let context = ThreadContext::from_candidates(
            &resolver,
            &[
                candidate("a", LinkType::Deterministic, 0.99),
                candidate("b", LinkType::Probabilistic, 0.80),
            ],
        );

        assert_eq!(context.authoritative.len(), 1);
        assert_eq!(context.authoritative[0].external_id, "a");
        assert_eq!(context.assist_only.len(), 1);
        assert_eq!(context.assist_only[0].external_id, "b");
    }

    #[test]
    fn request_body_carries_customer_text_and_context() {
        let now = Utc::now();
        let interaction = Interaction {
            id: InteractionId("int-1".to_string()),
            seller_id: SellerId("seller-1".to_string()),
            channel: Channel::Question,
            external_id: "q-1".to_string(),
            customer_id: None,
            customer_name: Some("Олег".to_string()),
            order_id: None,
            product_id: Some("nm-1".to_string()),
            article: None,
            rating: None,
            text: "Какой состав ткани?".to_string(),
            status: InteractionStatus::Open,
            needs_response: true,
            is_auto_response: false,
            priority: 0,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };

        let body = serde_json::to_value(DraftRequestBody::new(&interaction, None))
            .expect("serialize request");
        assert_eq!(body["channel"], "question");
        assert_eq!(body["text"], "Какой состав ткани?");
        assert!(body.get("thread_context").is_none());
    }

    #[test]
    fn response_intent_falls_back_to_unclassified() {
        let body: DraftResponseBody =
            serde_json::from_str(r#"{"text":"Спасибо!","intent":"gratitude","confidence":0.7}"#)
                .expect("parse response");
        let draft = body.into_draft().expect("valid draft");
        assert_eq!(draft.intent, Intent::Unclassified);

        let body: DraftResponseBody =
            serde_json::from_str(r#"{"text":"Спасибо!","intent":"thanks"}"#).expect("parse");
        assert_eq!(body.into_draft().expect("valid draft").intent, Intent::Thanks);
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let body: DraftResponseBody =
            serde_json::from_str(r#"{"text":"ok","intent":"thanks","confidence":1.5}"#)
                .expect("parse response");
        assert!(matches!(body.into_draft(), Err(DraftError::InvalidResponse(_))));
    }

    #[test]
    fn endpoint_is_built_from_base_url() {
        let generator = HttpDraftGenerator::from_config(&DraftGeneratorConfig {
            base_url: "http://localhost:8700/".to_string(),
            api_key: Some(SecretString::from("token".to_string())),
            timeout_secs: 5,
        })
        .expect("build generator");
        assert_eq!(generator.endpoint(), "http://localhost:8700/v1/drafts");
    }
}
