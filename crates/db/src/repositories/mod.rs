use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use thiserror::Error;

use replyguard_core::audit::AuditEvent;
use replyguard_core::domain::interaction::{Channel, Interaction, InteractionId, SellerId};
use replyguard_core::domain::lease::SellerLease;
use replyguard_core::domain::promo::{PromoCode, PromoId};
use replyguard_core::domain::scenario::{SellerSettings, SellerSettingsDocument};

pub mod audit;
pub mod interaction;
pub mod lease;
pub mod memory;
pub mod promo;
pub mod seller_settings;

pub use audit::SqlAuditRepository;
pub use interaction::SqlInteractionRepository;
pub use lease::SqlLeaseRepository;
pub use memory::{
    InMemoryAuditRepository, InMemoryInteractionRepository, InMemoryLeaseRepository,
    InMemoryPromoRepository, InMemorySellerSettingsRepository,
};
pub use promo::SqlPromoRepository;
pub use seller_settings::SqlSellerSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait InteractionRepository: Send + Sync {
    async fn find_by_id(&self, id: &InteractionId) -> Result<Option<Interaction>, RepositoryError>;

    async fn save(&self, interaction: Interaction) -> Result<(), RepositoryError>;

    /// Open interactions that still need a reply in `channels`, oldest first.
    ///
    /// Interactions whose recorded decision carries `decided_scope` are excluded.
    async fn list_awaiting_response(
        &self,
        seller_id: &SellerId,
        channels: &[Channel],
        decided_scope: &str,
        limit: u32,
    ) -> Result<Vec<Interaction>, RepositoryError>;

    /// Every interaction of the seller created at or after `since`, for thread linking.
    async fn list_since(
        &self,
        seller_id: &SellerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, RepositoryError>;
}

/// Append-only decision log: insert and read, never update or delete.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;

    async fn list_for_interaction(
        &self,
        interaction_id: &InteractionId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;

    async fn has_sent(&self, interaction_id: &InteractionId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SellerSettingsRepository: Send + Sync {
    /// Loads and normalizes the stored document; legacy allow-lists are migrated here.
    async fn load(&self, seller_id: &SellerId) -> Result<Option<SellerSettings>, RepositoryError>;

    async fn save(
        &self,
        seller_id: &SellerId,
        document: &SellerSettingsDocument,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PromoRepository: Send + Sync {
    async fn list_active(&self, seller_id: &SellerId) -> Result<Vec<PromoCode>, RepositoryError>;

    async fn save(&self, promo: PromoCode) -> Result<(), RepositoryError>;

    /// Non-transactional usage bump after a send that carried the promo.
    async fn increment_usage(&self, id: &PromoId) -> Result<(), RepositoryError>;
}

/// Cross-process mutual exclusion for seller passes.
#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Takes the lease if it is free, expired, or already held by `holder_id`.
    async fn try_acquire(
        &self,
        seller_id: &SellerId,
        holder_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<SellerLease>, RepositoryError>;

    /// Releases the lease only if `holder_id` still holds it.
    async fn release(&self, seller_id: &SellerId, holder_id: &str) -> Result<bool, RepositoryError>;
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn encode_json<T: serde::Serialize>(
    column: &str,
    value: &T,
) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Encode(format!("could not encode `{column}`: {error}")))
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}
