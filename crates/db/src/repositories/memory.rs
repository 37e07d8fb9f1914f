use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use replyguard_core::audit::{ActionTaken, AuditEvent};
use replyguard_core::domain::interaction::{Channel, Interaction, InteractionId, SellerId};
use replyguard_core::domain::lease::SellerLease;
use replyguard_core::domain::promo::{PromoCode, PromoId};
use replyguard_core::domain::scenario::{SellerSettings, SellerSettingsDocument};

use super::{
    AuditRepository, InteractionRepository, LeaseRepository, PromoRepository, RepositoryError,
    SellerSettingsRepository,
};

#[derive(Default)]
pub struct InMemoryInteractionRepository {
    interactions: RwLock<HashMap<String, Interaction>>,
}

#[async_trait::async_trait]
impl InteractionRepository for InMemoryInteractionRepository {
    async fn find_by_id(&self, id: &InteractionId) -> Result<Option<Interaction>, RepositoryError> {
        let interactions = self.interactions.read().await;
        Ok(interactions.get(&id.0).cloned())
    }

    async fn save(&self, interaction: Interaction) -> Result<(), RepositoryError> {
        let mut interactions = self.interactions.write().await;
        interactions.insert(interaction.id.0.clone(), interaction);
        Ok(())
    }

    async fn list_awaiting_response(
        &self,
        seller_id: &SellerId,
        channels: &[Channel],
        decided_scope: &str,
        limit: u32,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let interactions = self.interactions.read().await;
        let mut pending = interactions
            .values()
            .filter(|item| {
                item.seller_id == *seller_id
                    && item.is_eligible_under(decided_scope)
                    && channels.contains(&item.channel)
            })
            .cloned()
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn list_since(
        &self,
        seller_id: &SellerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let interactions = self.interactions.read().await;
        let mut history = interactions
            .values()
            .filter(|item| item.seller_id == *seller_id && item.created_at >= since)
            .cloned()
            .collect::<Vec<_>>();
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(history)
    }
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditRepository {
    /// Every appended event in insertion order.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        if events.iter().any(|existing| existing.event_id == event.event_id) {
            return Err(RepositoryError::Conflict(format!(
                "audit event `{}` already recorded",
                event.event_id
            )));
        }
        events.push(event);
        Ok(())
    }

    async fn list_for_interaction(
        &self,
        interaction_id: &InteractionId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|event| event.interaction_id == *interaction_id).cloned().collect())
    }

    async fn has_sent(&self, interaction_id: &InteractionId) -> Result<bool, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().any(|event| {
            event.interaction_id == *interaction_id && event.action_taken == ActionTaken::Sent
        }))
    }
}

#[derive(Default)]
pub struct InMemorySellerSettingsRepository {
    documents: RwLock<HashMap<String, SellerSettingsDocument>>,
}

#[async_trait::async_trait]
impl SellerSettingsRepository for InMemorySellerSettingsRepository {
    async fn load(&self, seller_id: &SellerId) -> Result<Option<SellerSettings>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&seller_id.0)
            .cloned()
            .map(|document| document.into_settings(seller_id.clone())))
    }

    async fn save(
        &self,
        seller_id: &SellerId,
        document: &SellerSettingsDocument,
    ) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        documents.insert(seller_id.0.clone(), document.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPromoRepository {
    promos: RwLock<HashMap<String, PromoCode>>,
}

#[async_trait::async_trait]
impl PromoRepository for InMemoryPromoRepository {
    async fn list_active(&self, seller_id: &SellerId) -> Result<Vec<PromoCode>, RepositoryError> {
        let promos = self.promos.read().await;
        let mut active = promos
            .values()
            .filter(|promo| promo.seller_id == *seller_id && promo.active)
            .cloned()
            .collect::<Vec<_>>();
        active.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(active)
    }

    async fn save(&self, promo: PromoCode) -> Result<(), RepositoryError> {
        let mut promos = self.promos.write().await;
        promos.insert(promo.id.0.clone(), promo);
        Ok(())
    }

    async fn increment_usage(&self, id: &PromoId) -> Result<(), RepositoryError> {
        let mut promos = self.promos.write().await;
        if let Some(promo) = promos.get_mut(&id.0) {
            promo.usage_count = promo.usage_count.saturating_add(1);
        }
        Ok(())
    }
}

/// Process-local lease table. Only suitable when every worker shares this instance.
#[derive(Default)]
pub struct InMemoryLeaseRepository {
    leases: RwLock<HashMap<String, SellerLease>>,
}

#[async_trait::async_trait]
impl LeaseRepository for InMemoryLeaseRepository {
    async fn try_acquire(
        &self,
        seller_id: &SellerId,
        holder_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<SellerLease>, RepositoryError> {
        let mut leases = self.leases.write().await;
        if let Some(current) = leases.get(&seller_id.0) {
            if !current.can_be_taken_by(holder_id, now) {
                return Ok(None);
            }
        }

        let lease = SellerLease::new(seller_id.clone(), holder_id, now, ttl);
        leases.insert(seller_id.0.clone(), lease.clone());
        Ok(Some(lease))
    }

    async fn release(&self, seller_id: &SellerId, holder_id: &str) -> Result<bool, RepositoryError> {
        let mut leases = self.leases.write().await;
        match leases.get(&seller_id.0) {
            Some(current) if current.holder_id == holder_id => {
                leases.remove(&seller_id.0);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
