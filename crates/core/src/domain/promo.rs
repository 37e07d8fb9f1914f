use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::interaction::{Channel, SellerId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromoId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: PromoId,
    pub seller_id: SellerId,
    pub code: String,
    /// Snippet appended to the reply; `{code}` is substituted.
    pub message_template: String,
    pub channels: BTreeSet<Channel>,
    pub min_rating: u8,
    pub active: bool,
    pub usage_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PromoCode {
    pub fn is_eligible(&self, channel: Channel, rating: Option<u8>, now: DateTime<Utc>) -> bool {
        self.active
            && self.channels.contains(&channel)
            && rating.is_some_and(|rating| rating >= self.min_rating)
            && self.expires_at.map_or(true, |expires_at| expires_at > now)
    }

    pub fn render_snippet(&self) -> String {
        self.message_template.replace("{code}", &self.code)
    }
}
