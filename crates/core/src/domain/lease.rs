//! Seller pass lease.
//!
//! A lease is the cross-process mutual exclusion record for one seller's pass. It is
//! stored outside any worker process and expires on its own, so a crashed worker can
//! never wedge a seller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::interaction::SellerId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerLease {
    pub seller_id: SellerId,
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SellerLease {
    pub fn new(
        seller_id: SellerId,
        holder_id: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self { seller_id, holder_id: holder_id.into(), acquired_at: now, expires_at: now + ttl }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `candidate_holder` may take this lease at `now`.
    ///
    /// The current holder may re-acquire; anyone else only once the lease expired.
    pub fn can_be_taken_by(&self, candidate_holder: &str, now: DateTime<Utc>) -> bool {
        self.holder_id == candidate_holder || self.is_expired(now)
    }
}
