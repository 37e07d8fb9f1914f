use chrono::{DateTime, Duration, Utc};
use replyguard_core::domain::interaction::SellerId;
use replyguard_core::domain::lease::SellerLease;

use super::{format_timestamp, LeaseRepository, RepositoryError};
use crate::DbPool;

/// Seller pass lease backed by a single upsert.
///
/// The conditional `DO UPDATE` only fires when the stored lease expired or belongs to the
/// same holder, so concurrent workers sharing the database file race on SQLite's write lock
/// and exactly one of them sees an affected row.
pub struct SqlLeaseRepository {
    pool: DbPool,
}

impl SqlLeaseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeaseRepository for SqlLeaseRepository {
    async fn try_acquire(
        &self,
        seller_id: &SellerId,
        holder_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<SellerLease>, RepositoryError> {
        let lease = SellerLease::new(seller_id.clone(), holder_id, now, ttl);

        let result = sqlx::query(
            "INSERT INTO seller_pass_lease (
                seller_id,
                holder_id,
                acquired_at,
                expires_at,
                expires_at_ms
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(seller_id) DO UPDATE SET
                holder_id = excluded.holder_id,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at,
                expires_at_ms = excluded.expires_at_ms
             WHERE seller_pass_lease.expires_at_ms <= ?
                OR seller_pass_lease.holder_id = excluded.holder_id",
        )
        .bind(&lease.seller_id.0)
        .bind(&lease.holder_id)
        .bind(format_timestamp(lease.acquired_at))
        .bind(format_timestamp(lease.expires_at))
        .bind(lease.expires_at.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() == 1).then_some(lease))
    }

    async fn release(&self, seller_id: &SellerId, holder_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM seller_pass_lease WHERE seller_id = ? AND holder_id = ?")
            .bind(&seller_id.0)
            .bind(holder_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
