use std::collections::BTreeSet;

use replyguard_core::domain::interaction::{Channel, SellerId};
use replyguard_core::domain::promo::{PromoCode, PromoId};
use sqlx::{sqlite::SqliteRow, Row};

use super::{
    decode_json, encode_json, format_timestamp, parse_optional_timestamp, parse_u32,
    PromoRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlPromoRepository {
    pool: DbPool,
}

impl SqlPromoRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PromoRepository for SqlPromoRepository {
    async fn list_active(&self, seller_id: &SellerId) -> Result<Vec<PromoCode>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                seller_id,
                code,
                message_template,
                channels_json,
                min_rating,
                active,
                usage_count,
                expires_at
             FROM promo_code
             WHERE seller_id = ? AND active = 1
             ORDER BY id ASC",
        )
        .bind(&seller_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(promo_from_row).collect()
    }

    async fn save(&self, promo: PromoCode) -> Result<(), RepositoryError> {
        let channels_json = encode_json("channels_json", &promo.channels)?;

        sqlx::query(
            "INSERT INTO promo_code (
                id,
                seller_id,
                code,
                message_template,
                channels_json,
                min_rating,
                active,
                usage_count,
                expires_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                message_template = excluded.message_template,
                channels_json = excluded.channels_json,
                min_rating = excluded.min_rating,
                active = excluded.active,
                usage_count = excluded.usage_count,
                expires_at = excluded.expires_at",
        )
        .bind(&promo.id.0)
        .bind(&promo.seller_id.0)
        .bind(&promo.code)
        .bind(&promo.message_template)
        .bind(channels_json)
        .bind(i64::from(promo.min_rating))
        .bind(promo.active)
        .bind(i64::from(promo.usage_count))
        .bind(promo.expires_at.map(format_timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_usage(&self, id: &PromoId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE promo_code SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn promo_from_row(row: SqliteRow) -> Result<PromoCode, RepositoryError> {
    let channels_raw = row.try_get::<String, _>("channels_json")?;
    let channels: BTreeSet<Channel> = decode_json("channels_json", &channels_raw)?;

    let min_rating_raw = row.try_get::<i64, _>("min_rating")?;
    let min_rating = u8::try_from(min_rating_raw)
        .map_err(|_| RepositoryError::Decode(format!("invalid min_rating `{min_rating_raw}`")))?;

    Ok(PromoCode {
        id: PromoId(row.try_get("id")?),
        seller_id: SellerId(row.try_get("seller_id")?),
        code: row.try_get("code")?,
        message_template: row.try_get("message_template")?,
        channels,
        min_rating,
        active: row.try_get("active")?,
        usage_count: parse_u32("usage_count", row.try_get("usage_count")?)?,
        expires_at: parse_optional_timestamp("expires_at", row.try_get("expires_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{DateTime, Utc};

    use replyguard_core::domain::interaction::{Channel, SellerId};
    use replyguard_core::domain::promo::{PromoCode, PromoId};

    use super::SqlPromoRepository;
    use crate::migrations;
    use crate::repositories::PromoRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn promo(id: &str, active: bool) -> PromoCode {
        PromoCode {
            id: PromoId(id.to_string()),
            seller_id: SellerId("seller-1".to_string()),
            code: format!("CODE-{id}"),
            message_template: "Промокод {code} на следующий заказ.".to_string(),
            channels: BTreeSet::from([Channel::Review]),
            min_rating: 5,
            active,
            usage_count: 0,
            expires_at: Some(
                DateTime::parse_from_rfc3339("2027-01-01T00:00:00Z")
                    .expect("valid rfc3339")
                    .with_timezone(&Utc),
            ),
        }
    }

    #[tokio::test]
    async fn list_active_skips_inactive_codes() {
        let pool = setup_pool().await;
        let repo = SqlPromoRepository::new(pool.clone());

        repo.save(promo("p-1", true)).await.expect("save active");
        repo.save(promo("p-2", false)).await.expect("save inactive");

        let active =
            repo.list_active(&SellerId("seller-1".to_string())).await.expect("list active");
        assert_eq!(active, vec![promo("p-1", true)]);

        pool.close().await;
    }

    #[tokio::test]
    async fn increment_usage_bumps_counter() {
        let pool = setup_pool().await;
        let repo = SqlPromoRepository::new(pool.clone());
        let id = PromoId("p-1".to_string());

        repo.save(promo("p-1", true)).await.expect("save");
        repo.increment_usage(&id).await.expect("increment");
        repo.increment_usage(&id).await.expect("increment");

        let active =
            repo.list_active(&SellerId("seller-1".to_string())).await.expect("list active");
        assert_eq!(active[0].usage_count, 2);

        pool.close().await;
    }
}
