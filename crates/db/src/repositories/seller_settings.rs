use chrono::Utc;
use replyguard_core::domain::interaction::SellerId;
use replyguard_core::domain::scenario::{SellerSettings, SellerSettingsDocument};

use super::{decode_json, encode_json, format_timestamp, RepositoryError, SellerSettingsRepository};
use crate::DbPool;

pub struct SqlSellerSettingsRepository {
    pool: DbPool,
}

impl SqlSellerSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SellerSettingsRepository for SqlSellerSettingsRepository {
    async fn load(&self, seller_id: &SellerId) -> Result<Option<SellerSettings>, RepositoryError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT document_json FROM seller_settings WHERE seller_id = ?")
                .bind(&seller_id.0)
                .fetch_optional(&self.pool)
                .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let document: SellerSettingsDocument = decode_json("document_json", &raw)?;
        Ok(Some(document.into_settings(seller_id.clone())))
    }

    async fn save(
        &self,
        seller_id: &SellerId,
        document: &SellerSettingsDocument,
    ) -> Result<(), RepositoryError> {
        let document_json = encode_json("document_json", document)?;

        sqlx::query(
            "INSERT INTO seller_settings (seller_id, document_json, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(seller_id) DO UPDATE SET
                document_json = excluded.document_json,
                updated_at = excluded.updated_at",
        )
        .bind(&seller_id.0)
        .bind(document_json)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
