use chrono::{DateTime, Utc};
use replyguard_core::domain::interaction::{
    Channel, Interaction, InteractionId, InteractionStatus, SellerId,
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use super::{
    decode_json, encode_json, format_timestamp, parse_timestamp, InteractionRepository,
    RepositoryError,
};
use crate::DbPool;

const INTERACTION_COLUMNS: &str = "id,
    seller_id,
    channel,
    external_id,
    customer_id,
    customer_name,
    order_id,
    product_id,
    article,
    rating,
    text,
    status,
    needs_response,
    is_auto_response,
    priority,
    metadata_json,
    created_at,
    updated_at";

pub struct SqlInteractionRepository {
    pool: DbPool,
}

impl SqlInteractionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InteractionRepository for SqlInteractionRepository {
    async fn find_by_id(&self, id: &InteractionId) -> Result<Option<Interaction>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {INTERACTION_COLUMNS} FROM interaction WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(interaction_from_row).transpose()
    }

    async fn save(&self, interaction: Interaction) -> Result<(), RepositoryError> {
        let metadata_json = encode_json("metadata_json", &interaction.metadata)?;

        sqlx::query(
            "INSERT INTO interaction (
                id,
                seller_id,
                channel,
                external_id,
                customer_id,
                customer_name,
                order_id,
                product_id,
                article,
                rating,
                text,
                status,
                needs_response,
                is_auto_response,
                priority,
                metadata_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                customer_id = excluded.customer_id,
                customer_name = excluded.customer_name,
                order_id = excluded.order_id,
                product_id = excluded.product_id,
                article = excluded.article,
                rating = excluded.rating,
                text = excluded.text,
                status = excluded.status,
                needs_response = excluded.needs_response,
                is_auto_response = excluded.is_auto_response,
                priority = excluded.priority,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at",
        )
        .bind(&interaction.id.0)
        .bind(&interaction.seller_id.0)
        .bind(interaction.channel.as_str())
        .bind(&interaction.external_id)
        .bind(interaction.customer_id.as_deref())
        .bind(interaction.customer_name.as_deref())
        .bind(interaction.order_id.as_deref())
        .bind(interaction.product_id.as_deref())
        .bind(interaction.article.as_deref())
        .bind(interaction.rating.map(i64::from))
        .bind(&interaction.text)
        .bind(interaction.status.as_str())
        .bind(interaction.needs_response)
        .bind(interaction.is_auto_response)
        .bind(i64::from(interaction.priority))
        .bind(metadata_json)
        .bind(format_timestamp(interaction.created_at))
        .bind(format_timestamp(interaction.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_awaiting_response(
        &self,
        seller_id: &SellerId,
        channels: &[Channel],
        decided_scope: &str,
        limit: u32,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        if channels.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {INTERACTION_COLUMNS} FROM interaction WHERE seller_id = "
        ));
        builder.push_bind(seller_id.0.as_str());
        builder.push(" AND needs_response = 1 AND status = 'open' AND channel IN (");
        let mut separated = builder.separated(", ");
        for channel in channels {
            separated.push_bind(channel.as_str());
        }
        separated.push_unseparated(")");
        builder.push(" AND json_extract(metadata_json, '$.scenario_decision.scope') IS NOT ");
        builder.push_bind(decided_scope);
        builder.push(" ORDER BY created_at ASC, id ASC LIMIT ");
        builder.push_bind(i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(interaction_from_row).collect()
    }

    async fn list_since(
        &self,
        seller_id: &SellerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS}
             FROM interaction
             WHERE seller_id = ? AND created_at >= ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&seller_id.0)
        .bind(format_timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(interaction_from_row).collect()
    }
}

fn interaction_from_row(row: SqliteRow) -> Result<Interaction, RepositoryError> {
    let channel_raw = row.try_get::<String, _>("channel")?;
    let channel = Channel::parse(&channel_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown channel `{channel_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = InteractionStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown interaction status `{status_raw}`"))
    })?;

    let rating = row
        .try_get::<Option<i64>, _>("rating")?
        .map(|value| {
            u8::try_from(value)
                .map_err(|_| RepositoryError::Decode(format!("invalid rating `{value}`")))
        })
        .transpose()?;

    let priority_raw = row.try_get::<i64, _>("priority")?;
    let priority = i32::try_from(priority_raw)
        .map_err(|_| RepositoryError::Decode(format!("invalid priority `{priority_raw}`")))?;

    let metadata_raw = row.try_get::<String, _>("metadata_json")?;

    Ok(Interaction {
        id: InteractionId(row.try_get("id")?),
        seller_id: SellerId(row.try_get("seller_id")?),
        channel,
        external_id: row.try_get("external_id")?,
        customer_id: row.try_get("customer_id")?,
        customer_name: row.try_get("customer_name")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        article: row.try_get("article")?,
        rating,
        text: row.try_get("text")?,
        status,
        needs_response: row.try_get("needs_response")?,
        is_auto_response: row.try_get("is_auto_response")?,
        priority,
        metadata: decode_json("metadata_json", &metadata_raw)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Duration, Utc};

    use replyguard_core::domain::interaction::{
        Channel, Interaction, InteractionId, InteractionStatus, SellerId,
    };

    use super::SqlInteractionRepository;
    use crate::migrations;
    use crate::repositories::InteractionRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample(id: &str, channel: Channel, created_at: DateTime<Utc>) -> Interaction {
        Interaction {
            id: InteractionId(id.to_string()),
            seller_id: SellerId("seller-1".to_string()),
            channel,
            external_id: format!("ext-{id}"),
            customer_id: Some("cust-1".to_string()),
            customer_name: Some("Мария".to_string()),
            order_id: None,
            product_id: Some("nm-100".to_string()),
            article: None,
            rating: (channel == Channel::Review).then_some(5),
            text: "Отличный товар!".to_string(),
            status: InteractionStatus::Open,
            needs_response: true,
            is_auto_response: false,
            priority: 1,
            metadata: BTreeMap::from([("source".to_string(), serde_json::json!("sync"))]),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn sql_interaction_repo_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlInteractionRepository::new(pool.clone());
        let interaction = sample("int-1", Channel::Review, parse_ts("2026-03-01T10:00:00Z"));

        repo.save(interaction.clone()).await.expect("save interaction");
        let found = repo.find_by_id(&interaction.id).await.expect("find interaction");
        assert_eq!(found, Some(interaction.clone()));

        let mut responded = interaction.clone();
        responded.record_auto_reply("Спасибо!", "guardrails-v1", parse_ts("2026-03-01T11:00:00Z"));
        repo.save(responded.clone()).await.expect("update interaction");

        let found = repo.find_by_id(&interaction.id).await.expect("find updated");
        assert_eq!(found, Some(responded));

        pool.close().await;
    }

    #[tokio::test]
    async fn awaiting_response_is_filtered_by_channel_and_ordered_oldest_first() {
        let pool = setup_pool().await;
        let repo = SqlInteractionRepository::new(pool.clone());
        let base = parse_ts("2026-03-01T10:00:00Z");

        repo.save(sample("newer", Channel::Review, base)).await.expect("save");
        repo.save(sample("older", Channel::Question, base - Duration::hours(5))).await.expect("save");
        repo.save(sample("chat", Channel::Chat, base - Duration::hours(9))).await.expect("save");
        let mut closed = sample("closed", Channel::Review, base - Duration::hours(20));
        closed.status = InteractionStatus::Closed;
        closed.needs_response = false;
        repo.save(closed).await.expect("save");

        let seller = SellerId("seller-1".to_string());
        let pending = repo
            .list_awaiting_response(&seller, &[Channel::Review, Channel::Question], "v1:scope", 10)
            .await
            .expect("list pending");
        let ids: Vec<&str> = pending.iter().map(|item| item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["older", "newer"]);

        let limited = repo
            .list_awaiting_response(&seller, &Channel::ALL, "v1:scope", 1)
            .await
            .expect("list limited");
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id.0, "chat");

        let none =
            repo.list_awaiting_response(&seller, &[], "v1:scope", 10).await.expect("list none");
        assert!(none.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn awaiting_response_skips_interactions_decided_under_the_same_scope() {
        let pool = setup_pool().await;
        let repo = SqlInteractionRepository::new(pool.clone());
        let base = parse_ts("2026-03-01T10:00:00Z");

        let mut decided = sample("decided", Channel::Review, base - Duration::hours(2));
        decided.record_decision("block", "rating_below_threshold", "v1:scope", base);
        repo.save(decided).await.expect("save");
        repo.save(sample("fresh", Channel::Review, base)).await.expect("save");

        let seller = SellerId("seller-1".to_string());
        let pending = repo
            .list_awaiting_response(&seller, &[Channel::Review], "v1:scope", 10)
            .await
            .expect("list pending");
        let ids: Vec<&str> = pending.iter().map(|item| item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);

        let rescoped = repo
            .list_awaiting_response(&seller, &[Channel::Review], "v2:scope", 10)
            .await
            .expect("list after policy change");
        let ids: Vec<&str> = rescoped.iter().map(|item| item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["decided", "fresh"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn list_since_respects_history_window() {
        let pool = setup_pool().await;
        let repo = SqlInteractionRepository::new(pool.clone());
        let base = parse_ts("2026-03-01T10:00:00Z");

        repo.save(sample("recent", Channel::Chat, base - Duration::days(3))).await.expect("save");
        repo.save(sample("ancient", Channel::Chat, base - Duration::days(200))).await.expect("save");

        let seller = SellerId("seller-1".to_string());
        let history =
            repo.list_since(&seller, base - Duration::days(90)).await.expect("list history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id.0, "recent");

        pool.close().await;
    }
}
