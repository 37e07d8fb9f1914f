use replyguard_core::audit::{ActionTaken, AuditEvent};
use replyguard_core::domain::interaction::{InteractionId, SellerId};
use replyguard_core::domain::scenario::Intent;
use replyguard_core::linking::LinkType;
use sqlx::{sqlite::SqliteRow, Row};

use super::{
    decode_json, encode_json, format_timestamp, parse_timestamp, AuditRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let violations_json = encode_json("violations_json", &event.violations)?;
        let warnings_json = encode_json("warnings_json", &event.warnings)?;

        sqlx::query(
            "INSERT INTO audit_event (
                id,
                interaction_id,
                seller_id,
                correlation_id,
                occurred_at,
                policy_version,
                intent,
                intent_confidence,
                link_type,
                confidence,
                action_taken,
                policy_reason,
                violations_json,
                warnings_json,
                draft_text,
                final_text,
                decision_key
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.interaction_id.0)
        .bind(&event.seller_id.0)
        .bind(&event.correlation_id)
        .bind(format_timestamp(event.occurred_at))
        .bind(&event.policy_version)
        .bind(event.intent.map(|intent| intent.as_str()))
        .bind(event.intent_confidence)
        .bind(event.link_type.map(|link_type| link_type.as_str()))
        .bind(event.confidence)
        .bind(event.action_taken.as_str())
        .bind(&event.policy_reason)
        .bind(violations_json)
        .bind(warnings_json)
        .bind(event.draft_text.as_deref())
        .bind(event.final_text.as_deref())
        .bind(&event.decision_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_interaction(
        &self,
        interaction_id: &InteractionId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                interaction_id,
                seller_id,
                correlation_id,
                occurred_at,
                policy_version,
                intent,
                intent_confidence,
                link_type,
                confidence,
                action_taken,
                policy_reason,
                violations_json,
                warnings_json,
                draft_text,
                final_text,
                decision_key
             FROM audit_event
             WHERE interaction_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&interaction_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(audit_event_from_row).collect()
    }

    async fn has_sent(&self, interaction_id: &InteractionId) -> Result<bool, RepositoryError> {
        let sent: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM audit_event WHERE interaction_id = ? AND action_taken = 'sent'
             )",
        )
        .bind(&interaction_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(sent)
    }
}

fn audit_event_from_row(row: SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action_taken")?;
    let action_taken = ActionTaken::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action_taken `{action_raw}`")))?;

    let link_type = row
        .try_get::<Option<String>, _>("link_type")?
        .map(|raw| {
            LinkType::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown link_type `{raw}`")))
        })
        .transpose()?;

    let violations_raw = row.try_get::<String, _>("violations_json")?;
    let warnings_raw = row.try_get::<String, _>("warnings_json")?;

    Ok(AuditEvent {
        event_id: row.try_get("id")?,
        interaction_id: InteractionId(row.try_get("interaction_id")?),
        seller_id: SellerId(row.try_get("seller_id")?),
        correlation_id: row.try_get("correlation_id")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
        policy_version: row.try_get("policy_version")?,
        intent: row.try_get::<Option<String>, _>("intent")?.map(|raw| Intent::parse(&raw)),
        intent_confidence: row.try_get("intent_confidence")?,
        link_type,
        confidence: row.try_get("confidence")?,
        action_taken,
        policy_reason: row.try_get("policy_reason")?,
        violations: decode_json("violations_json", &violations_raw)?,
        warnings: decode_json("warnings_json", &warnings_raw)?,
        draft_text: row.try_get("draft_text")?,
        final_text: row.try_get("final_text")?,
        decision_key: row.try_get("decision_key")?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};

    use replyguard_core::audit::{ActionTaken, AuditEvent};
    use replyguard_core::domain::interaction::{
        Channel, Interaction, InteractionId, InteractionStatus, SellerId,
    };
    use replyguard_core::domain::scenario::Intent;
    use replyguard_core::guardrails::{
        GuardrailCategory, GuardrailViolation, Severity, ValidationReport,
    };

    use super::SqlAuditRepository;
    use crate::migrations;
    use crate::repositories::AuditRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn interaction() -> Interaction {
        let created_at = parse_ts("2026-03-01T10:00:00Z");
        Interaction {
            id: InteractionId("int-audit".to_string()),
            seller_id: SellerId("seller-1".to_string()),
            channel: Channel::Review,
            external_id: "fb-1".to_string(),
            customer_id: None,
            customer_name: None,
            order_id: None,
            product_id: None,
            article: None,
            rating: Some(5),
            text: "Всё супер".to_string(),
            status: InteractionStatus::Open,
            needs_response: true,
            is_auto_response: false,
            priority: 0,
            metadata: BTreeMap::new(),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn appended_events_read_back_in_order() {
        let pool = setup_pool().await;
        let repo = SqlAuditRepository::new(pool.clone());
        let interaction = interaction();

        let drafted = AuditEvent::new(
            &interaction,
            "corr-1",
            "guardrails-v1",
            ActionTaken::Drafted,
            "guardrail_violation",
        )
        .with_intent(Intent::Thanks, 0.91)
        .with_report(&ValidationReport {
            violations: vec![GuardrailViolation {
                phrase: "гарантируем".to_string(),
                category: GuardrailCategory::Promise,
                severity: Severity::Error,
            }],
            warnings: Vec::new(),
        })
        .with_texts(Some("Мы гарантируем качество".to_string()), None)
        .with_occurred_at(parse_ts("2026-03-01T10:05:00Z"));

        let sent = AuditEvent::new(
            &interaction,
            "corr-2",
            "guardrails-v1",
            ActionTaken::Sent,
            "all_gates_passed",
        )
        .with_intent(Intent::Thanks, 0.95)
        .with_texts(Some("Спасибо!".to_string()), Some("Спасибо!".to_string()))
        .with_occurred_at(parse_ts("2026-03-01T10:06:00Z"));

        repo.append(drafted.clone()).await.expect("append drafted");
        repo.append(sent.clone()).await.expect("append sent");

        let events = repo.list_for_interaction(&interaction.id).await.expect("list events");
        assert_eq!(events, vec![drafted, sent]);

        pool.close().await;
    }

    #[tokio::test]
    async fn has_sent_only_counts_sent_actions() {
        let pool = setup_pool().await;
        let repo = SqlAuditRepository::new(pool.clone());
        let interaction = interaction();

        let blocked = AuditEvent::new(
            &interaction,
            "corr-1",
            "guardrails-v1",
            ActionTaken::Blocked,
            "intent_always_blocked",
        );
        repo.append(blocked).await.expect("append blocked");
        assert!(!repo.has_sent(&interaction.id).await.expect("has_sent"));

        let sent = AuditEvent::new(
            &interaction,
            "corr-2",
            "guardrails-v1",
            ActionTaken::Sent,
            "all_gates_passed",
        );
        repo.append(sent).await.expect("append sent");
        assert!(repo.has_sent(&interaction.id).await.expect("has_sent"));

        pool.close().await;
    }

    #[tokio::test]
    async fn stored_events_cannot_be_updated_or_deleted() {
        let pool = setup_pool().await;
        let repo = SqlAuditRepository::new(pool.clone());
        let event = AuditEvent::new(
            &interaction(),
            "corr-1",
            "guardrails-v1",
            ActionTaken::Skipped,
            "generation_failed",
        );
        repo.append(event.clone()).await.expect("append");

        let update = sqlx::query("UPDATE audit_event SET policy_reason = 'edited' WHERE id = ?")
            .bind(&event.event_id)
            .execute(&pool)
            .await;
        let error = update.expect_err("update must be rejected");
        assert!(error.to_string().contains("append-only"), "unexpected error: {error}");

        let delete = sqlx::query("DELETE FROM audit_event WHERE id = ?")
            .bind(&event.event_id)
            .execute(&pool)
            .await;
        assert!(delete.is_err(), "delete must be rejected");

        pool.close().await;
    }
}
