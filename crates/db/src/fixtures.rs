use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_SELLER_ID: &str = "seller-demo";

/// One seeded interaction per decision path the demo seller exercises.
const SEED_SCENARIOS: &[SeedScenarioContract] = &[
    SeedScenarioContract {
        interaction_id: "int-demo-review-5",
        channel: "review",
        rating: Some(5),
        expected_path: "auto",
        description: "Five-star thanks review, auto reply with promo",
    },
    SeedScenarioContract {
        interaction_id: "int-demo-review-2",
        channel: "review",
        rating: Some(2),
        expected_path: "block",
        description: "Two-star defect review, never answered automatically",
    },
    SeedScenarioContract {
        interaction_id: "int-demo-question",
        channel: "question",
        rating: None,
        expected_path: "draft",
        description: "Delivery question, draft for operator review",
    },
];

const SEED_PROMO_IDS: &[&str] = &["promo-demo-thanks"];

/// Deterministic demo data: one seller, its settings, three open interactions and a promo.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub const SELLER_ID: &str = DEMO_SELLER_ID;

    /// Loads the fixture. Reloading resets the seeded rows to their initial state.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let scenarios_seeded = SEED_SCENARIOS
            .iter()
            .map(|scenario| ScenarioSeedInfo {
                interaction_id: scenario.interaction_id,
                expected_path: scenario.expected_path,
                description: scenario.description,
            })
            .collect();

        Ok(SeedResult { seller_id: DEMO_SELLER_ID, scenarios_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let settings_exist: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM seller_settings WHERE seller_id = ?1)",
        )
        .bind(DEMO_SELLER_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("seller-settings", settings_exist));

        for scenario in SEED_SCENARIOS {
            let present: bool = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM interaction
                    WHERE id = ?1 AND seller_id = ?2 AND channel = ?3 AND rating IS ?4
                 )",
            )
            .bind(scenario.interaction_id)
            .bind(DEMO_SELLER_ID)
            .bind(scenario.channel)
            .bind(scenario.rating)
            .fetch_one(pool)
            .await?;
            checks.push((scenario.interaction_id, present));
        }

        let promo_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM promo_code WHERE id IN {} AND active = 1",
            sql_array_from_ids(SEED_PROMO_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("promo-codes", promo_count == SEED_PROMO_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows. Audit events written by passes over the demo data are kept.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let interaction_ids = SEED_SCENARIOS
            .iter()
            .map(|scenario| scenario.interaction_id)
            .collect::<Vec<_>>();

        sqlx::query(&format!(
            "DELETE FROM interaction WHERE id IN {}",
            sql_array_from_ids(&interaction_ids)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM promo_code WHERE id IN {}",
            sql_array_from_ids(SEED_PROMO_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM seller_settings WHERE seller_id = ?1")
            .bind(DEMO_SELLER_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM seller_pass_lease WHERE seller_id = ?1")
            .bind(DEMO_SELLER_ID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedScenarioContract {
    interaction_id: &'static str,
    channel: &'static str,
    rating: Option<i64>,
    expected_path: &'static str,
    description: &'static str,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub seller_id: &'static str,
    pub scenarios_seeded: Vec<ScenarioSeedInfo>,
}

#[derive(Debug)]
pub struct ScenarioSeedInfo {
    pub interaction_id: &'static str,
    pub expected_path: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use replyguard_core::domain::interaction::{InteractionId, SellerId};
    use replyguard_core::domain::scenario::{Intent, ScenarioAction};

    use super::DemoSeedDataset;
    use crate::repositories::{
        InteractionRepository, SellerSettingsRepository, SqlInteractionRepository,
        SqlSellerSettingsRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[test]
    fn sql_fixture_is_present() {
        assert!(DemoSeedDataset::SQL.contains("seller-demo"));
    }

    #[tokio::test]
    async fn seed_loads_verifies_and_reloads() {
        let pool = setup_pool().await;

        let first = DemoSeedDataset::load(&pool).await.expect("load seed");
        assert_eq!(first.scenarios_seeded.len(), 3);
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify seed");
        assert!(verification.all_present, "checks: {:?}", verification.checks);

        DemoSeedDataset::load(&pool).await.expect("reload seed");
        let again = DemoSeedDataset::verify(&pool).await.expect("re-verify seed");
        assert_eq!(verification.checks, again.checks);

        DemoSeedDataset::clean(&pool).await.expect("clean seed");
        let cleaned = DemoSeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!cleaned.all_present);

        pool.close().await;
    }

    #[tokio::test]
    async fn seeded_rows_decode_through_repositories() {
        let pool = setup_pool().await;
        DemoSeedDataset::load(&pool).await.expect("load seed");

        let seller = SellerId(DemoSeedDataset::SELLER_ID.to_string());
        let settings = SqlSellerSettingsRepository::new(pool.clone())
            .load(&seller)
            .await
            .expect("load settings")
            .expect("settings seeded");
        assert!(settings.enabled);
        assert_eq!(
            settings.scenarios.get(&Intent::Delivery).map(|scenario| scenario.action),
            Some(ScenarioAction::Draft)
        );

        let interaction = SqlInteractionRepository::new(pool.clone())
            .find_by_id(&InteractionId("int-demo-review-5".to_string()))
            .await
            .expect("find interaction")
            .expect("interaction seeded");
        assert_eq!(interaction.rating, Some(5));

        pool.close().await;
    }
}
