use replyguard_db::fixtures::ScenarioSeedInfo;
use replyguard_db::{connect_with_config, migrations, DemoSeedDataset};

use crate::commands::{
    build_runtime, load_config, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION,
};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        let run_result = if verification.all_present {
            Ok(render_summary(seed_result.seller_id, &seed_result.scenarios_seeded))
        } else {
            Err(("seed_verification", verification_failure_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn render_summary(seller_id: &str, scenarios: &[ScenarioSeedInfo]) -> String {
    let lines: Vec<String> = scenarios
        .iter()
        .map(|scenario| {
            format!(
                "  - {}: {} ({})",
                scenario.expected_path, scenario.interaction_id, scenario.description
            )
        })
        .collect();
    format!("demo seller `{seller_id}` seeded with {} interactions:\n{}", lines.len(), lines.join("\n"))
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use replyguard_db::fixtures::ScenarioSeedInfo;

    use super::{render_summary, verification_failure_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_failure_message(&["seller-settings", "promo-codes"]),
            "Seed verification failed for checks: seller-settings, promo-codes"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_failure_message(&[]), "Some seed data failed to load");
    }

    #[test]
    fn summary_lists_each_seeded_path() {
        let summary = render_summary(
            "seller-demo",
            &[ScenarioSeedInfo {
                interaction_id: "int-demo-question",
                expected_path: "draft",
                description: "Delivery question, draft for operator review",
            }],
        );
        assert!(summary.starts_with("demo seller `seller-demo` seeded with 1 interactions"));
        assert!(summary.contains("  - draft: int-demo-question (Delivery question"));
    }
}
