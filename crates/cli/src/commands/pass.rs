use std::sync::Arc;

use anyhow::Context;
use replyguard_agent::{
    AutoResponseOrchestrator, HttpChannelConnector, HttpDraftGenerator, OrchestratorPorts,
    OrchestratorSettings, PassReport, TokioPacer,
};
use replyguard_core::audit::ActionTaken;
use replyguard_core::config::AppConfig;
use replyguard_core::decision::ReplyGuard;
use replyguard_core::domain::interaction::SellerId;
use replyguard_db::repositories::{
    SqlAuditRepository, SqlInteractionRepository, SqlLeaseRepository, SqlPromoRepository,
    SqlSellerSettingsRepository,
};
use replyguard_db::{connect_with_config, migrations, DbPool};

use crate::commands::{
    build_runtime, load_config, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_INVALID_INPUT,
    EXIT_MIGRATION, EXIT_PASS_FAILURE,
};
use crate::logging;

pub fn run(seller: &str) -> CommandResult {
    let seller = seller.trim();
    if seller.is_empty() {
        return CommandResult::failure(
            "pass",
            "invalid_input",
            "--seller must be a non-empty seller id",
            EXIT_INVALID_INPUT,
        );
    }

    let config = match load_config("pass") {
        Ok(config) => config,
        Err(result) => return result,
    };
    logging::init(&config);
    let runtime = match build_runtime("pass") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let seller_id = SellerId(seller.to_string());
    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let outcome = match build_orchestrator(&config, pool.clone()) {
            Ok(orchestrator) => orchestrator
                .run_pass(&seller_id)
                .await
                .map_err(|error| ("pass_failure", error.to_string(), EXIT_PASS_FAILURE)),
            Err(error) => Err(("pass_setup", format!("{error:#}"), EXIT_PASS_FAILURE)),
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(details) => CommandResult::success_with("pass", summarize(&report), details),
            Err(error) => CommandResult::failure(
                "pass",
                "serialization",
                error.to_string(),
                EXIT_PASS_FAILURE,
            ),
        },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("pass", error_class, message, exit_code)
        }
    }
}

/// Wires SQL repositories and HTTP clients into an orchestrator.
pub fn build_orchestrator(
    config: &AppConfig,
    pool: DbPool,
) -> anyhow::Result<AutoResponseOrchestrator> {
    let guard = ReplyGuard::new().context("compiling guardrail rule tables")?;
    let generator = HttpDraftGenerator::from_config(&config.draft_generator)
        .context("building draft generator client")?;
    let connector = HttpChannelConnector::from_config(&config.connector)
        .context("building channel connector client")?;

    let ports = OrchestratorPorts {
        interactions: Arc::new(SqlInteractionRepository::new(pool.clone())),
        audit: Arc::new(SqlAuditRepository::new(pool.clone())),
        seller_settings: Arc::new(SqlSellerSettingsRepository::new(pool.clone())),
        promos: Arc::new(SqlPromoRepository::new(pool.clone())),
        leases: Arc::new(SqlLeaseRepository::new(pool)),
        generator: Arc::new(generator),
        connector: Arc::new(connector),
        pacer: Arc::new(TokioPacer),
    };

    Ok(AutoResponseOrchestrator::new(guard, ports, OrchestratorSettings::from_config(config)))
}

fn summarize(report: &PassReport) -> String {
    format!(
        "pass {}: sent {}, drafted {}, blocked {}, skipped {}, deferred {}",
        report.status.as_str(),
        report.count(ActionTaken::Sent),
        report.count(ActionTaken::Drafted),
        report.count(ActionTaken::Blocked),
        report.count(ActionTaken::Skipped),
        report.deferred
    )
}
