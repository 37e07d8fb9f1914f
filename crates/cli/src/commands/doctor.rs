use replyguard_core::config::{AppConfig, LoadOptions};
use replyguard_db::{connect_with_config, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            check_lease_budget(&config),
            check_endpoints(&config),
            check_database(&config),
        ],
        Err(error) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
            DoctorCheck::skipped("lease_budget"),
            DoctorCheck::skipped("endpoint_readiness"),
            DoctorCheck::skipped("database_schema"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_lease_budget(config: &AppConfig) -> DoctorCheck {
    let worst_case = config
        .orchestrator
        .worst_case_pass_secs(config.draft_generator.timeout_secs, config.connector.timeout_secs);
    DoctorCheck {
        name: "lease_budget",
        status: CheckStatus::Pass,
        details: format!(
            "lease ttl {}s outlives worst-case pass of {worst_case}s",
            config.orchestrator.lease_ttl_secs
        ),
    }
}

fn check_endpoints(config: &AppConfig) -> DoctorCheck {
    let missing_keys: Vec<&str> = [
        ("draft_generator", config.draft_generator.api_key.is_none()),
        ("connector", config.connector.api_key.is_none()),
    ]
    .into_iter()
    .filter_map(|(section, missing)| missing.then_some(section))
    .collect();

    let mut details = format!(
        "draft generator at `{}`, connector at `{}`",
        config.draft_generator.base_url, config.connector.base_url
    );
    if !missing_keys.is_empty() {
        details.push_str(&format!("; no api key for {}", missing_keys.join(", ")));
    }
    DoctorCheck { name: "endpoint_readiness", status: CheckStatus::Pass, details }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_schema",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let applied = migrations::applied_count(&pool).await.map_err(|error| error.to_string());
        pool.close().await;
        applied
    });

    let expected = migrations::expected_count();
    match result {
        Ok(applied) if applied >= expected => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; {applied} migrations applied", config.database.url),
        },
        Ok(applied) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: format!(
                "connected, but {applied} of {expected} migrations applied; run `replyguard migrate`"
            ),
        },
        Err(error) => DoctorCheck { name: "database_schema", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
