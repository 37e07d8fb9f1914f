use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use replyguard_cli::commands::{doctor, migrate, pass, preview, seed};
use chrono::Utc;
use replyguard_core::decision::PreviewRequest;
use replyguard_core::domain::interaction::{
    Channel, Interaction, InteractionId, InteractionStatus, SellerId,
};
use serde_json::Value;

const MEMORY_DB: (&str, &str) = ("REPLYGUARD_DATABASE_URL", "sqlite::memory:");

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_cap() {
    with_env(&[MEMORY_DB, ("REPLYGUARD_ORCHESTRATOR_MAX_PER_CYCLE", "25")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_demo_summary() {
    with_env(&[MEMORY_DB], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("seller-demo"));
        assert!(message.contains("  - auto: int-demo-review-5"));
        assert!(message.contains("  - block: int-demo-review-2"));
        assert!(message.contains("  - draft: int-demo-question"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_file_url(&dir.path().join("seed.db"));

    with_env(&[("REPLYGUARD_DATABASE_URL", &url)], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );
    });
}

#[test]
fn pass_rejects_empty_seller() {
    with_env(&[MEMORY_DB], || {
        let result = pass::run("   ");
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "pass");
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn pass_for_unconfigured_seller_reports_disabled() {
    with_env(&[MEMORY_DB], || {
        let result = pass::run("seller-unknown");
        assert_eq!(result.exit_code, 0, "output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["status"], "seller_disabled");
        assert_eq!(payload["details"]["seller_id"], "seller-unknown");
    });
}

#[test]
fn pass_with_unreachable_generator_skips_every_interaction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_file_url(&dir.path().join("pass.db"));

    with_env(
        &[
            ("REPLYGUARD_DATABASE_URL", &url),
            ("REPLYGUARD_DRAFT_GENERATOR_BASE_URL", "http://127.0.0.1:9"),
            ("REPLYGUARD_DRAFT_GENERATOR_TIMEOUT_SECS", "2"),
            ("REPLYGUARD_CONNECTOR_BASE_URL", "http://127.0.0.1:9"),
        ],
        || {
            assert_eq!(seed::run().exit_code, 0, "seed demo data");

            let result = pass::run("seller-demo");
            assert_eq!(result.exit_code, 0, "output: {}", result.output);

            let payload = parse_payload(&result.output);
            let details = &payload["details"];
            assert_eq!(details["status"], "completed");

            let outcomes = details["outcomes"].as_array().expect("outcomes array");
            assert_eq!(outcomes.len(), 3);
            for outcome in outcomes {
                assert_eq!(outcome["action"], "skipped");
                assert_eq!(outcome["reason"], "generation_failed");
            }
        },
    );
}

#[test]
fn preview_allows_clean_five_star_reply() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("preview.json");
    write_preview(&path, Some(5), "Спасибо за отзыв! Рады, что покупка вам понравилась.");

    let result = preview::run(&path);
    assert_eq!(result.exit_code, 0, "output: {}", result.output);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["details"]["auto_action_allowed"], true);
    assert_eq!(payload["details"]["reason"], "all_gates_passed");
}

#[test]
fn preview_blocks_low_rating_before_guardrails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("preview.json");
    write_preview(&path, Some(2), "Спасибо за отзыв! Нам жаль, что товар не подошел.");

    let result = preview::run(&path);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["details"]["auto_action_allowed"], false);
    assert_eq!(payload["details"]["reason"], "rating_below_threshold");
}

#[test]
fn preview_rejects_malformed_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"draft_text\": 42}").expect("write file");

    let result = preview::run(&path);
    assert_eq!(result.exit_code, 7);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[test]
fn doctor_passes_on_migrated_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_file_url(&dir.path().join("doctor.db"));

    with_env(&[("REPLYGUARD_DATABASE_URL", &url)], || {
        let before: Value = serde_json::from_str(&doctor::run(true)).expect("doctor JSON");
        assert_eq!(before["overall_status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after: Value = serde_json::from_str(&doctor::run(true)).expect("doctor JSON");
        assert_eq!(after["overall_status"], "pass", "report: {after}");
    });
}

fn write_preview(path: &Path, rating: Option<u8>, draft_text: &str) {
    let now = Utc::now();
    let request = PreviewRequest {
        interaction: Interaction {
            id: InteractionId("int-preview".to_string()),
            seller_id: SellerId("seller-1".to_string()),
            channel: Channel::Review,
            external_id: "fb-preview".to_string(),
            customer_id: None,
            customer_name: None,
            order_id: None,
            product_id: None,
            article: None,
            rating,
            text: "Хороший товар".to_string(),
            status: InteractionStatus::Open,
            needs_response: true,
            is_auto_response: false,
            priority: 0,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        },
        draft_text: draft_text.to_string(),
        promo_opt_in: false,
        promos: Vec::new(),
    };
    let body = serde_json::to_string(&request).expect("serialize preview request");
    std::fs::write(path, body).expect("write preview request");
}

fn sqlite_file_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "REPLYGUARD_DATABASE_URL",
        "REPLYGUARD_DATABASE_MAX_CONNECTIONS",
        "REPLYGUARD_DATABASE_TIMEOUT_SECS",
        "REPLYGUARD_DRAFT_GENERATOR_BASE_URL",
        "REPLYGUARD_DRAFT_GENERATOR_API_KEY",
        "REPLYGUARD_DRAFT_GENERATOR_TIMEOUT_SECS",
        "REPLYGUARD_CONNECTOR_BASE_URL",
        "REPLYGUARD_CONNECTOR_API_KEY",
        "REPLYGUARD_CONNECTOR_TIMEOUT_SECS",
        "REPLYGUARD_ORCHESTRATOR_MAX_PER_CYCLE",
        "REPLYGUARD_ORCHESTRATOR_PASS_DEADLINE_SECS",
        "REPLYGUARD_ORCHESTRATOR_LEASE_TTL_SECS",
        "REPLYGUARD_ORCHESTRATOR_POLICY_VERSION",
        "REPLYGUARD_ORCHESTRATOR_HISTORY_WINDOW_DAYS",
        "REPLYGUARD_LOGGING_LEVEL",
        "REPLYGUARD_LOGGING_FORMAT",
        "REPLYGUARD_LOG_LEVEL",
        "REPLYGUARD_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
