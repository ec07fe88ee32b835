use ordesk_cli::commands::{self, CommandResult};

#[test]
fn command_result_envelopes_are_machine_readable() {
    let success = CommandResult::success("migrate", "migrations applied");
    assert_eq!(success.exit_code, 0);
    let payload: serde_json::Value =
        serde_json::from_str(&success.output).expect("success output is JSON");
    assert_eq!(payload["command"], "migrate");
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["error_class"], serde_json::Value::Null);

    let failure = CommandResult::failure("seed", "db_connectivity", "no such host", 4);
    assert_eq!(failure.exit_code, 4);
    let payload: serde_json::Value =
        serde_json::from_str(&failure.output).expect("failure output is JSON");
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["error_class"], "db_connectivity");
}

/// Single test on purpose: the commands read `ORDESK_*` environment
/// overrides, which are process-global.
#[test]
fn migrate_seed_and_doctor_run_against_a_scratch_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("ordesk-cli-test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    std::env::set_var("ORDESK_DATABASE_URL", &url);

    let migrate = commands::migrate::run();
    assert_eq!(migrate.exit_code, 0, "migrate failed: {}", migrate.output);

    let seed = commands::seed::run();
    assert_eq!(seed.exit_code, 0, "seed failed: {}", seed.output);
    assert!(seed.output.contains("12345"));
    assert!(seed.output.contains("A-001"));

    // A second seed run skips the existing orders instead of overwriting.
    let reseed = commands::seed::run();
    assert_eq!(reseed.exit_code, 0, "reseed failed: {}", reseed.output);
    let payload: serde_json::Value =
        serde_json::from_str(&reseed.output).expect("seed output is JSON");
    assert!(payload["message"]
        .as_str()
        .expect("message")
        .starts_with("seeded []"));

    let doctor = commands::doctor::run(true);
    assert_eq!(doctor.exit_code, 0, "doctor failed: {}", doctor.output);
    let payload: serde_json::Value =
        serde_json::from_str(&doctor.output).expect("doctor output is JSON");
    assert_eq!(payload["status"], "ok");

    let rendered = commands::config::run();
    assert!(rendered.contains(&url));

    std::env::remove_var("ORDESK_DATABASE_URL");
}
