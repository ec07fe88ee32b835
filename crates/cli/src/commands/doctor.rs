use serde::Serialize;
use serde_json::json;

use crate::commands::CommandResult;
use ordesk_core::config::{AppConfig, LlmProvider, LoadOptions};
use ordesk_db::connect_with_settings;
use secrecy::ExposeSecret;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    passed: bool,
    detail: String,
}

pub fn run(json_output: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                passed: true,
                detail: "configuration loaded and validated".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config",
                passed: false,
                detail: format!("configuration issue: {error}"),
            });
            None
        }
    };

    if let Some(config) = &config {
        checks.push(llm_readiness(config));
        checks.push(database_connectivity(config));
    }

    let all_passed = checks.iter().all(|check| check.passed);
    let output = render(&checks, all_passed, json_output);
    CommandResult { exit_code: if all_passed { 0 } else { 1 }, output }
}

fn llm_readiness(config: &AppConfig) -> DoctorCheck {
    let ready = match config.llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => config
            .llm
            .api_key
            .as_ref()
            .map(|key| !key.expose_secret().trim().is_empty())
            .unwrap_or(false),
        LlmProvider::Ollama => {
            config.llm.base_url.as_ref().map(|url| !url.trim().is_empty()).unwrap_or(false)
        }
    };

    DoctorCheck {
        name: "llm_credentials",
        passed: ready,
        detail: if ready {
            format!("provider {:?} has the credentials it needs", config.llm.provider)
        } else {
            format!("provider {:?} is missing api_key/base_url", config.llm.provider)
        },
    }
}

fn database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database",
                passed: false,
                detail: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await?;
        let check = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await;
        pool.close().await;
        check.map(|_| ())
    });

    match outcome {
        Ok(()) => DoctorCheck {
            name: "database",
            passed: true,
            detail: format!("connected to `{}` and ran a probe query", config.database.url),
        },
        Err(error) => DoctorCheck {
            name: "database",
            passed: false,
            detail: format!("database check failed: {error}"),
        },
    }
}

fn render(checks: &[DoctorCheck], all_passed: bool, json_output: bool) -> String {
    if json_output {
        let payload = json!({
            "command": "doctor",
            "status": if all_passed { "ok" } else { "error" },
            "checks": checks,
        });
        return serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    }

    let mut lines = vec![format!(
        "ordesk doctor: {}",
        if all_passed { "all checks passed" } else { "some checks FAILED" }
    )];
    for check in checks {
        lines.push(format!(
            "  [{}] {}: {}",
            if check.passed { "ok" } else { "!!" },
            check.name,
            check.detail
        ));
    }
    lines.join("\n")
}
