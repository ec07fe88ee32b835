use secrecy::ExposeSecret;
use serde_json::json;

use ordesk_core::config::{AppConfig, LoadOptions};

/// Renders the effective configuration as JSON with secrets redacted.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return json!({
                "command": "config",
                "status": "error",
                "message": format!("configuration issue: {error}"),
            })
            .to_string();
        }
    };

    let api_key = match &config.llm.api_key {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "***redacted***",
        _ => "(unset)",
    };

    let payload = json!({
        "command": "config",
        "status": "ok",
        "effective": {
            "database": {
                "url": config.database.url,
                "max_connections": config.database.max_connections,
                "timeout_secs": config.database.timeout_secs,
            },
            "llm": {
                "provider": format!("{:?}", config.llm.provider),
                "model": config.llm.model,
                "base_url": config.llm.base_url,
                "api_key": api_key,
                "timeout_secs": config.llm.timeout_secs,
                "max_retries": config.llm.max_retries,
            },
            "server": {
                "bind_address": config.server.bind_address,
                "port": config.server.port,
                "graceful_shutdown_secs": config.server.graceful_shutdown_secs,
            },
            "agent": {
                "memory_window": config.agent.memory_window,
                "max_tool_rounds": config.agent.max_tool_rounds,
                "default_actor": config.agent.default_actor,
            },
            "logging": {
                "level": config.logging.level,
                "format": format!("{:?}", config.logging.format),
            },
        },
    });

    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}
