use crate::commands::CommandResult;
use ordesk_core::config::{AppConfig, LoadOptions};
use ordesk_db::{connect_with_settings, migrations, SeedOrders};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = SeedOrders::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = SeedOrders::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result = if verification.all_present {
            Ok(seed_result)
        } else {
            let failed: Vec<&str> = verification
                .checks
                .iter()
                .filter_map(|(order_id, present)| (!present).then_some(*order_id))
                .collect();
            Err(("seed_verification", format!("seed verification failed for: {}", failed.join(", ")), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seed_result) => CommandResult::success(
            "seed",
            format!(
                "seeded [{}], skipped existing [{}]",
                seed_result.orders_seeded.join(", "),
                seed_result.orders_skipped.join(", ")
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
