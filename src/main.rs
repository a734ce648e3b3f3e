//! Application entry point building the Actix-Web server.
use std::env;
use std::path::PathBuf;

use config::Config;
use dotenvy::dotenv;

use voucher_system::models::config::{RuntimeConfig, ServerConfig};
use voucher_system::run;
use voucher_system::services::static_files::collect_static;

#[actix_web::main]
async fn main() {
    // Load environment variables from `.env` in local development.
    dotenv().ok();

    let base_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let runtime = RuntimeConfig::from_process_env(&base_dir);

    // `RUST_LOG` wins over the level derived from the debug flag.
    let default_filter = match &runtime {
        Ok(runtime) => runtime.logging().filter_directive(),
        Err(_) => "info".to_string(),
    };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(default_filter));

    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Error resolving runtime config: {}", err);
            std::process::exit(1);
        }
    };

    // `voucher-system collectstatic` gathers assets for the static root and exits.
    if env::args().nth(1).as_deref() == Some("collectstatic") {
        match collect_static(runtime.static_files()) {
            Ok(_) => return,
            Err(err) => {
                log::error!("Error collecting static files: {}", err);
                std::process::exit(1);
            }
        }
    }

    // Select config profile (defaults to `local`).
    let app_env = env::var("APP_ENV").unwrap_or_else(|_| "local".into());

    let settings = Config::builder()
        // Add `./config/default.yaml`
        .add_source(config::File::with_name("config/default"))
        // Add environment-specific overrides
        .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
        // Add settings from the environment (with a prefix of APP)
        .add_source(config::Environment::with_prefix("APP"))
        .build();

    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("Error loading settings: {}", err);
            std::process::exit(1);
        }
    };

    let server_config = match settings.try_deserialize::<ServerConfig>() {
        Ok(server_config) => server_config,
        Err(err) => {
            log::error!("Error loading server config: {}", err);
            std::process::exit(1);
        }
    };

    log::info!(
        "Starting server on {}:{}",
        server_config.address,
        server_config.port
    );

    if let Err(err) = run(server_config, runtime).await {
        log::error!("Error starting server: {}", err);
        std::process::exit(1);
    }
}
