use std::process::ExitCode;

use tracing::{error, info};

use smdc_client::config::{load_config, schema_json};
use smdc_client::context::{AppContext, Capabilities};
use smdc_client::session::RestoreOutcome;
use smdc_client::utils::init_logging;

const CONFIG_PATH_VAR: &str = "SMDC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args().skip(1).any(|arg| arg == "--schema") {
        return match schema_json() {
            Ok(schema) => {
                println!("{schema}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Could not render the configuration schema: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let context = match AppContext::build(config, Capabilities::headless()) {
        Ok(context) => context,
        Err(e) => {
            error!("Could not build the session context: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match context.restore().await {
        RestoreOutcome::NoSession => info!("No stored session, login required"),
        RestoreOutcome::Restored(principal) => info!(
            principal = principal.display_name().unwrap_or(""),
            "Stored session is valid"
        ),
        RestoreOutcome::Cleared => info!("Stored session was rejected and removed"),
        RestoreOutcome::Offline => info!("Backend unreachable, keeping the stored session"),
    }
    ExitCode::SUCCESS
}
