// Momentum Scanner entry point
// Usage: momentum_scanner [config.json]   (or SCANNER_CONFIG=config.json)

use std::process::ExitCode;
use tracing::{error, info};

use momentum_scanner::core::{setup_logging, ConfigManager};
use momentum_scanner::layer1::{PolygonRestClient, StreamClient};
use momentum_scanner::Scanner;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SCANNER_CONFIG").ok());

    let config = match ConfigManager::new(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            setup_logging(None, None);
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let monitoring = config.monitoring();
    setup_logging(Some(&monitoring.log_level), Some(monitoring.json_logs));

    match config.validate() {
        Ok(true) => {}
        Ok(false) | Err(_) => {
            error!("Invalid configuration");
            return ExitCode::FAILURE;
        }
    }

    let provider = config.provider();
    info!(summary = ?config.get_summary(), "Starting momentum scanner");

    let rest = match PolygonRestClient::from_config(&provider) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build REST client");
            return ExitCode::FAILURE;
        }
    };
    let stream = StreamClient::from_config(&provider);

    let scanner = Scanner::new(rest, stream)
        .with_reconnect(provider.max_reconnect_attempts)
        .with_top_gainers_report(monitoring.top_gainers_report);

    match scanner.run().await {
        Ok(outcome) => {
            outcome.metrics.print_report();
            if outcome.is_clean() {
                ExitCode::SUCCESS
            } else {
                error!(termination = %outcome.termination, "Stream terminated abnormally");
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "Scanner failed");
            ExitCode::FAILURE
        }
    }
}
