//! ANGLER: unattended fishing-session automation
//!
//! Entry point. Loads configuration, initialises structured logging,
//! resolves the accounts, and runs every account's fishing loop until
//! Ctrl+C.

use anyhow::Result;
use tracing::info;

use angler::config;
use angler::engine::orchestrator::Orchestrator;

const BANNER: &str = r#"
    _    _   _  ____ _     _____ ____
   / \  | \ | |/ ___| |   | ____|  _ \
  / _ \ |  \| | |  _| |   |  _| | |_) |
 / ___ \| |\  | |_| | |___| |___|  _ <
/_/   \_\_| \_|\____|_____|_____|_| \_\

  Unattended multi-account fishing automation
  v0.1.0
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("ANGLER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging(&cfg);

    println!("{BANNER}");
    info!(
        config = %config_path,
        accounts = cfg.accounts.len(),
        range_strategy = ?cfg.fishing.range_strategy,
        auto_sell = cfg.economy.enable_auto_sell,
        daily_claim = cfg.economy.enable_daily_claim,
        "ANGLER starting up"
    );

    // No usable account is fatal; everything after this point recovers.
    let orchestrator = Orchestrator::new(cfg)?;
    for profile in orchestrator.accounts() {
        info!(
            account = %profile.label,
            preferred_range = %profile.settings.fishing.preferred_range,
            is_5x = profile.settings.fishing.is_5x,
            "Account enabled"
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    info!("Entering main loop. Press Ctrl+C to stop.");

    tokio::select! {
        _ = orchestrator.run_forever() => {}
        _ = &mut shutdown => {
            info!("Shutdown signal received.");
        }
    }

    info!("ANGLER shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &config::AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("angler={}", cfg.logging.level)));

    let json_logging = cfg.logging.json || std::env::var("ANGLER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
