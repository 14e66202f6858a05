//! SPOE Auth Service - Main Entry Point

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use spoe_auth::config::{Config, Mode};
use spoe_auth::http::{self, HttpState};
use spoe_auth::observability::{init_tracing, AuthMetrics, TracingConfig};
use spoe_auth::shutdown::{wait_for_signal, ShutdownCoordinator};
use spoe_auth::spoe::{spoe_gate, Agent, NotifyHandler};
use spoe_auth::token::TokenVerifier;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let tracing_config = TracingConfig::default()
        .with_debug(config.debug)
        .with_format(config.log_format);
    init_tracing(&tracing_config);

    match run(config).await {
        Ok(()) => {
            info!("SPOE Auth Service stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = format!("{e:#}"), "SPOE Auth Service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        mode = config.mode.as_str(),
        addr = %config.listen_addr,
        ignore_exp = config.verifier.ignore_time,
        bypass_enabled = config.admin_api_key.is_some(),
        "Starting SPOE Auth Service"
    );

    let verifier = Arc::new(TokenVerifier::new(config.verifier.clone()));
    let metrics = Arc::new(AuthMetrics::new().context("registering metrics")?);

    match config.mode {
        Mode::Http => {
            let gate = http::http_gate(verifier, config.admin_api_key.clone())
                .with_metrics(Arc::clone(&metrics));
            let listener = http::bind(&config.listen_addr).await?;
            http::serve(listener, HttpState::new(gate, Some(metrics)), wait_for_signal()).await?;
        }
        Mode::Spoe => {
            let gate = spoe_gate(verifier, config.admin_api_key.clone(), &config.spoe)
                .with_metrics(Arc::clone(&metrics));
            let agent = Agent::new(NotifyHandler::new(gate, &config.spoe), config.spoe.max_frame_size)
                .with_metrics(metrics);

            let listener = Agent::bind(&config.listen_addr).await?;
            let mut coordinator = ShutdownCoordinator::new();
            agent.serve(listener, &mut coordinator, wait_for_signal()).await;
            coordinator.shutdown(config.shutdown_timeout).await;
        }
    }

    Ok(())
}
