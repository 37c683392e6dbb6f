use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use deposit_swapper::chain::RpcChainClient;
use deposit_swapper::config::{Config, PRIVATE_KEY_ENV};
use deposit_swapper::deployment::DeploymentRecord;
use deposit_swapper::orchestrator::ListenerOrchestrator;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();

    // Initialize structured logging (set RUST_LOG=debug for per-tick output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Deposit swapper starting");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = if std::path::Path::new(&config_path).exists() {
        let config = Config::load(&config_path)?;
        tracing::info!("Configuration loaded from {}", config_path);
        config
    } else {
        tracing::warn!(path = %config_path, "Config file not found, using defaults");
        Config::from_env()?
    };

    let deployment = DeploymentRecord::load(&config.listener.deployment_path)?;
    tracing::info!(
        contract = %deployment.address,
        path = %config.listener.deployment_path,
        "Deployment record loaded"
    );

    let signer: PrivateKeySigner = std::env::var(PRIVATE_KEY_ENV)
        .map_err(|_| eyre::eyre!("{} is not set", PRIVATE_KEY_ENV))?
        .trim()
        .parse()
        .map_err(|e| eyre::eyre!("Invalid {}: {}", PRIVATE_KEY_ENV, e))?;

    let chain = Arc::new(RpcChainClient::connect_http(
        &config.network.rpc_url,
        config.rpc_timeout(),
    )?);

    let orchestrator = match ListenerOrchestrator::startup(&config, chain, &deployment, signer).await
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e);
        }
    };

    let shutdown = CancellationToken::new();
    let mut listener = tokio::spawn(orchestrator.run(shutdown.clone()));

    tracing::info!("Listening for deposits. Press Ctrl+C to stop.");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown signal received, stopping listener...");
            shutdown.cancel();
            listener
                .await
                .map_err(|e| eyre::eyre!("Listener task failed: {}", e))??;
        }
        finished = &mut listener => {
            tracing::warn!("Listener exited before a shutdown signal");
            finished.map_err(|e| eyre::eyre!("Listener task failed: {}", e))??;
        }
    }

    tracing::info!("Deposit swapper stopped gracefully");
    Ok(())
}
