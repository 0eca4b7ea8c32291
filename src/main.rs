use anyhow::Result;
use garo_wallbox::config::{Config, DEFAULT_CONFIG_PATHS};
use garo_wallbox::driver::GaroDriver;
use garo_wallbox::web::{AppState, serve};
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let explicit = std::env::args().nth(1);
    let config = Config::load(explicit.as_deref()).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    garo_wallbox::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Garo Wallbox bridge {} starting up",
        env!("APP_VERSION")
    );

    // Accepted PUT /api/config bodies are written back to the file in use
    let config_path = explicit.map(PathBuf::from).or_else(|| {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    });

    let (web_host, web_port) = (config.web.host.clone(), config.web.port);
    let (mut driver, handle) = GaroDriver::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create driver: {}", e))?;

    let driver_task = tokio::spawn(async move { driver.run().await });

    let web_state = AppState {
        driver: handle.clone(),
        config_path,
    };
    let web_handle = handle.clone();
    let web_task = tokio::spawn(async move {
        let shutdown = async move {
            let mut state = web_handle.subscribe_snapshot();
            while state.changed().await.is_ok() {
                if state.borrow().driver_state == "ShuttingDown" {
                    break;
                }
            }
        };
        if let Err(e) = serve(web_state, &web_host, web_port, shutdown).await {
            error!("Web server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    handle.shutdown();

    let result = driver_task.await;
    // Open SSE streams can hold the server; do not wait on them forever
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), web_task).await;
    match result {
        Ok(Ok(())) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
        Err(e) => Err(anyhow::anyhow!("Driver task panicked: {}", e)),
    }
}
