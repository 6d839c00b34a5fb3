use hedgeflow::adapters::start_api_server_background;
use hedgeflow::bus::MessageBus;
use hedgeflow::cli::{render_config, render_report};
use hedgeflow::config::AppConfig;
use hedgeflow::coordinator::{analyze_once, Collaborators, TradingSystem};
use hedgeflow::error::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Long-running mode: bus + websocket server + supervisors until Ctrl-C
pub async fn run_service(config: AppConfig, autostart: bool) -> Result<()> {
    let collaborators = Collaborators::from_config(&config)?;
    let bus = Arc::new(MessageBus::new(config.bus.clone()));
    let system = Arc::new(TradingSystem::new(&config, Arc::clone(&bus), collaborators).await);

    let bus_task = bus.spawn()?;
    let mut server = start_api_server_background(
        Arc::clone(&system),
        config.server.host.clone(),
        config.server.port,
    )
    .await?;

    if autostart {
        system.start_all().await?;
    } else {
        info!("Agents idle; send {{\"type\":\"command\",\"action\":\"start\"}} over /ws");
    }

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
        res = &mut server => {
            match res {
                Ok(Ok(())) => warn!("API server exited"),
                Ok(Err(e)) => error!("API server failed: {}", e),
                Err(e) => error!("API server task panicked: {}", e),
            }
        }
    }

    system.stop_all().await;
    if let Err(e) = bus.stop().await {
        warn!("Bus did not drain cleanly: {}", e);
    }
    if let Err(e) = bus_task.await {
        error!("Bus task ended abnormally: {}", e);
    }
    server.abort();

    let executed = system.executor().stats().await;
    info!(
        "Shutdown complete: {} | decisions={} orders={} failed={}",
        bus.stats(),
        executed.decisions_seen,
        executed.orders_submitted,
        executed.orders_failed
    );
    Ok(())
}

/// One pipeline pass, printed to stdout
pub async fn run_analyze(config: AppConfig, show_reasoning: bool) -> Result<()> {
    let (start, end) = config.pipeline.date_window(chrono::Utc::now().date_naive());
    println!(
        "Analyzing {} from {} to {}...\n",
        config.pipeline.ticker, start, end
    );

    let collaborators = Collaborators::from_config(&config)?;
    let report = analyze_once(&config, collaborators).await?;
    print!("{}", render_report(&report, show_reasoning));
    Ok(())
}

pub fn show_config(config: &AppConfig) -> Result<()> {
    print!("{}", render_config(config)?);
    Ok(())
}
