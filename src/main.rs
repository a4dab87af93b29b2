use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use navi_coordinator::adapters::inbound::JsonLinesCommandReader;
use navi_coordinator::adapters::outbound::{
    init_combined_logger, BufferedLogger, FileEventJournal, FilesystemMapService, JsonLinesPublisher, SimulatedRobot, TracingLogger,
};
use navi_coordinator::application::NavigationService;
use navi_coordinator::domains::navigation::CoordinatorPorts;
use navi_coordinator::{Config, DynLogger};

const DEFAULT_CONFIG_PATH: &str = "navi.toml";
const SIMULATED_LINEAR_SPEED: f64 = 0.3;
const DOMAIN_LOG_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = if Path::new(&config_path).exists() {
        Config::from_file(&config_path).await?
    } else {
        Config::default()
    };

    // fast_log has to claim the `log` facade before tracing-subscriber tries to.
    let logger: DynLogger = match &config.logging.domain_log_file {
        Some(path) => init_combined_logger(path, &config.robot.entity_id),
        None => Arc::new(TracingLogger::new(&config.robot.entity_id)),
    };
    let logger: DynLogger = Arc::new(BufferedLogger::spawn(logger, DOMAIN_LOG_CAPACITY));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();

    info!("Starting navigation coordinator for {}", config.robot.entity_id);
    info!("Configuration source: {}", config_path);

    let robot = Arc::new(SimulatedRobot::new(config.robot.initial_pose, SIMULATED_LINEAR_SPEED));
    let ports = CoordinatorPorts {
        pose: robot.clone(),
        motion: robot.clone(),
        engine: robot,
        maps: Arc::new(FilesystemMapService::new(
            config.acquisition.map_data_dir.clone(),
            &config.acquisition.location,
        )),
        publisher: Arc::new(JsonLinesPublisher::new(tokio::io::stdout())),
    };

    let mut service = NavigationService::new(config.clone(), ports, logger);
    if let Some(dir) = &config.logging.event_journal_dir {
        service = service.with_journal(Arc::new(FileEventJournal::new(dir)));
    }
    let (handle, task) = service.start().await;

    let reader = JsonLinesCommandReader::new(BufReader::new(tokio::io::stdin()));
    tokio::select! {
        forwarded = reader.run(handle.clone()) => {
            match forwarded {
                Ok(count) => info!("Command input closed after {} messages", count),
                Err(e) => warn!("Command input failed: {}", e),
            }
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!("Shutting down navigation coordinator");
    if let Err(e) = handle.shutdown().await {
        warn!("Coordinator already stopped: {}", e);
    }
    let coordinator = task.await?;
    info!("Coordinator stopped in {} mode", coordinator.mode());
    Ok(())
}
