//! depthai_publisher node entry point.

use depthai_bridge_node::{Config, DepthaiPublisherNode, run_diagnostics};
use eyre::{Result, WrapErr, bail};
use rclrs::{Context, CreateBasicExecutor, RclrsErrorFilter, SpinOptions};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Initialize ROS2 context and executor
    let context = Context::default_from_env()
        .map_err(|e| eyre::eyre!("Failed to create ROS2 context: {}", e))?;
    let mut executor = context.create_basic_executor();

    // Create the node
    let node = executor
        .create_node("depthai_publisher")
        .map_err(|e| eyre::eyre!("Failed to create ROS2 node: {}", e))?;

    // Get config file path from parameter
    let config_file: Arc<str> = node
        .declare_parameter::<Arc<str>>("config_file")
        .mandatory()
        .map_err(|e| eyre::eyre!("Missing required parameter 'config_file': {}", e))?
        .get();

    if config_file.is_empty() {
        bail!(
            "Parameter 'config_file' is required.\n\
             Usage: ros2 run depthai_bridge_node depthai_publisher --ros-args -p config_file:=/path/to/config.yaml"
        );
    }

    info!(config_file = %config_file, "Loading configuration");

    // Load and validate configuration
    let mut config = Config::load(config_file.as_ref())?;

    // The device id parameter overrides the configuration file
    let device_id: Option<Arc<str>> = node
        .declare_parameter::<Arc<str>>("device_id")
        .optional()
        .map_err(|e| eyre::eyre!("Invalid parameter 'device_id': {}", e))?
        .get();

    if let Some(device_id) = device_id.filter(|id| !id.is_empty()) {
        config.device.id = device_id.to_string();
    }

    info!(
        device = %config.device.id,
        num_streams = config.streams.len(),
        watchdog_timeout = ?config.watchdog.timeout,
        "Configuration loaded"
    );

    // Create the publisher node and start the dispatch thread
    let publisher_node = DepthaiPublisherNode::new(&node, config)?;
    let (diagnostics, stats_interval) = publisher_node.start()?;

    // Create tokio runtime for the diagnostics task
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("Failed to create tokio runtime")?;

    let _diagnostics_handle = runtime.spawn(run_diagnostics(diagnostics, stats_interval));

    info!("depthai_publisher node started, spinning...");

    // Spin the ROS2 executor (this blocks and processes callbacks)
    // The dispatch thread exits the process on device failure
    executor
        .spin(SpinOptions::default())
        .first_error()
        .map_err(|e| eyre::eyre!("Error while spinning: {}", e))?;

    info!("depthai_publisher node shutting down");
    Ok(())
}
