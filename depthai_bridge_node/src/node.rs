//! DepthaiPublisherNode implementation.

use depthai_bridge_ros2::{
    Ros2ParameterChannel, Ros2PublisherManager,
    depthai_bridge_core::{
        Config, Diagnostics, DispatchLoop, SyntheticConnector,
        config::Reliability,
        sink::Sinks,
    },
};
use eyre::Result;
use rclrs::{Node, QoSHistoryPolicy, QoSProfile, QoSReliabilityPolicy};
use std::{sync::Arc, time::Duration};
use tracing::info;

/// The DepthAI publisher node.
///
/// This node opens the device pipeline, publishes every configured
/// stream on its own topic and exposes the NN-to-depth mapping as a
/// read-only parameter. The dispatch loop runs on a dedicated thread and
/// exits the process when the device fails.
pub struct DepthaiPublisherNode {
    dispatch: DispatchLoop,
    diagnostics: Diagnostics,
    stats_interval: Duration,
}

impl DepthaiPublisherNode {
    /// Create a new DepthaiPublisherNode with the given configuration.
    pub fn new(node: &Node, config: Config) -> Result<Self> {
        // Build QoS profile from config
        let qos = build_qos_profile(&config);

        let suffix = config.device.topic_suffix();
        let publishers = Ros2PublisherManager::new(node, &suffix, qos)?;

        info!(
            num_publishers = publishers.len(),
            device_suffix = %suffix,
            "Created publishers for output channels"
        );

        let side_channel = Ros2ParameterChannel::new(node.clone());
        let sinks = Sinks::open(&config.sinks)?;
        let connector = SyntheticConnector::new(config.synthetic.clone());
        let stats_interval = config.stats_interval;

        let dispatch = DispatchLoop::new(config, connector, Arc::new(publishers), side_channel)
            .with_sinks(sinks);
        let diagnostics = dispatch.diagnostics();

        Ok(Self {
            dispatch,
            diagnostics,
            stats_interval,
        })
    }

    /// Start the dispatch thread and return the handles the control
    /// plane reads from.
    pub fn start(self) -> Result<(Diagnostics, Duration)> {
        // The thread is detached: it ends by exiting the process.
        let _handle = self.dispatch.spawn()?;
        Ok((self.diagnostics, self.stats_interval))
    }
}

/// Periodically log stream counters and the cached tracklet count.
pub async fn run_diagnostics(diagnostics: Diagnostics, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let tracklets = diagnostics
            .tracklets
            .latest()
            .map(|set| set.len())
            .unwrap_or(0);

        info!(
            counters = ?diagnostics.counters.snapshot(),
            tracklets,
            "Stream counters"
        );
    }
}

/// Build a QoS profile from the configuration.
fn build_qos_profile(config: &Config) -> QoSProfile {
    let mut qos = QoSProfile::sensor_data_default();

    qos.history = QoSHistoryPolicy::KeepLast {
        depth: config.qos.history_depth as u32,
    };

    qos.reliability = match config.qos.reliability {
        Reliability::BestEffort => QoSReliabilityPolicy::BestEffort,
        Reliability::Reliable => QoSReliabilityPolicy::Reliable,
    };

    qos
}
