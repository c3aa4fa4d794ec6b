//! depthai-bridge-node - ROS2 node publishing DepthAI camera streams.
//!
//! This crate provides the `depthai_publisher` node. It polls a DepthAI
//! device pipeline with the
//! [depthai-bridge-core](../depthai_bridge_core/index.html) dispatch loop
//! and publishes each configured stream on a topic suffixed with the
//! device id.
//!
//! # Configuration
//!
//! The node requires a YAML configuration file specifying:
//! - The device to open
//! - The streams to request from it
//! - Optional watchdog, NN decoding, sink and QoS settings
//!
//! See the `config/example.yaml` file for a complete example.
//!
//! # Exit Statuses
//!
//! - `3`: the device pipeline could not be created
//! - `10`: the device stopped producing packets for longer than the
//!   watchdog timeout

pub mod node;

pub use node::{DepthaiPublisherNode, run_diagnostics};

// Re-export the configuration for convenience
pub use depthai_bridge_ros2::depthai_bridge_core::Config;
