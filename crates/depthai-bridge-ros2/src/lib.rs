//! ROS2 transport for the DepthAI bridge.
//!
//! This crate connects [depthai-bridge-core](../depthai_bridge_core/index.html)
//! to a ROS2 node:
//!
//! - [`Ros2PublisherManager`]: one typed publisher per output channel,
//!   implementing the core `Publisher` trait
//! - [`Ros2ParameterChannel`]: the side channel, exposing registered
//!   values as read-only node parameters

pub mod parameter;
pub mod publisher;

pub use parameter::Ros2ParameterChannel;
pub use publisher::Ros2PublisherManager;

// Re-export depthai-bridge-core for convenience
pub use depthai_bridge_core;
