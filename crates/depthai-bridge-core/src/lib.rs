//! This library bridges a DepthAI device pipeline to a
//! publish/subscribe bus. Packets polled from the device are
//! classified by stream, converted into a canonical frame layout and
//! published on one channel per stream, while a watchdog terminates the
//! process once the device stops producing packets.
//!
//! # Usage
//!
//! ```rust,no_run
//! use depthai_bridge_core::{
//!     Channel, Config, DispatchLoop, OutboundMessage, Publisher, SideChannel,
//!     SyntheticConnector,
//! };
//! use std::sync::Arc;
//!
//! struct StdoutPublisher;
//!
//! impl Publisher for StdoutPublisher {
//!     fn publish(&self, channel: Channel, message: OutboundMessage) -> eyre::Result<()> {
//!         println!("{channel}: {} bytes", message.len());
//!         Ok(())
//!     }
//! }
//!
//! struct StdoutSideChannel;
//!
//! impl SideChannel for StdoutSideChannel {
//!     fn register(&self, name: &str, value: String) -> eyre::Result<()> {
//!         println!("{name} = {value}");
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> eyre::Result<()> {
//! let config = Config::from_yaml(
//!     r#"
//! device:
//!   id: "stub://oak"
//! streams: [previewout, left, meta_d2h]
//! "#,
//! )?;
//!
//! let connector = SyntheticConnector::new(config.synthetic.clone());
//! let mut dispatch = DispatchLoop::new(
//!     config,
//!     connector,
//!     Arc::new(StdoutPublisher),
//!     StdoutSideChannel,
//! );
//!
//! // Blocks until the device goes silent.
//! let termination = dispatch.run();
//! std::process::exit(termination.exit_code());
//! # }
//! ```

pub mod codec;
pub mod config;
mod counters;
pub mod decoder;
mod dispatch;
pub mod pipeline;
mod publisher;
pub mod router;
pub mod sink;
mod stats;
pub mod synthetic;
mod tracklets;
pub mod types;
pub mod watchdog;

pub use codec::{CanonicalFrame, Layout};
pub use config::Config;
pub use counters::{CounterKey, StreamCounters};
pub use decoder::{DetectionDecoder, NnDecoder};
pub use dispatch::{
    Diagnostics, DispatchLoop, EXIT_PIPELINE_INIT, EXIT_WATCHDOG, LoopState, Termination,
};
pub use pipeline::{DeviceConnector, NnToDepthMapping, PacketBatch, Pipeline};
pub use publisher::{Channel, OutboundMessage, Publisher, SideChannel, nn2depth_key};
pub use router::{RouteOutcome, Router, SkipReason, StreamKind};
pub use sink::{FrameSink, Sinks};
pub use stats::{DispatchStats, StatsSnapshot};
pub use synthetic::SyntheticConnector;
pub use tracklets::TrackletHolder;
pub use watchdog::{Clock, MonotonicClock, Watchdog};
