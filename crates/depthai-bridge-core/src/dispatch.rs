//! The packet dispatch loop.
//!
//! The loop owns the device pipeline and the watchdog. It polls the
//! pipeline, feeds the watchdog, decodes and publishes NN results and
//! routes data packets until the pipeline fails to open or goes silent.
//! Both outcomes terminate the process with distinct exit statuses.

use crate::{
    config::Config,
    counters::{CounterKey, StreamCounters},
    decoder::{DetectionDecoder, NnDecoder},
    pipeline::{DeviceConnector, PacketBatch, Pipeline},
    publisher::{Channel, OutboundMessage, Publisher, SideChannel, nn2depth_key},
    router::Router,
    sink::Sinks,
    stats::DispatchStats,
    tracklets::TrackletHolder,
    types::NnPacket,
    watchdog::{Clock, MonotonicClock, Verdict, Watchdog},
};
use eyre::{Result, WrapErr};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, error, info, warn};

/// Exit status when the device pipeline cannot be created.
pub const EXIT_PIPELINE_INIT: i32 = 3;

/// Exit status when the watchdog expires.
pub const EXIT_WATCHDOG: i32 = 10;

/// Counter of NN results, qualified by camera.
const NN_COUNTER: &str = "nn";

/// Counter of all NN results regardless of camera.
const METAOUT_COUNTER: &str = "metaout";

/// Why the dispatch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    PipelineInit,
    Watchdog,
}

impl Termination {
    pub fn exit_code(self) -> i32 {
        match self {
            Termination::PipelineInit => EXIT_PIPELINE_INIT,
            Termination::Watchdog => EXIT_WATCHDOG,
        }
    }
}

/// Lifecycle of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    TerminatedWatchdog,
    TerminatedFatal,
}

/// Handles to the state shared with the control plane.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub counters: StreamCounters,
    pub tracklets: TrackletHolder,
    pub stats: Arc<DispatchStats>,
}

/// Polls the device pipeline and dispatches its packets.
pub struct DispatchLoop {
    config: Config,
    connector: Box<dyn DeviceConnector>,
    publisher: Arc<dyn Publisher>,
    side_channel: Box<dyn SideChannel>,
    decoder: Box<dyn NnDecoder>,
    clock: Arc<dyn Clock>,
    sinks: Sinks,
    diagnostics: Diagnostics,
    state: LoopState,
}

impl DispatchLoop {
    /// Create a loop using the [DetectionDecoder], the monotonic clock
    /// and no sinks.
    pub fn new(
        config: Config,
        connector: impl DeviceConnector + 'static,
        publisher: Arc<dyn Publisher>,
        side_channel: impl SideChannel + 'static,
    ) -> Self {
        Self {
            config,
            connector: Box::new(connector),
            publisher,
            side_channel: Box::new(side_channel),
            decoder: Box::new(DetectionDecoder),
            clock: Arc::new(MonotonicClock),
            sinks: Sinks::default(),
            diagnostics: Diagnostics::default(),
            state: LoopState::Initializing,
        }
    }

    pub fn with_decoder(mut self, decoder: impl NnDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sinks(mut self, sinks: Sinks) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run the loop on a dedicated thread which exits the process with
    /// the termination's exit status.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("depthai-dispatch".to_string())
            .spawn(move || {
                let mut dispatch = self;
                let termination = dispatch.run();
                std::process::exit(termination.exit_code());
            })
            .wrap_err("Failed to spawn dispatch thread")
    }

    /// Run until the pipeline fails to open or the watchdog expires.
    pub fn run(&mut self) -> Termination {
        self.state = LoopState::Initializing;

        let streams = self.config.stream_names();
        info!(
            device = %self.config.device.id,
            streams = ?streams,
            "Creating device pipeline"
        );

        let mut pipeline = match self
            .connector
            .create_pipeline(&self.config.device, &streams)
        {
            Ok(pipeline) => pipeline,
            Err(err) => {
                error!(error = ?err, "Failed to create device pipeline");
                self.state = LoopState::TerminatedFatal;
                return Termination::PipelineInit;
            }
        };

        self.register_mapping(&*pipeline);

        let mut router = Router::new(
            streams,
            self.publisher.clone(),
            std::mem::take(&mut self.sinks),
            self.diagnostics.counters.clone(),
            self.diagnostics.tracklets.clone(),
            self.diagnostics.stats.clone(),
        );

        let start = self.clock.now();
        let mut watchdog = Watchdog::new(self.config.watchdog.timeout, start);
        let mut last_stats_log = start;

        self.state = LoopState::Running;
        info!(
            watchdog_timeout = ?watchdog.timeout(),
            "Starting packet dispatch loop"
        );

        loop {
            let batch = self.poll(&mut *pipeline);
            let now = self.clock.now();

            if watchdog.observe(batch.len(), now) == Verdict::Expired {
                error!(
                    timeout = ?watchdog.timeout(),
                    "Watchdog expired, no packets received from the device"
                );
                self.log_stats();
                self.state = LoopState::TerminatedWatchdog;
                return Termination::Watchdog;
            }

            for packet in batch.nn_packets {
                self.handle_nn(packet);
            }

            for packet in batch.data_packets {
                DispatchStats::bump(&self.diagnostics.stats.data_packets);
                router.route(packet);
            }

            // Periodically log statistics
            if now.saturating_duration_since(last_stats_log) >= self.config.stats_interval {
                self.log_stats();
                last_stats_log = now;
            }
        }
    }

    /// Poll once. A failed poll counts as an empty batch so a persistently
    /// failing device ends in a watchdog expiry.
    fn poll(&self, pipeline: &mut dyn Pipeline) -> PacketBatch {
        let stats = &self.diagnostics.stats;
        DispatchStats::bump(&stats.polls);

        let batch = match pipeline.poll_batch(true) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "Failed to poll device pipeline");
                DispatchStats::bump(&stats.poll_errors);
                PacketBatch::default()
            }
        };

        if batch.is_empty() {
            DispatchStats::bump(&stats.empty_polls);
        }
        batch
    }

    fn register_mapping(&self, pipeline: &dyn Pipeline) {
        let key = nn2depth_key(&self.config.device.topic_suffix());

        let result = pipeline
            .nn_to_depth_mapping()
            .and_then(|mapping| {
                serde_json::to_string(&mapping).wrap_err("Failed to encode NN to depth mapping")
            })
            .and_then(|json| {
                debug!(key = %key, mapping = %json, "Registering NN to depth mapping");
                self.side_channel.register(&key, json)
            });

        match result {
            Ok(()) => info!(key = %key, "Registered NN to depth mapping"),
            Err(err) => warn!(key = %key, error = %err, "NN to depth mapping unavailable"),
        }
    }

    fn handle_nn(&self, packet: NnPacket) {
        let stats = &self.diagnostics.stats;
        DispatchStats::bump(&stats.nn_packets);

        let text = match self.decoder.decode(&packet, &self.config.nn) {
            Ok(text) => text,
            Err(err) => {
                warn!(camera = %packet.camera(), error = %err, "Failed to decode NN packet");
                DispatchStats::bump(&stats.decoder_errors);
                return;
            }
        };

        if let Err(err) = self
            .publisher
            .publish(Channel::NnResult, OutboundMessage::Text(text))
        {
            warn!(error = %err, "Failed to publish NN result");
            DispatchStats::bump(&stats.publish_errors);
            return;
        }

        DispatchStats::bump(&stats.nn_published);
        let counters = &self.diagnostics.counters;
        counters.increment(&CounterKey::camera(NN_COUNTER, packet.camera()));
        counters.increment(&CounterKey::stream(METAOUT_COUNTER));
    }

    fn log_stats(&self) {
        let stats = self.diagnostics.stats.snapshot();
        info!(
            polls = stats.polls,
            empty_polls = stats.empty_polls,
            poll_errors = stats.poll_errors,
            nn_published = stats.nn_published,
            routed = stats.routed,
            skipped = stats.skipped(),
            ignored = stats.ignored,
            counters = ?self.diagnostics.counters.snapshot(),
            "Dispatch statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        assert_eq!(Termination::PipelineInit.exit_code(), 3);
        assert_eq!(Termination::Watchdog.exit_code(), 10);
    }
}
