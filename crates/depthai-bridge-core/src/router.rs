//! Classification and routing of data packets.
//!
//! A packet's stream name is classified once into a [StreamKind]. The
//! kind selects a [Route] which names the handler and its target, so no
//! string comparison happens past classification.

use crate::{
    codec::{self, Layout},
    counters::{CounterKey, StreamCounters},
    publisher::{Channel, OutboundMessage, Publisher},
    sink::Sinks,
    stats::DispatchStats,
    tracklets::TrackletHolder,
    types::{Packet, Payload},
};
use indexmap::IndexSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The known kinds of data streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Planar preview frames, fanned out across cameras.
    Preview,
    Left,
    Right,
    Disparity,
    /// Any stream whose name starts with `depth`.
    Depth,
    JpegEncoded,
    Video,
    DeviceToHost,
    ObjectTracker,
}

/// Where a packet of some kind is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Convert with the frame codec and publish.
    Frame { channel: Channel, layout: Layout },
    /// Publish as text.
    Text(Channel),
    /// Hand the encoded bytes to a sink.
    Sink(SinkSlot),
    /// Replace the cached tracklet set.
    Tracklets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSlot {
    Video,
    Jpeg,
}

impl StreamKind {
    /// Classify a device stream name.
    pub fn classify(stream_name: &str) -> Option<Self> {
        let kind = match stream_name {
            "previewout" | "preview" => StreamKind::Preview,
            "left" => StreamKind::Left,
            "right" => StreamKind::Right,
            "disparity" => StreamKind::Disparity,
            "jpegout" => StreamKind::JpegEncoded,
            "video" => StreamKind::Video,
            "meta_d2h" => StreamKind::DeviceToHost,
            "object_tracker" => StreamKind::ObjectTracker,
            name if name.starts_with("depth") => StreamKind::Depth,
            _ => return None,
        };
        Some(kind)
    }

    pub fn route(self) -> Route {
        use Layout::*;

        match self {
            StreamKind::Preview => Route::Frame {
                channel: Channel::Preview,
                layout: Planar,
            },
            StreamKind::Left => Route::Frame {
                channel: Channel::Left,
                layout: Interleaved,
            },
            StreamKind::Right => Route::Frame {
                channel: Channel::Right,
                layout: Interleaved,
            },
            StreamKind::Disparity => Route::Frame {
                channel: Channel::Disparity,
                layout: Interleaved,
            },
            StreamKind::Depth => Route::Frame {
                channel: Channel::Depth,
                layout: Interleaved,
            },
            StreamKind::JpegEncoded => Route::Sink(SinkSlot::Jpeg),
            StreamKind::Video => Route::Sink(SinkSlot::Video),
            StreamKind::DeviceToHost => Route::Text(Channel::DeviceToHost),
            StreamKind::ObjectTracker => Route::Tracklets,
        }
    }

    /// True for kinds whose counters are qualified by camera.
    pub fn is_camera_qualified(self) -> bool {
        matches!(self, StreamKind::Preview)
    }

    /// The counter a packet of this kind is accounted under.
    pub fn counter_key(self, packet: &Packet) -> CounterKey {
        if self.is_camera_qualified() {
            CounterKey::camera(&packet.stream_name, packet.camera())
        } else {
            CounterKey::stream(&packet.stream_name)
        }
    }
}

/// Why a packet was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Configured stream which no handler understands.
    UnknownStream,
    MissingPayload,
    /// The payload variant does not fit the stream kind.
    PayloadMismatch,
    /// The frame codec rejected the payload.
    Decode,
    Publish,
    Sink,
    NoSink,
}

/// The result of routing one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Routed(CounterKey),
    /// The stream is not configured; nothing was logged or counted.
    Ignored,
    Skipped(SkipReason),
}

/// Routes data packets to channels, sinks and the tracklet holder.
pub struct Router {
    streams: IndexSet<String>,
    publisher: Arc<dyn Publisher>,
    sinks: Sinks,
    counters: StreamCounters,
    tracklets: TrackletHolder,
    stats: Arc<DispatchStats>,
}

impl Router {
    pub fn new(
        streams: impl IntoIterator<Item = String>,
        publisher: Arc<dyn Publisher>,
        sinks: Sinks,
        counters: StreamCounters,
        tracklets: TrackletHolder,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            streams: streams.into_iter().collect(),
            publisher,
            sinks,
            counters,
            tracklets,
            stats,
        }
    }

    pub fn counters(&self) -> &StreamCounters {
        &self.counters
    }

    pub fn tracklets(&self) -> &TrackletHolder {
        &self.tracklets
    }

    /// Route one packet and account for the outcome.
    pub fn route(&mut self, packet: Packet) -> RouteOutcome {
        if !self.streams.contains(&packet.stream_name) {
            // Streams added by the device on its own are expected.
            DispatchStats::bump(&self.stats.ignored);
            return RouteOutcome::Ignored;
        }

        let Some(kind) = StreamKind::classify(&packet.stream_name) else {
            debug!(stream = %packet.stream_name, "No handler for stream, packet skipped");
            return self.skip(SkipReason::UnknownStream);
        };

        let key = kind.counter_key(&packet);
        let Some(payload) = packet.payload else {
            warn!(stream = %packet.stream_name, "Invalid packet data, packet skipped");
            return self.skip(SkipReason::MissingPayload);
        };

        let result = match kind.route() {
            Route::Frame { channel, layout } => self.publish_frame(channel, layout, payload),
            Route::Text(channel) => self.publish_text(channel, payload),
            Route::Sink(slot) => self.write_sink(slot, payload),
            Route::Tracklets => self.cache_tracklets(payload),
        };

        match result {
            Ok(()) => {
                let count = self.counters.increment(&key);
                DispatchStats::bump(&self.stats.routed);
                trace!(key = %key, count, "Packet routed");
                RouteOutcome::Routed(key)
            }
            Err(reason) => {
                debug!(key = %key, reason = ?reason, "Packet skipped");
                self.skip(reason)
            }
        }
    }

    fn skip(&self, reason: SkipReason) -> RouteOutcome {
        let counter = match reason {
            SkipReason::UnknownStream => &self.stats.unknown_streams,
            SkipReason::MissingPayload => &self.stats.missing_payloads,
            SkipReason::PayloadMismatch => &self.stats.payload_mismatches,
            SkipReason::Decode => &self.stats.decode_errors,
            SkipReason::Publish => &self.stats.publish_errors,
            SkipReason::Sink => &self.stats.sink_errors,
            SkipReason::NoSink => &self.stats.sink_missing,
        };
        DispatchStats::bump(counter);
        RouteOutcome::Skipped(reason)
    }

    fn publish_frame(
        &self,
        channel: Channel,
        layout: Layout,
        payload: Payload,
    ) -> Result<(), SkipReason> {
        let array = match payload {
            Payload::Frame(array) => array,
            other => {
                warn!(channel = %channel, payload = other.kind(), "Expected a frame payload");
                return Err(SkipReason::PayloadMismatch);
            }
        };

        let bytes = codec::to_canonical(array, layout)
            .and_then(|frame| codec::serialize(&frame))
            .map_err(|err| {
                warn!(channel = %channel, error = %err, "Failed to convert frame");
                SkipReason::Decode
            })?;

        self.send(channel, OutboundMessage::Bytes(bytes))
    }

    fn publish_text(&self, channel: Channel, payload: Payload) -> Result<(), SkipReason> {
        let text = match payload {
            Payload::Text(text) => text,
            Payload::Encoded(bytes) => String::from_utf8(bytes).map_err(|err| {
                warn!(channel = %channel, error = %err, "Metadata is not valid UTF-8");
                SkipReason::PayloadMismatch
            })?,
            other => {
                warn!(channel = %channel, payload = other.kind(), "Expected a text payload");
                return Err(SkipReason::PayloadMismatch);
            }
        };

        self.send(channel, OutboundMessage::Text(text))
    }

    fn write_sink(&mut self, slot: SinkSlot, payload: Payload) -> Result<(), SkipReason> {
        let bytes = match payload {
            Payload::Encoded(bytes) => bytes,
            other => {
                warn!(sink = ?slot, payload = other.kind(), "Expected an encoded payload");
                return Err(SkipReason::PayloadMismatch);
            }
        };

        let sink = match slot {
            SinkSlot::Video => self.sinks.video.as_mut(),
            SinkSlot::Jpeg => self.sinks.jpeg.as_mut(),
        };
        let Some(sink) = sink else {
            return Err(SkipReason::NoSink);
        };

        sink.write(&bytes).map_err(|err| {
            warn!(sink = ?slot, error = %err, "Failed to write to sink");
            SkipReason::Sink
        })
    }

    fn cache_tracklets(&self, payload: Payload) -> Result<(), SkipReason> {
        match payload {
            Payload::Tracklets(tracklets) => {
                trace!(count = tracklets.len(), "Caching tracklets");
                self.tracklets.replace(tracklets);
                Ok(())
            }
            other => {
                warn!(payload = other.kind(), "Expected a tracklet payload");
                Err(SkipReason::PayloadMismatch)
            }
        }
    }

    fn send(&self, channel: Channel, message: OutboundMessage) -> Result<(), SkipReason> {
        self.publisher.publish(channel, message).map_err(|err| {
            warn!(channel = %channel, error = %err, "Failed to publish");
            SkipReason::Publish
        })
    }
}
