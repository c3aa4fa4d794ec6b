use std::sync::atomic::{AtomicU64, Ordering};

/// Running statistics of the dispatch loop.
///
/// Every skipped packet is accounted for under the reason it was
/// dropped, so skips stay observable even though they never stop the
/// loop.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub(crate) polls: AtomicU64,
    pub(crate) empty_polls: AtomicU64,
    pub(crate) poll_errors: AtomicU64,
    pub(crate) nn_packets: AtomicU64,
    pub(crate) nn_published: AtomicU64,
    pub(crate) decoder_errors: AtomicU64,
    pub(crate) data_packets: AtomicU64,
    pub(crate) routed: AtomicU64,
    pub(crate) ignored: AtomicU64,
    pub(crate) unknown_streams: AtomicU64,
    pub(crate) missing_payloads: AtomicU64,
    pub(crate) payload_mismatches: AtomicU64,
    pub(crate) decode_errors: AtomicU64,
    pub(crate) publish_errors: AtomicU64,
    pub(crate) sink_errors: AtomicU64,
    pub(crate) sink_missing: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            polls: load(&self.polls),
            empty_polls: load(&self.empty_polls),
            poll_errors: load(&self.poll_errors),
            nn_packets: load(&self.nn_packets),
            nn_published: load(&self.nn_published),
            decoder_errors: load(&self.decoder_errors),
            data_packets: load(&self.data_packets),
            routed: load(&self.routed),
            ignored: load(&self.ignored),
            unknown_streams: load(&self.unknown_streams),
            missing_payloads: load(&self.missing_payloads),
            payload_mismatches: load(&self.payload_mismatches),
            decode_errors: load(&self.decode_errors),
            publish_errors: load(&self.publish_errors),
            sink_errors: load(&self.sink_errors),
            sink_missing: load(&self.sink_missing),
        }
    }
}

/// A point-in-time copy of [DispatchStats].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Number of pipeline polls.
    pub polls: u64,
    /// Polls which returned no packet at all.
    pub empty_polls: u64,
    /// Polls which failed and were treated as empty.
    pub poll_errors: u64,
    pub nn_packets: u64,
    /// NN results decoded and handed to the bus.
    pub nn_published: u64,
    pub decoder_errors: u64,
    pub data_packets: u64,
    /// Data packets delivered to a channel, sink or holder.
    pub routed: u64,
    /// Packets of streams outside the configured list.
    pub ignored: u64,
    pub unknown_streams: u64,
    pub missing_payloads: u64,
    /// Payload variant does not fit the stream kind.
    pub payload_mismatches: u64,
    /// Frames rejected by the codec.
    pub decode_errors: u64,
    pub publish_errors: u64,
    pub sink_errors: u64,
    /// Encoded packets with no sink configured for them.
    pub sink_missing: u64,
}

impl StatsSnapshot {
    /// Total data packets dropped for any reason other than not being
    /// configured.
    pub fn skipped(&self) -> u64 {
        self.unknown_streams
            + self.missing_payloads
            + self.payload_mismatches
            + self.decode_errors
            + self.publish_errors
            + self.sink_errors
            + self.sink_missing
    }
}
