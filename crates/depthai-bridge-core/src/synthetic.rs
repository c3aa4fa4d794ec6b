//! A synthetic device selected with `stub://` device ids.
//!
//! The synthetic pipeline produces well-formed packets for every
//! configured stream at a fixed rate, which lets the bridge run end to
//! end without camera hardware. Setting `stall_after` makes the device
//! go silent after a number of batches so the watchdog can be observed.

use crate::{
    config::{DeviceConfig, SyntheticConfig},
    pipeline::{DeviceConnector, NnToDepthMapping, PacketBatch, Pipeline},
    router::StreamKind,
    types::{
        BoundingBox, Detection, Dtype, NnPacket, Packet, PacketMetadata, Payload, RawArray,
        Tracklet, TrackletSet, TrackletStatus,
    },
};
use eyre::{Result, bail, ensure};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Device id prefix selecting the synthetic device.
pub const STUB_SCHEME: &str = "stub://";

/// Connects to the synthetic device. Any other device id is rejected.
#[derive(Debug, Clone, Default)]
pub struct SyntheticConnector {
    config: SyntheticConfig,
}

impl SyntheticConnector {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }
}

impl DeviceConnector for SyntheticConnector {
    fn create_pipeline(
        &mut self,
        device: &DeviceConfig,
        streams: &[String],
    ) -> Result<Box<dyn Pipeline>> {
        if !device.id.starts_with(STUB_SCHEME) {
            bail!(
                "Device '{}' requires a hardware backend; only {} devices are built in",
                device.id,
                STUB_SCHEME
            );
        }
        let pipeline = SyntheticPipeline::new(self.config.clone(), streams)?;
        info!(
            device = %device.id,
            streams = streams.len(),
            usb2_mode = device.usb2_mode,
            "Connected to synthetic device"
        );
        Ok(Box::new(pipeline))
    }
}

/// A pipeline generating packets for the requested streams.
#[derive(Debug)]
pub struct SyntheticPipeline {
    config: SyntheticConfig,
    streams: Vec<String>,
    started: Instant,
    batches: u64,
}

impl SyntheticPipeline {
    pub fn new(config: SyntheticConfig, streams: &[String]) -> Result<Self> {
        let [ph, pw] = config.preview_size;
        let [mh, mw] = config.mono_size;
        ensure!(ph > 0 && pw > 0, "Preview size must be non-zero");
        ensure!(mh > 0 && mw > 0, "Mono size must be non-zero");

        for name in streams {
            if StreamKind::classify(name).is_none() {
                warn!(stream = %name, "Synthetic device does not produce this stream");
            }
        }

        Ok(Self {
            config,
            streams: streams.to_vec(),
            started: Instant::now(),
            batches: 0,
        })
    }

    /// Number of batches produced so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    fn stalled(&self) -> bool {
        self.config
            .stall_after
            .is_some_and(|limit| self.batches >= limit)
    }

    fn generate(&self, seq: u64) -> PacketBatch {
        let timestamp = self.started.elapsed();
        let mut data_packets = Vec::new();

        for name in &self.streams {
            let Some(kind) = StreamKind::classify(name) else {
                continue;
            };

            match kind {
                StreamKind::Preview => {
                    for camera in &self.config.cameras {
                        let frame = self.preview_frame(seq);
                        data_packets.push(
                            Packet::new(name, Payload::Frame(frame))
                                .with_metadata(PacketMetadata::new(camera, seq, timestamp)),
                        );
                    }
                }
                StreamKind::Left | StreamKind::Right | StreamKind::Disparity => {
                    let frame = self.mono_frame(seq);
                    data_packets.push(
                        Packet::new(name, Payload::Frame(frame))
                            .with_metadata(PacketMetadata::new(mono_camera(kind), seq, timestamp)),
                    );
                }
                StreamKind::Depth => {
                    let frame = self.depth_frame(seq);
                    data_packets.push(
                        Packet::new(name, Payload::Frame(frame))
                            .with_metadata(PacketMetadata::new("right", seq, timestamp)),
                    );
                }
                StreamKind::DeviceToHost => {
                    let text = json!({
                        "sequence_num": seq,
                        "timestamp": timestamp.as_secs_f64(),
                        "sensors": {
                            "temperature": { "css": 42.0, "mss": 41.5, "upa0": 43.0, "upa1": 42.5 },
                        },
                    })
                    .to_string();
                    data_packets.push(Packet::new(name, Payload::Text(text)));
                }
                StreamKind::ObjectTracker => {
                    data_packets.push(Packet::new(name, Payload::Tracklets(tracklets(seq))));
                }
                StreamKind::JpegEncoded => {
                    data_packets.push(Packet::new(name, Payload::Encoded(jpeg_bytes(seq))));
                }
                StreamKind::Video => {
                    data_packets.push(Packet::new(name, Payload::Encoded(video_bytes(seq))));
                }
            }
        }

        let nn = NnPacket::new(vec![detection(seq)])
            .with_metadata(PacketMetadata::new(crate::types::DEFAULT_CAMERA, seq, timestamp));

        PacketBatch::new(vec![nn], data_packets)
    }

    /// A planar `(3, H, W)` frame with a distinct ramp per plane.
    fn preview_frame(&self, seq: u64) -> RawArray {
        let [h, w] = self.config.preview_size;
        let shift = seq as usize;
        let mut data = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    data.push(((x + y + shift) * (c + 1) % 256) as u8);
                }
            }
        }
        RawArray::new(vec![3, h, w], Dtype::U8, data)
    }

    fn mono_frame(&self, seq: u64) -> RawArray {
        let [h, w] = self.config.mono_size;
        let shift = seq as usize;
        let data = (0..h)
            .flat_map(|y| (0..w).map(move |x| ((x ^ y) + shift) as u8))
            .collect();
        RawArray::new(vec![h, w], Dtype::U8, data)
    }

    /// Depth in millimeters as little-endian `u16`.
    fn depth_frame(&self, seq: u64) -> RawArray {
        let [h, w] = self.config.mono_size;
        let base = 500 + (seq % 100) as u16 * 10;
        let data = (0..h)
            .flat_map(|y| (0..w).map(move |x| base.wrapping_add((x + y) as u16)))
            .flat_map(u16::to_le_bytes)
            .collect();
        RawArray::new(vec![h, w], Dtype::U16, data)
    }
}

impl Pipeline for SyntheticPipeline {
    fn poll_batch(&mut self, blocking: bool) -> Result<PacketBatch> {
        if blocking {
            std::thread::sleep(self.config.frame_interval);
        }

        if self.stalled() {
            debug!(batches = self.batches, "Synthetic device stalled");
            return Ok(PacketBatch::default());
        }

        let seq = self.batches;
        self.batches += 1;
        Ok(self.generate(seq))
    }

    fn nn_to_depth_mapping(&self) -> Result<NnToDepthMapping> {
        let [ph, pw] = self.config.preview_size;
        let [mh, mw] = self.config.mono_size;

        // The NN input keeps its aspect ratio and is centered in the depth
        // frame, using its full height when it fits.
        let full_height_w = mh * pw / ph;
        let (max_w, max_h) = if full_height_w <= mw {
            (full_height_w, mh)
        } else {
            (mw, mw * ph / pw)
        };

        Ok(NnToDepthMapping {
            off_x: to_u32((mw - max_w) / 2)?,
            off_y: to_u32((mh - max_h) / 2)?,
            max_w: to_u32(max_w)?,
            max_h: to_u32(max_h)?,
        })
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| eyre::eyre!("Frame dimension {value} exceeds u32"))
}

fn mono_camera(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Left => "left",
        _ => "right",
    }
}

fn detection(seq: u64) -> Detection {
    let offset = (seq % 50) as f32 / 100.0;
    Detection {
        label: 15,
        confidence: 0.9,
        bbox: BoundingBox {
            x_min: 0.1 + offset / 2.0,
            y_min: 0.2,
            x_max: 0.4 + offset / 2.0,
            y_max: 0.8,
        },
        depth: Some([offset - 0.125, 0.0, 1.5]),
    }
}

fn tracklets(seq: u64) -> TrackletSet {
    let status = if seq == 0 {
        TrackletStatus::New
    } else {
        TrackletStatus::Tracked
    };
    TrackletSet {
        sequence_num: seq,
        tracklets: vec![Tracklet {
            id: 0,
            label: 15,
            status,
            roi: detection(seq).bbox,
        }],
    }
}

/// A minimal JPEG-framed buffer: SOI marker, payload, EOI marker.
fn jpeg_bytes(seq: u64) -> Vec<u8> {
    let mut bytes = vec![0xff, 0xd8];
    bytes.extend_from_slice(&seq.to_be_bytes());
    bytes.extend_from_slice(&[0xff, 0xd9]);
    bytes
}

/// An Annex B framed access unit.
fn video_bytes(seq: u64) -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x01, 0x65];
    bytes.extend_from_slice(&seq.to_be_bytes());
    bytes
}
