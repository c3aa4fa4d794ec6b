use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Camera assumed for packets which carry no metadata.
pub const DEFAULT_CAMERA: &str = "rgb";

/// Element type of a numeric payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    U8,
    U16,
    F16,
    F32,
}

impl Dtype {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::U16 | Dtype::F16 => 2,
            Dtype::F32 => 4,
        }
    }

    /// The numpy array-protocol type string, e.g. `"<u2"`.
    pub fn descr(self) -> &'static str {
        match self {
            Dtype::U8 => "|u1",
            Dtype::U16 => "<u2",
            Dtype::F16 => "<f2",
            Dtype::F32 => "<f4",
        }
    }

    /// Parse a numpy array-protocol type string. Only little-endian and
    /// byte-sized types are accepted since payload bytes are never swapped.
    pub fn from_descr(descr: &str) -> Option<Self> {
        let dtype = match descr {
            "|u1" | "<u1" | "u1" => Dtype::U8,
            "<u2" => Dtype::U16,
            "<f2" => Dtype::F16,
            "<f4" => Dtype::F32,
            _ => return None,
        };
        Some(dtype)
    }
}

/// A dense n-dimensional array as handed over by the device.
///
/// `data` holds the elements in row-major order of `shape`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArray {
    pub shape: Vec<usize>,
    pub dtype: Dtype,
    pub data: Vec<u8>,
}

impl RawArray {
    pub fn new(shape: Vec<usize>, dtype: Dtype, data: Vec<u8>) -> Self {
        Self { shape, dtype, data }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of bytes implied by the shape and dtype, or `None` on
    /// overflow.
    pub fn expected_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(self.dtype.size(), |acc, &dim| acc.checked_mul(dim))
    }
}

/// Per-packet metadata attached by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketMetadata {
    /// The physical camera that produced the packet, e.g. `"left"`.
    pub camera_name: String,

    /// Capture index of the frame on the device.
    pub sequence_num: u64,

    /// Device capture timestamp.
    pub timestamp: Duration,
}

impl PacketMetadata {
    pub fn new(camera_name: impl Into<String>, sequence_num: u64, timestamp: Duration) -> Self {
        Self {
            camera_name: camera_name.into(),
            sequence_num,
            timestamp,
        }
    }
}

/// The body of a data packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw image frame.
    Frame(RawArray),
    /// Already encoded image or video bitstream.
    Encoded(Vec<u8>),
    /// Device-to-host metadata rendered as text.
    Text(String),
    /// Object tracking results.
    Tracklets(TrackletSet),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Frame(_) => "frame",
            Payload::Encoded(_) => "encoded",
            Payload::Text(_) => "text",
            Payload::Tracklets(_) => "tracklets",
        }
    }
}

/// One unit of data retrieved from a data stream of the device pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream_name: String,
    pub metadata: Option<PacketMetadata>,
    /// `None` when the device delivered a packet without data.
    pub payload: Option<Payload>,
}

impl Packet {
    pub fn new(stream_name: impl Into<String>, payload: Payload) -> Self {
        Self {
            stream_name: stream_name.into(),
            metadata: None,
            payload: Some(payload),
        }
    }

    /// A packet which arrived without data.
    pub fn empty(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            metadata: None,
            payload: None,
        }
    }

    pub fn with_metadata(mut self, metadata: PacketMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The camera that produced the packet, falling back to
    /// [DEFAULT_CAMERA].
    pub fn camera(&self) -> &str {
        camera_of(self.metadata.as_ref())
    }
}

/// Axis-aligned box in normalized image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// One detection reported by the on-device network.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Spatial coordinates in meters when depth is enabled.
    pub depth: Option<[f32; 3]>,
}

/// A neural-network inference result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NnPacket {
    pub metadata: Option<PacketMetadata>,
    pub detections: Vec<Detection>,
}

impl NnPacket {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            metadata: None,
            detections,
        }
    }

    pub fn with_metadata(mut self, metadata: PacketMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn camera(&self) -> &str {
        camera_of(self.metadata.as_ref())
    }
}

fn camera_of(metadata: Option<&PacketMetadata>) -> &str {
    metadata
        .map(|meta| meta.camera_name.as_str())
        .unwrap_or(DEFAULT_CAMERA)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackletStatus {
    New,
    Tracked,
    Lost,
}

/// An object followed across frames by the on-device tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracklet {
    pub id: u32,
    pub label: u32,
    pub status: TrackletStatus,
    pub roi: BoundingBox,
}

/// All tracklets reported for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackletSet {
    pub sequence_num: u64,
    pub tracklets: Vec<Tracklet>,
}

impl TrackletSet {
    pub fn len(&self) -> usize {
        self.tracklets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracklets.is_empty()
    }
}
