use depthai_bridge_core::{
    Channel, Clock, Config, DeviceConnector, NnToDepthMapping, OutboundMessage, PacketBatch,
    Pipeline, Publisher, SideChannel,
    config::DeviceConfig,
    types::{
        BoundingBox, Detection, Dtype, NnPacket, Packet, PacketMetadata, Payload, RawArray,
    },
};
use eyre::{Result, bail, eyre};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// A clock which only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// The poll results a [ScriptedPipeline] replays, shared with the test
/// so it can inspect what was not consumed.
pub type Script = Arc<Mutex<VecDeque<Result<PacketBatch>>>>;

/// Replays a script of poll results. Every poll advances the clock by
/// `step`; once the script is exhausted every poll is empty.
pub struct ScriptedPipeline {
    script: Script,
    clock: ManualClock,
    step: Duration,
    mapping: Option<NnToDepthMapping>,
}

impl ScriptedPipeline {
    pub fn new(clock: ManualClock, step: Duration) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            clock,
            step,
            mapping: Some(NnToDepthMapping {
                off_x: 40,
                off_y: 0,
                max_w: 560,
                max_h: 400,
            }),
        }
    }

    pub fn then_batch(self, batch: PacketBatch) -> Self {
        self.script.lock().unwrap().push_back(Ok(batch));
        self
    }

    pub fn then_empty(self, polls: usize) -> Self {
        for _ in 0..polls {
            self.script
                .lock()
                .unwrap()
                .push_back(Ok(PacketBatch::default()));
        }
        self
    }

    #[allow(dead_code)]
    pub fn then_error(self, polls: usize) -> Self {
        for _ in 0..polls {
            self.script
                .lock()
                .unwrap()
                .push_back(Err(eyre!("USB transfer failed")));
        }
        self
    }

    #[allow(dead_code)]
    pub fn without_mapping(mut self) -> Self {
        self.mapping = None;
        self
    }

    pub fn script(&self) -> Script {
        self.script.clone()
    }
}

impl Pipeline for ScriptedPipeline {
    fn poll_batch(&mut self, _blocking: bool) -> Result<PacketBatch> {
        self.clock.advance(self.step);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PacketBatch::default()))
    }

    fn nn_to_depth_mapping(&self) -> Result<NnToDepthMapping> {
        self.mapping
            .ok_or_else(|| eyre!("Mapping not supported by this pipeline"))
    }
}

/// Hands out one scripted pipeline, or fails like a missing device.
pub struct ScriptedConnector {
    pipeline: Option<ScriptedPipeline>,
}

impl ScriptedConnector {
    pub fn new(pipeline: ScriptedPipeline) -> Self {
        Self {
            pipeline: Some(pipeline),
        }
    }

    #[allow(dead_code)]
    pub fn failing() -> Self {
        Self { pipeline: None }
    }
}

impl DeviceConnector for ScriptedConnector {
    fn create_pipeline(
        &mut self,
        _device: &DeviceConfig,
        _streams: &[String],
    ) -> Result<Box<dyn Pipeline>> {
        match self.pipeline.take() {
            Some(pipeline) => Ok(Box::new(pipeline)),
            None => bail!("No DepthAI device found"),
        }
    }
}

/// Records every published message.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    messages: Arc<Mutex<Vec<(Channel, OutboundMessage)>>>,
    failing: Option<Channel>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher which rejects every message on `channel`.
    #[allow(dead_code)]
    pub fn failing_on(channel: Channel) -> Self {
        Self {
            failing: Some(channel),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<(Channel, OutboundMessage)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn on(&self, channel: Channel) -> Vec<OutboundMessage> {
        self.messages()
            .into_iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|(_, msg)| msg)
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, channel: Channel, message: OutboundMessage) -> Result<()> {
        if self.failing == Some(channel) {
            bail!("Transport rejected message on {channel}");
        }
        self.messages.lock().unwrap().push((channel, message));
        Ok(())
    }
}

/// Records every registered side-channel value.
#[derive(Debug, Clone, Default)]
pub struct RecordingSideChannel {
    values: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSideChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> Vec<(String, String)> {
        self.values.lock().unwrap().clone()
    }
}

impl SideChannel for RecordingSideChannel {
    fn register(&self, name: &str, value: String) -> Result<()> {
        self.values.lock().unwrap().push((name.to_string(), value));
        Ok(())
    }
}

pub fn config_with(device_id: &str, streams: &[&str], timeout: &str) -> Config {
    let yaml = format!(
        "device:\n  id: \"{}\"\nstreams: [{}]\nwatchdog:\n  timeout: {}\n",
        device_id,
        streams.join(", "),
        timeout
    );
    Config::from_yaml(&yaml).unwrap()
}

/// A `(H, W)` u8 frame filled with `value`.
pub fn mono_packet(stream: &str, camera: &str, value: u8) -> Packet {
    let frame = RawArray::new(vec![4, 6], Dtype::U8, vec![value; 24]);
    Packet::new(stream, Payload::Frame(frame))
        .with_metadata(PacketMetadata::new(camera, 0, Duration::ZERO))
}

/// A planar `(3, H, W)` preview frame.
#[allow(dead_code)]
pub fn preview_packet(stream: &str, camera: &str) -> Packet {
    let data = (0..3 * 2 * 3).map(|i| i as u8).collect();
    let frame = RawArray::new(vec![3, 2, 3], Dtype::U8, data);
    Packet::new(stream, Payload::Frame(frame))
        .with_metadata(PacketMetadata::new(camera, 0, Duration::ZERO))
}

pub fn nn_packet(camera: &str) -> NnPacket {
    NnPacket::new(vec![Detection {
        label: 1,
        confidence: 0.9,
        bbox: BoundingBox {
            x_min: 0.1,
            y_min: 0.1,
            x_max: 0.5,
            y_max: 0.5,
        },
        depth: None,
    }])
    .with_metadata(PacketMetadata::new(camera, 0, Duration::ZERO))
}
