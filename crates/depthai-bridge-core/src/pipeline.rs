//! The device SDK boundary.
//!
//! The bridge only needs to open a pipeline and poll it for batches of
//! packets. Hardware bindings implement [DeviceConnector] and
//! [Pipeline]; the crate itself ships the synthetic device in
//! [crate::synthetic].

use crate::{
    config::DeviceConfig,
    types::{NnPacket, Packet},
};
use eyre::Result;
use serde::{Deserialize, Serialize};

/// Everything returned by one poll of the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketBatch {
    pub nn_packets: Vec<NnPacket>,
    pub data_packets: Vec<Packet>,
}

impl PacketBatch {
    pub fn new(nn_packets: Vec<NnPacket>, data_packets: Vec<Packet>) -> Self {
        Self {
            nn_packets,
            data_packets,
        }
    }

    /// Total number of packets of both kinds.
    pub fn len(&self) -> usize {
        self.nn_packets.len() + self.data_packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Placement of the NN input window inside the depth frame, used by
/// clients to project detections onto depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NnToDepthMapping {
    pub off_x: u32,
    pub off_y: u32,
    pub max_w: u32,
    pub max_h: u32,
}

/// A running device pipeline.
pub trait Pipeline: Send {
    /// Retrieve the packets available since the previous poll.
    ///
    /// With `blocking` set, the call waits until the device has data or
    /// reports that nothing is pending.
    fn poll_batch(&mut self, blocking: bool) -> Result<PacketBatch>;

    fn nn_to_depth_mapping(&self) -> Result<NnToDepthMapping>;
}

/// Opens device pipelines.
pub trait DeviceConnector: Send {
    /// Connect to the device and start a pipeline producing `streams`.
    fn create_pipeline(
        &mut self,
        device: &DeviceConfig,
        streams: &[String],
    ) -> Result<Box<dyn Pipeline>>;
}
