//! Neural-network result decoding.
//!
//! The decoding algorithm depends on the network loaded on the device,
//! so it is a strategy injected into the dispatch loop. [DetectionDecoder]
//! covers the common case of networks whose results are already parsed
//! into detections on the device.

use crate::{config::NnConfig, types::NnPacket};
use eyre::{Result, WrapErr};
use serde::Serialize;

/// Turns an inference result into the text published on the result
/// channel.
pub trait NnDecoder: Send {
    fn decode(&self, packet: &NnPacket, config: &NnConfig) -> Result<String>;
}

impl<F> NnDecoder for F
where
    F: Fn(&NnPacket, &NnConfig) -> Result<String> + Send,
{
    fn decode(&self, packet: &NnPacket, config: &NnConfig) -> Result<String> {
        self(packet, config)
    }
}

/// Emits a JSON array of detections above the confidence threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionDecoder;

#[derive(Debug, Serialize)]
struct DecodedDetection<'a> {
    label: &'a str,
    label_id: u32,
    confidence: f32,
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth_z: Option<f32>,
}

impl NnDecoder for DetectionDecoder {
    fn decode(&self, packet: &NnPacket, config: &NnConfig) -> Result<String> {
        let unnamed: Vec<String> = packet
            .detections
            .iter()
            .map(|det| det.label.to_string())
            .collect();

        let entries: Vec<_> = packet
            .detections
            .iter()
            .zip(&unnamed)
            .filter(|(det, _)| det.confidence >= config.confidence_threshold)
            .map(|(det, fallback)| {
                let label = config
                    .labels
                    .get(det.label as usize)
                    .map(String::as_str)
                    .unwrap_or(fallback);

                DecodedDetection {
                    label,
                    label_id: det.label,
                    confidence: det.confidence,
                    x_min: det.bbox.x_min,
                    y_min: det.bbox.y_min,
                    x_max: det.bbox.x_max,
                    y_max: det.bbox.y_max,
                    depth_x: det.depth.map(|d| d[0]),
                    depth_y: det.depth.map(|d| d[1]),
                    depth_z: det.depth.map(|d| d[2]),
                }
            })
            .collect();

        serde_json::to_string(&entries).wrap_err("Failed to encode detections")
    }
}
