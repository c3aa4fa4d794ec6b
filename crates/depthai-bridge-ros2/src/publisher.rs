//! Typed publishers for the bridge's output channels.
//!
//! This module provides [`Ros2PublisherManager`], which creates one
//! publisher per [`Channel`] at startup. Frame channels carry
//! `std_msgs/UInt8MultiArray` messages holding the serialized frame and
//! text channels carry `std_msgs/String`. Every topic name is the
//! channel's base name followed by the device suffix (e.g., `left1_1`).

use depthai_bridge_core::{Channel, OutboundMessage, Publisher as BridgePublisher};
use eyre::{Result, WrapErr, bail};
use indexmap::IndexMap;
use rclrs::{Node, Publisher, PublisherOptions, QoSProfile};
use std_msgs::msg::{String as StringMsg, UInt8MultiArray};
use tracing::info;

/// Publishers for all output channels of one device.
///
/// # Example
///
/// ```ignore
/// let manager = Ros2PublisherManager::new(&node, "1_1", QoSProfile::sensor_data_default())?;
///
/// // Later, from the dispatch loop
/// manager.publish(Channel::Left, OutboundMessage::Bytes(frame_bytes))?;
/// ```
pub struct Ros2PublisherManager {
    /// Publishers keyed by channel.
    publishers: IndexMap<Channel, PublisherEntry>,
}

/// Entry for a single publisher.
struct PublisherEntry {
    publisher: ChannelPublisher,
    topic: String,
}

enum ChannelPublisher {
    Bytes(Publisher<UInt8MultiArray>),
    Text(Publisher<StringMsg>),
}

impl Ros2PublisherManager {
    /// Create a publisher for every channel.
    ///
    /// # Errors
    ///
    /// Returns an error if publisher creation fails, e.g. because the
    /// device suffix yields an invalid topic name.
    pub fn new(node: &Node, device_suffix: &str, qos: QoSProfile) -> Result<Self> {
        let mut publishers = IndexMap::new();

        for channel in Channel::ALL {
            let topic = channel.topic(device_suffix);

            let mut options = PublisherOptions::new(&topic);
            options.qos = qos;

            let publisher = if channel.is_text() {
                node.create_publisher::<StringMsg>(options)
                    .map(ChannelPublisher::Text)
            } else {
                node.create_publisher::<UInt8MultiArray>(options)
                    .map(ChannelPublisher::Bytes)
            }
            .wrap_err_with(|| format!("Failed to create publisher for topic '{}'", topic))?;

            info!(
                channel = %channel,
                topic = %topic,
                "Created publisher"
            );

            publishers.insert(channel, PublisherEntry { publisher, topic });
        }

        Ok(Self { publishers })
    }

    /// Get the topic name of a channel.
    pub fn topic(&self, channel: Channel) -> Option<&str> {
        self.publishers.get(&channel).map(|e| e.topic.as_str())
    }

    /// Get the number of publishers.
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// Check if there are no publishers.
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl BridgePublisher for Ros2PublisherManager {
    fn publish(&self, channel: Channel, message: OutboundMessage) -> Result<()> {
        let entry = self
            .publishers
            .get(&channel)
            .ok_or_else(|| eyre::eyre!("No publisher registered for channel: {}", channel))?;

        match (&entry.publisher, message) {
            (ChannelPublisher::Bytes(publisher), OutboundMessage::Bytes(data)) => publisher
                .publish(UInt8MultiArray {
                    data,
                    ..Default::default()
                })
                .wrap_err_with(|| format!("Failed to publish to topic '{}'", entry.topic)),
            (ChannelPublisher::Text(publisher), OutboundMessage::Text(data)) => publisher
                .publish(StringMsg { data })
                .wrap_err_with(|| format!("Failed to publish to topic '{}'", entry.topic)),
            (_, message) => bail!(
                "Message of {} bytes does not match the type of topic '{}'",
                message.len(),
                entry.topic
            ),
        }
    }
}
