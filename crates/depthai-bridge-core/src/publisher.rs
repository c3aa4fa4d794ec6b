//! Output side of the bridge: channels, messages and the publishing seam.

use eyre::Result;
use std::fmt;

/// A logical output channel. Each channel maps to exactly one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Preview,
    Left,
    Right,
    Disparity,
    Depth,
    /// Device-to-host metadata text.
    DeviceToHost,
    /// Decoded neural-network results.
    NnResult,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Preview,
        Channel::Left,
        Channel::Right,
        Channel::Disparity,
        Channel::Depth,
        Channel::DeviceToHost,
        Channel::NnResult,
    ];

    /// Topic name before the device suffix is appended.
    pub fn topic_base(self) -> &'static str {
        match self {
            Channel::Preview => "preview",
            Channel::Left => "left",
            Channel::Right => "right",
            Channel::Disparity => "disparity",
            Channel::Depth => "depth",
            Channel::DeviceToHost => "d2h",
            Channel::NnResult => "meta",
        }
    }

    /// Full topic name for a device, e.g. `preview14442C10`.
    pub fn topic(self, device_suffix: &str) -> String {
        format!("{}{}", self.topic_base(), device_suffix)
    }

    /// True for channels carrying [OutboundMessage::Text].
    pub fn is_text(self) -> bool {
        matches!(self, Channel::DeviceToHost | Channel::NnResult)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_base())
    }
}

/// A ready-to-send message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Serialized frame bytes, sent as an integer array.
    Bytes(Vec<u8>),
    Text(String),
}

impl OutboundMessage {
    pub fn len(&self) -> usize {
        match self {
            OutboundMessage::Bytes(bytes) => bytes.len(),
            OutboundMessage::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fan-out to the publish/subscribe bus.
///
/// Publishing is fire-and-forget. An error only reports a local failure
/// to hand the message to the transport.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: Channel, message: OutboundMessage) -> Result<()>;
}

/// Store for named values published once at startup, such as the
/// NN-to-depth mapping.
pub trait SideChannel: Send {
    fn register(&self, name: &str, value: String) -> Result<()>;
}

/// Name under which the NN-to-depth mapping is registered for a device.
pub fn nn2depth_key(device_suffix: &str) -> String {
    format!("nn2depth{device_suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(Channel::Preview.topic("1_1"), "preview1_1");
        assert_eq!(Channel::DeviceToHost.topic(""), "d2h");
        assert_eq!(Channel::NnResult.topic("abc"), "metaabc");
    }

    #[test]
    fn test_text_channels() {
        let text: Vec<_> = Channel::ALL.into_iter().filter(|c| c.is_text()).collect();
        assert_eq!(text, vec![Channel::DeviceToHost, Channel::NnResult]);
    }

    #[test]
    fn test_nn2depth_key() {
        assert_eq!(nn2depth_key("1_1"), "nn2depth1_1");
    }
}
