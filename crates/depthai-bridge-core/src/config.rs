//! Configuration parsing and validation for the bridge.

use crate::watchdog::DEFAULT_WATCHDOG_TIMEOUT;
use eyre::{Result, WrapErr, bail, ensure};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Device selection.
    pub device: DeviceConfig,

    /// Streams requested from the device. Packets of other streams are
    /// ignored.
    pub streams: Vec<String>,

    /// Liveness watchdog.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Neural-network decoding options.
    #[serde(default)]
    pub nn: NnConfig,

    /// Optional sinks for encoded streams.
    #[serde(default)]
    pub sinks: SinkConfig,

    /// Optional QoS configuration.
    #[serde(default)]
    pub qos: QosConfig,

    /// Settings of the synthetic `stub://` device.
    #[serde(default)]
    pub synthetic: SyntheticConfig,

    /// Interval between statistics log lines.
    #[serde(default = "default_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.streams.is_empty(),
            "At least one stream is required"
        );

        for (i, stream) in self.streams.iter().enumerate() {
            ensure!(
                !stream.is_empty(),
                "Stream name at index {} cannot be empty",
                i
            );
        }

        // Check for duplicate streams
        let mut names: Vec<&str> = self.streams.iter().map(String::as_str).collect();
        names.sort_unstable();
        for window in names.windows(2) {
            if window[0] == window[1] {
                bail!("Duplicate stream: {}", window[0]);
            }
        }

        ensure!(
            !self.watchdog.timeout.is_zero(),
            "watchdog.timeout must be greater than zero"
        );

        ensure!(
            (0.0..=1.0).contains(&self.nn.confidence_threshold),
            "nn.confidence_threshold must be within [0, 1], got {}",
            self.nn.confidence_threshold
        );

        ensure!(
            self.qos.history_depth > 0,
            "qos.history_depth must be greater than zero"
        );

        ensure!(
            self.sinks.jpeg_queue > 0,
            "sinks.jpeg_queue must be greater than zero"
        );

        ensure!(
            !self.stats_interval.is_zero(),
            "stats_interval must be greater than zero"
        );

        ensure!(
            !self.synthetic.frame_interval.is_zero(),
            "synthetic.frame_interval must be greater than zero"
        );

        ensure!(
            !self.synthetic.cameras.is_empty(),
            "synthetic.cameras must name at least one camera"
        );

        Ok(())
    }

    /// Names of the configured streams, in configuration order.
    pub fn stream_names(&self) -> Vec<String> {
        self.streams.clone()
    }
}

/// Device selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier: a USB port path such as `1.1`, a device serial,
    /// a `stub://` URL, or empty for the first available device.
    #[serde(default)]
    pub id: String,

    /// Force USB2 transfer mode.
    #[serde(default)]
    pub usb2_mode: bool,
}

impl DeviceConfig {
    /// Suffix appended to topic and parameter names for this device.
    ///
    /// Characters which are invalid in topic names, such as the dots in a
    /// USB port path, become underscores.
    pub fn topic_suffix(&self) -> String {
        self.id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }
}

/// Watchdog settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    /// Maximum silence of the device before the process exits.
    #[serde(default = "default_watchdog_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout: default_watchdog_timeout(),
        }
    }
}

fn default_watchdog_timeout() -> Duration {
    DEFAULT_WATCHDOG_TIMEOUT
}

/// Options passed to the neural-network decoder.
#[derive(Debug, Clone, Deserialize)]
pub struct NnConfig {
    /// Label names indexed by class id.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Detections below this confidence are dropped.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for NnConfig {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.5
}

/// Destinations for encoded streams.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// File the raw `video` stream is appended to.
    #[serde(default)]
    pub video_path: Option<PathBuf>,

    /// Directory receiving one file per `jpegout` frame.
    #[serde(default)]
    pub jpeg_dir: Option<PathBuf>,

    /// Frames queued for the jpeg writer thread before new ones are
    /// dropped.
    #[serde(default = "default_jpeg_queue")]
    pub jpeg_queue: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            video_path: None,
            jpeg_dir: None,
            jpeg_queue: default_jpeg_queue(),
        }
    }
}

fn default_jpeg_queue() -> usize {
    8
}

/// QoS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QosConfig {
    /// Reliability setting.
    #[serde(default = "default_reliability")]
    pub reliability: Reliability,

    /// History depth.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            reliability: default_reliability(),
            history_depth: default_history_depth(),
        }
    }
}

fn default_reliability() -> Reliability {
    Reliability::Reliable
}

fn default_history_depth() -> usize {
    10
}

/// QoS reliability setting.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    BestEffort,
    #[default]
    Reliable,
}

/// Settings of the synthetic device.
#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticConfig {
    /// Time between generated packet batches.
    #[serde(default = "default_frame_interval", with = "humantime_serde")]
    pub frame_interval: Duration,

    /// Preview size as `[height, width]`.
    #[serde(default = "default_preview_size")]
    pub preview_size: [usize; 2],

    /// Mono and depth size as `[height, width]`.
    #[serde(default = "default_mono_size")]
    pub mono_size: [usize; 2],

    /// Cameras producing preview frames.
    #[serde(default = "default_cameras")]
    pub cameras: Vec<String>,

    /// Stop producing packets after this many batches.
    #[serde(default)]
    pub stall_after: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frame_interval: default_frame_interval(),
            preview_size: default_preview_size(),
            mono_size: default_mono_size(),
            cameras: default_cameras(),
            stall_after: None,
        }
    }
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(33)
}

fn default_preview_size() -> [usize; 2] {
    [300, 300]
}

fn default_mono_size() -> [usize; 2] {
    [400, 640]
}

fn default_cameras() -> Vec<String> {
    vec!["rgb".to_string()]
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_config() {
        let yaml = r#"
device:
  id: "1.1"
  usb2_mode: true

streams:
  - previewout
  - left
  - depth_raw
  - meta_d2h

watchdog:
  timeout: 5s

nn:
  labels: [background, person]
  confidence_threshold: 0.6

sinks:
  video_path: /tmp/video.h264

qos:
  reliability: best_effort
  history_depth: 1

stats_interval: 30s
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.device.id, "1.1");
        assert!(config.device.usb2_mode);
        assert_eq!(
            config.stream_names(),
            vec!["previewout", "left", "depth_raw", "meta_d2h"]
        );
        assert_eq!(config.watchdog.timeout, Duration::from_secs(5));
        assert_eq!(config.nn.labels.len(), 2);
        assert_eq!(config.nn.confidence_threshold, 0.6);
        assert_eq!(
            config.sinks.video_path.as_deref(),
            Some(Path::new("/tmp/video.h264"))
        );
        assert!(config.sinks.jpeg_dir.is_none());
        assert_eq!(config.qos.reliability, Reliability::BestEffort);
        assert_eq!(config.qos.history_depth, 1);
        assert_eq!(config.stats_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_defaults() {
        let yaml = r#"
device: {}
streams: [left]
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.device.id, "");
        assert_eq!(config.watchdog.timeout, Duration::from_secs(10));
        assert_eq!(config.nn.confidence_threshold, 0.5);
        assert_eq!(config.qos.reliability, Reliability::Reliable);
        assert_eq!(config.qos.history_depth, 10);
        assert_eq!(config.sinks.jpeg_queue, 8);
        assert_eq!(config.synthetic.cameras, vec!["rgb"]);
        assert_eq!(config.synthetic.frame_interval, Duration::from_millis(33));
        assert_eq!(config.stats_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_reject_empty_streams() {
        let yaml = r#"
device: {}
streams: []
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_reject_duplicate_streams() {
        let yaml = r#"
device: {}
streams:
  - left
  - left
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_reject_stream_options() {
        // Streams are requested by name only.
        let yaml = r#"
device: {}
streams:
  - name: depth_raw
    max_fps: 12.0
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_reject_zero_jpeg_queue() {
        let yaml = r#"
device: {}
streams: [jpegout]
sinks:
  jpeg_dir: /tmp/jpeg
  jpeg_queue: 0
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_reject_zero_watchdog_timeout() {
        let yaml = r#"
device: {}
streams: [left]
watchdog:
  timeout: 0s
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_reject_threshold_out_of_range() {
        let yaml = r#"
device: {}
streams: [left]
nn:
  confidence_threshold: 1.5
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_topic_suffix() {
        let device = DeviceConfig {
            id: "1.1.3".to_string(),
            usb2_mode: false,
        };
        assert_eq!(device.topic_suffix(), "1_1_3");

        let device = DeviceConfig {
            id: "stub://oak".to_string(),
            usb2_mode: false,
        };
        assert_eq!(device.topic_suffix(), "stub___oak");
    }
}
