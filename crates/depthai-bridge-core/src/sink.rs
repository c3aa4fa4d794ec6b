//! Destinations for encoded streams which are not published on the bus.
//!
//! The raw `video` bitstream is appended to a file and `jpegout` frames
//! are handed to a writer thread which stores them in a directory. None
//! of the sinks render anything, so the dispatch loop never blocks on a
//! display.

use crate::config::SinkConfig;
use eyre::{Result, WrapErr, bail};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    thread,
};
use tracing::{debug, info, warn};

/// Receives encoded packet bytes.
pub trait FrameSink: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Appends every packet unmodified to one file.
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .wrap_err_with(|| format!("Failed to open sink file: {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .write_all(bytes)
            .wrap_err_with(|| format!("Failed to append to {}", self.path.display()))
    }
}

/// Writes each packet to its own numbered file in a directory.
pub struct DirectorySink {
    dir: PathBuf,
    extension: &'static str,
    next_index: u64,
}

impl DirectorySink {
    pub fn create(dir: impl AsRef<Path>, extension: &'static str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("Failed to create sink directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            extension,
            next_index: 0,
        })
    }
}

impl FrameSink for DirectorySink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let path = self
            .dir
            .join(format!("{:06}.{}", self.next_index, self.extension));
        fs::write(&path, bytes)
            .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
        self.next_index += 1;
        Ok(())
    }
}

/// Forwards packets to a consumer on another thread.
///
/// Frames are dropped while the consumer lags behind, so a slow viewer
/// never stalls the dispatch loop.
pub struct ChannelSink {
    tx: flume::Sender<Vec<u8>>,
}

impl ChannelSink {
    /// Create a sink and the receiver feeding the consumer.
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<Vec<u8>>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }

    /// Create a sink whose frames are written to `inner` on a dedicated
    /// thread. The thread ends once the sink is dropped.
    pub fn spawn_writer(
        name: &str,
        capacity: usize,
        mut inner: impl FrameSink + 'static,
    ) -> Result<Self> {
        let (sink, rx) = Self::bounded(capacity);

        thread::Builder::new()
            .name(format!("depthai-{}-writer", name))
            .spawn(move || {
                for bytes in rx.iter() {
                    if let Err(e) = inner.write(&bytes) {
                        warn!(error = %e, "Sink writer failed to store frame");
                    }
                }
            })
            .wrap_err_with(|| format!("Failed to spawn {} writer thread", name))?;

        Ok(sink)
    }
}

impl FrameSink for ChannelSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self.tx.try_send(bytes.to_vec()) {
            Ok(()) => Ok(()),
            Err(flume::TrySendError::Full(_)) => {
                debug!("Sink consumer is lagging, frame dropped");
                Ok(())
            }
            Err(flume::TrySendError::Disconnected(_)) => bail!("Sink consumer disconnected"),
        }
    }
}

/// The sinks available to the router.
#[derive(Default)]
pub struct Sinks {
    pub video: Option<Box<dyn FrameSink>>,
    pub jpeg: Option<Box<dyn FrameSink>>,
}

impl Sinks {
    /// Open the sinks named in the configuration.
    pub fn open(config: &SinkConfig) -> Result<Self> {
        let video = match &config.video_path {
            Some(path) => {
                let sink = FileSink::open(path)?;
                info!(path = %path.display(), "Appending video stream to file");
                Some(Box::new(sink) as Box<dyn FrameSink>)
            }
            None => None,
        };

        let jpeg = match &config.jpeg_dir {
            Some(dir) => {
                let sink = ChannelSink::spawn_writer(
                    "jpeg",
                    config.jpeg_queue,
                    DirectorySink::create(dir, "jpg")?,
                )?;
                info!(
                    dir = %dir.display(),
                    queue = config.jpeg_queue,
                    "Writing jpeg frames to directory"
                );
                Some(Box::new(sink) as Box<dyn FrameSink>)
            }
            None => None,
        };

        Ok(Self { video, jpeg })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "depthai-bridge-sink-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = scratch_dir("file");
        let path = dir.join("video.h264");

        let mut sink = FileSink::open(&path).unwrap();
        sink.write(&[0, 0, 0, 1]).unwrap();
        sink.write(&[0x65, 0x88]).unwrap();
        drop(sink);

        // Reopening keeps earlier content.
        let mut sink = FileSink::open(&path).unwrap();
        sink.write(&[0xff]).unwrap();
        drop(sink);

        assert_eq!(fs::read(&path).unwrap(), vec![0, 0, 0, 1, 0x65, 0x88, 0xff]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_directory_sink_numbers_files() {
        let dir = scratch_dir("dir");

        let mut sink = DirectorySink::create(dir.join("jpeg"), "jpg").unwrap();
        sink.write(b"first").unwrap();
        sink.write(b"second").unwrap();

        assert_eq!(fs::read(dir.join("jpeg/000000.jpg")).unwrap(), b"first");
        assert_eq!(fs::read(dir.join("jpeg/000001.jpg")).unwrap(), b"second");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (mut sink, rx) = ChannelSink::bounded(1);

        sink.write(b"a").unwrap();
        sink.write(b"b").unwrap();

        assert_eq!(rx.try_recv().unwrap(), b"a".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_fails_without_consumer() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        drop(rx);

        assert!(sink.write(b"a").is_err());
    }

    #[test]
    fn test_open_writes_jpeg_on_writer_thread() {
        let dir = scratch_dir("open");
        let config = SinkConfig {
            jpeg_dir: Some(dir.join("jpeg")),
            ..SinkConfig::default()
        };

        let mut sinks = Sinks::open(&config).unwrap();
        sinks.jpeg.as_mut().unwrap().write(b"frame").unwrap();

        // Wait for the writer thread to store the frame.
        let path = dir.join("jpeg/000000.jpg");
        let deadline = Instant::now() + Duration::from_secs(5);
        while fs::read(&path).ok().as_deref() != Some(b"frame".as_slice()) {
            assert!(Instant::now() < deadline, "jpeg frame was never written");
            thread::sleep(Duration::from_millis(10));
        }

        drop(sinks);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_open_without_paths() {
        let sinks = Sinks::open(&SinkConfig::default()).unwrap();
        assert!(sinks.video.is_none());
        assert!(sinks.jpeg.is_none());
    }
}
