use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::config::SerialConfig;
use crate::error::{Result, TransportError};

/// A connected byte link implementing `Read + Write`.
///
/// Whatever backs it, the bridge treats the link as an unframed byte stream.
pub struct SerialStream {
    inner: SerialStreamInner,
    path: Option<PathBuf>,
}

enum SerialStreamInner {
    Port(Box<dyn SerialPort>),
    File(File),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => port.read(buf),
            SerialStreamInner::File(file) => file.read(buf),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => port.write(buf),
            SerialStreamInner::File(file) => file.write(buf),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => port.flush(),
            SerialStreamInner::File(file) => file.flush(),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    /// Open a serial port and apply `config` (baud rate, framing, timeout).
    pub fn open_port(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref();
        let port = config
            .builder(&path.to_string_lossy())
            .open()
            .map_err(|err| TransportError::Open {
                path: path.to_path_buf(),
                source: err.into(),
            })?;
        info!(
            ?path,
            baud_rate = config.baud_rate,
            parity = ?config.parity,
            stop_bits = ?config.stop_bits,
            "opened serial port"
        );
        Ok(Self {
            inner: SerialStreamInner::Port(port),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open `path` as a configured serial port when it is a device, and as a
    /// read/write file otherwise.
    pub fn open_device(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref();
        if is_serial_device(path) {
            Self::open_port(path, config)
        } else {
            Self::open(path)
        }
    }

    /// Open a file (or a device the OS already configured) for reading and
    /// writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(?path, "opened serial link");
        Ok(Self {
            inner: SerialStreamInner::File(file),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a capture file read-only, e.g. to replay a recorded session.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "opened capture for replay");
        Ok(Self {
            inner: SerialStreamInner::File(file),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already opened file.
    pub fn from_file(file: File) -> Self {
        Self {
            inner: SerialStreamInner::File(file),
            path: None,
        }
    }

    /// Create two connected in-memory endpoints.
    ///
    /// Bytes written on one end are read on the other, which makes this a
    /// stand-in for a device and its peer microcontroller.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    #[cfg(unix)]
    fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Unix(stream),
            path: None,
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// File-backed streams only accept `None`; serial ports always carry a
    /// timeout and only accept `Some`.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let kind = self.kind();
        match &mut self.inner {
            SerialStreamInner::Port(port) => match timeout {
                Some(timeout) => port.set_timeout(timeout).map_err(Into::into),
                None => Err(TransportError::Unsupported {
                    operation: "blocking reads",
                    kind,
                }),
            },
            SerialStreamInner::File(_) if timeout.is_none() => Ok(()),
            SerialStreamInner::File(_) => Err(TransportError::Unsupported {
                operation: "read timeout",
                kind,
            }),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to split a link into an independent reading half and writing half.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            SerialStreamInner::Port(port) => SerialStreamInner::Port(port.try_clone()?),
            SerialStreamInner::File(file) => SerialStreamInner::File(file.try_clone()?),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => SerialStreamInner::Unix(stream.try_clone()?),
        };
        Ok(Self {
            inner,
            path: self.path.clone(),
        })
    }

    /// Path the stream was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Short name of the backing stream type.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            SerialStreamInner::Port(_) => "port",
            SerialStreamInner::File(_) => "file",
            #[cfg(unix)]
            SerialStreamInner::Unix(_) => "unix",
        }
    }
}

/// Whether `path` names a serial device rather than a regular file.
///
/// On Unix that is any character device; elsewhere anything that is not a
/// regular file (e.g. `COM3`).
pub fn is_serial_device(path: impl AsRef<Path>) -> bool {
    let Ok(metadata) = std::fs::metadata(path.as_ref()) else {
        return cfg!(windows);
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        metadata.file_type().is_char_device()
    }
    #[cfg(not(unix))]
    {
        !metadata.is_file()
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("type", &self.kind())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "serialbridge-transport-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    #[cfg(unix)]
    fn pair_carries_bytes_both_ways() {
        let (mut left, mut right) = SerialStream::pair().unwrap();

        left.write_all(&[0xAA, 0xBB, 0x01]).unwrap();
        let mut buf = [0u8; 3];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0x01]);

        right.write_all(&[0xCC]).unwrap();
        let mut one = [0u8; 1];
        left.read_exact(&mut one).unwrap();
        assert_eq!(one, [0xCC]);
    }

    #[test]
    #[cfg(unix)]
    fn read_timeout_applies_to_socket_streams() {
        let (mut left, _right) = SerialStream::pair().unwrap();
        left.set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();

        let mut buf = [0u8; 4];
        let err = left.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn open_missing_path_reports_path() {
        let missing = temp_path("missing");
        let err = SerialStream::open(&missing).unwrap_err();
        match err {
            TransportError::Open { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_stream_reads_capture_and_rejects_timeout() {
        let path = temp_path("capture");
        std::fs::write(&path, [0xCC, 0xDD, 0x01, 0x01, 0x11]).unwrap();

        let mut stream = SerialStream::open_read_only(&path).unwrap();
        assert_eq!(stream.kind(), "file");
        assert_eq!(stream.path(), Some(path.as_path()));
        assert!(stream.set_read_timeout(None).is_ok());
        assert!(matches!(
            stream.set_read_timeout(Some(Duration::from_millis(5))),
            Err(TransportError::Unsupported { .. })
        ));

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0xCC, 0xDD, 0x01, 0x01, 0x11]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_port_on_missing_device_reports_path() {
        let missing = temp_path("tty");
        let err = SerialStream::open_port(&missing, &SerialConfig::default()).unwrap_err();
        match err {
            TransportError::Open { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn open_device_uses_plain_file_for_captures() {
        let path = temp_path("device-capture");
        std::fs::write(&path, b"").unwrap();

        assert!(!is_serial_device(&path));
        let stream = SerialStream::open_device(&path, &SerialConfig::default()).unwrap();
        assert_eq!(stream.kind(), "file");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[cfg(unix)]
    fn character_devices_count_as_serial_devices() {
        assert!(is_serial_device("/dev/null"));
        assert!(!is_serial_device(temp_path("absent")));
    }

    #[test]
    #[cfg(unix)]
    fn try_clone_shares_the_link() {
        let (left, mut right) = SerialStream::pair().unwrap();
        let mut writer = left.try_clone().unwrap();

        writer.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
        drop(left);
    }
}
