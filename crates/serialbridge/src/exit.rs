use std::fmt;
use std::io;

use serialbridge_dispatch::DispatchError;
use serialbridge_frame::FrameError;
use serialbridge_gateway::GatewayError;
use serialbridge_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, path } => {
            io_error(&format!("{context} ({})", path.display()), source)
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Port(source) => io_error(context, source.into()),
        other @ TransportError::Unsupported { .. } => {
            CliError::new(USAGE, format!("{context}: {other}"))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::InvalidMarkers(_) => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn dispatch_error(context: &str, err: DispatchError) -> CliError {
    match err {
        DispatchError::ShutdownTimeout { .. } => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        DispatchError::ShutDown | DispatchError::QueueFull { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        DispatchError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        DispatchError::Spawn { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn gateway_error(context: &str, err: GatewayError) -> CliError {
    match err {
        GatewayError::Frame(err) => frame_error(context, err),
        GatewayError::Dispatch(err) => dispatch_error(context, err),
        GatewayError::Transport(err) => transport_error(context, err),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn io_kinds_map_to_codes() {
        let denied = io_error("open", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.code, PERMISSION_DENIED);
        let missing = io_error("open", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(missing.code, TRANSPORT_ERROR);
        let timed_out = io_error("read", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(timed_out.code, TIMEOUT);
    }

    #[test]
    fn shutdown_timeout_maps_to_124() {
        let err = dispatch_error(
            "send",
            DispatchError::ShutdownTimeout {
                abandoned: 1,
                elapsed: Duration::from_secs(5),
            },
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("send: "));
    }

    #[test]
    fn gateway_errors_unwrap_to_inner_mapping() {
        let err = gateway_error("listen", GatewayError::Frame(FrameError::ConnectionClosed));
        assert_eq!(err.code, FAILURE);
        let err = gateway_error(
            "listen",
            GatewayError::Transport(TransportError::Unsupported {
                operation: "read timeout",
                kind: "file",
            }),
        );
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn port_errors_follow_io_mapping() {
        let missing = serialport::Error::new(serialport::ErrorKind::NoDevice, "no such port");
        let err = transport_error("listen", TransportError::Port(missing));
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("no such port"));
    }
}
