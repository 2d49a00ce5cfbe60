use serialbridge_dispatch::DispatchError;
use serialbridge_frame::FrameError;
use serialbridge_transport::TransportError;

/// Errors from gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
