//! Bridge between a serial sensor/actuator link and downstream consumers.
//!
//! serialbridge turns a noisy byte stream into validated sensor and command
//! frames, and runs the work triggered by each frame on a concurrent
//! dispatcher that reports its own load.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte link over a device node, capture file or socket pair
//! - [`frame`]: frame codec, stream reassembler, frame reader/writer
//! - [`dispatch`]: FIFO task dispatcher with an elastic worker pool
//! - [`gateway`]: link to reassembler to dispatcher to sinks, plus outbound commands

/// Re-export transport types.
pub mod transport {
    pub use serialbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serialbridge_frame::*;
}

/// Re-export dispatcher types.
pub mod dispatch {
    pub use serialbridge_dispatch::*;
}

/// Re-export gateway types.
pub mod gateway {
    pub use serialbridge_gateway::*;
}
