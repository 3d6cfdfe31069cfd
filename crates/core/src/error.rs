//! Error types for rgb-hub-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID device communication failure.
    #[error("HID error: {0}")]
    Hid(String),

    /// Device not found during enumeration or open.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Socket or serial I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload does not fit in a fixed-size transport frame.
    #[error("payload of {len} bytes exceeds frame capacity of {capacity}")]
    FrameOverflow { len: usize, capacity: usize },

    /// Declared chunk sizes do not cover the buffer exactly.
    #[error("chunk sizes sum to {declared}, buffer is {actual} bytes")]
    ChunkMismatch { declared: usize, actual: usize },

    /// Color array length does not match the controller's LED count.
    #[error("expected {expected} colors, got {actual}")]
    LedCountMismatch { expected: usize, actual: usize },

    /// Device identity query did not resolve to a supported category.
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// Controller index not present in the registry.
    #[error("controller index {index} out of range ({count} controllers)")]
    ControllerIndex { index: usize, count: usize },

    /// Zone or LED index outside the controller's layout.
    #[error("{field} index {index} out of range")]
    LayoutIndex { field: &'static str, index: usize },

    /// A count does not fit the protocol's 16-bit length field.
    #[error("{count} {what} exceed the protocol limit of {max}")]
    TooMany {
        what: &'static str,
        count: usize,
        max: usize,
    },

    /// Malformed network frame or payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Packet id not part of the protocol.
    #[error("unknown packet id {0}")]
    UnknownPacket(u32),

    /// The remote side answered with an error reply.
    #[error("remote error: code {code} for packet {packet_id}")]
    Remote { code: u32, packet_id: u32 },

    /// `start` called while the server is not stopped.
    #[error("server already running")]
    AlreadyRunning,

    /// Port change requested while listening.
    #[error("port cannot change while listening on {0}")]
    PortLocked(u16),

    /// Configuration file error.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
