//! Error types for the non-real-time side.
//!
//! Nothing in here is ever constructed on the audio thread. Faults that happen
//! while rendering are reported through [`FaultFlags`](crate::FaultFlags) instead.

use thiserror::Error;

/// Which side of a stream an endpoint index refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Input,
    Output,
}

impl core::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EndpointKind::Input => f.write_str("input"),
            EndpointKind::Output => f.write_str("output"),
        }
    }
}

/// Errors from opening, starting or closing an audio stream.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The requested host API index does not exist or failed to initialize
    #[error("Audio host unavailable: {0}")]
    HostUnavailable(String),

    /// No device exists at the requested index
    #[error("No {kind} device at index {index}")]
    DeviceNotFound { kind: EndpointKind, index: usize },

    /// The host has no default output device
    #[error("No default audio output device")]
    NoDefaultDevice,

    /// Failed to get or negotiate a device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build the stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// The device only offers a sample format we cannot write
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The thread owning the stream could not be started or died during setup
    #[error("Audio stream thread failed: {0}")]
    StreamThread(String),
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A command that could not be queued. The command is handed back.
#[derive(Error, Debug)]
pub enum PostError<M> {
    /// The command queue is at capacity; nothing queued was dropped
    #[error("command queue is full")]
    Full(M),

    /// Another thread is posting right now (only returned by `try_post`)
    #[error("command queue is busy")]
    Busy(M),

    /// The device has no open stream to run the command
    #[error("audio device is closed")]
    Closed(M),
}

impl<M> PostError<M> {
    /// Recover the rejected command.
    pub fn into_inner(self) -> M {
        match self {
            PostError::Full(m) | PostError::Busy(m) | PostError::Closed(m) => m,
        }
    }
}
