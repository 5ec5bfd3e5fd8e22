//! Error types for the encoding pipeline.

use thiserror::Error;

/// Errors that can occur during encoder configuration and encoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Invalid encoder configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A rate-control mode string that names no known mode.
    #[error("unknown rate-control mode: {0}")]
    UnknownRateControl(String),

    /// A profile string that names no known H.264 profile.
    #[error("unknown H.264 profile: {0}")]
    UnknownProfile(String),

    /// No usable DRM render node was found.
    #[error("no VA-API render node available: {0}")]
    NoRenderNode(String),

    /// A VA-API call returned a non-success status.
    #[error("{call} failed: {detail}")]
    VaCall {
        /// Name of the failing libva entry point.
        call: &'static str,
        /// Driver-reported error string.
        detail: String,
    },

    /// The driver does not expose the slice encoding entrypoint for the
    /// requested profile.
    #[error("encode entrypoint not supported for the requested profile")]
    UnsupportedEntrypoint,

    /// The driver does not support the requested rate-control mode.
    #[error("rate-control mode not supported by the driver")]
    UnsupportedRateControl,

    /// Raw frame length does not match the negotiated format.
    #[error("frame size mismatch: got {got} bytes, expected {expected}")]
    FrameSizeMismatch { got: usize, expected: usize },

    /// Pixel format the encoder cannot ingest.
    #[error("unsupported pixel format")]
    UnsupportedPixelFormat,

    /// The encoder is shutting down and no longer accepts frames.
    #[error("encoder is shutting down")]
    ShuttingDown,
}

impl CodecError {
    /// Create an InvalidConfig error with a message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a VaCall error from a call name and driver detail.
    pub fn va_call(call: &'static str, detail: impl Into<String>) -> Self {
        Self::VaCall {
            call,
            detail: detail.into(),
        }
    }
}
