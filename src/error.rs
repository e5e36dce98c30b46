//! Error types for stream decoding.

use std::io;

use crate::io::SeekError;

/// Errors reported by a [`Decoder`](crate::Decoder).
///
/// Host I/O failures (`ReadFailed`, `SeekFailed`, `TellFailed`) are fatal for
/// the session. `UnsupportedFormat` is a permanent rejection of the input.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// The byte source failed to read.
    #[error("Reading from the byte source failed")]
    ReadFailed(#[source] io::Error),

    /// The byte source failed to seek.
    #[error("Seeking the byte source failed")]
    SeekFailed(#[source] SeekError),

    /// The byte source could not report its position or length.
    #[error("Could not determine the byte source position or length")]
    TellFailed(#[source] Option<io::Error>),

    /// The container engine rejected the bytes it was given.
    #[error("The container engine rejected the stream data")]
    ParseFailed(#[source] EngineError),

    /// No decodable stream was found within the header budget, or no
    /// converter exists for the discovered format.
    #[error("The stream format is not supported")]
    UnsupportedFormat(#[source] Option<EngineError>),

    /// Undetermined state (for example end of stream cannot be decided) or an
    /// unexpected engine failure.
    #[error("Unknown decoder failure")]
    Unknown(#[source] Option<EngineError>),
}

/// Errors raised by a container engine or its sample converter.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The bytes do not form a valid stream of the expected container.
    #[error("Invalid stream data: {0}")]
    InvalidData(String),

    /// The container or encoding is recognized but cannot be handled.
    #[error("Unsupported stream: {0}")]
    Unsupported(String),

    /// A query or operation that needs information the engine does not have
    /// (yet).
    #[error("Not available: {0}")]
    Unavailable(&'static str),

    /// The codec backing a converter failed.
    #[error("Codec failure")]
    Codec(#[from] symphonia::core::errors::Error),

    /// A native engine returned a non-zero status code.
    #[error("Engine status {}", crate::engine::status_to_string(*.0))]
    Status(i32),

    /// The engine could not be reached from the current thread.
    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Failure to attach the current thread to an installed runtime binding.
#[derive(Debug, thiserror::Error)]
#[error("Could not attach the current thread to the runtime: {0}")]
pub struct BindingError(pub String);

impl From<BindingError> for DecoderError {
    fn from(err: BindingError) -> Self {
        DecoderError::Unknown(Some(EngineError::Binding(err)))
    }
}
