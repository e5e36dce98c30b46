//! Builder pattern for configuring and constructing decoders.
//!
//! # Examples
//!
//! ```no_run
//! use std::fs::File;
//! use stream_decoder::{Decoder, FileType, ReadSeekHost};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = ReadSeekHost::new(File::open("audio.aac")?)?;
//!
//!     let mut decoder = Decoder::builder()
//!         .with_data(host)
//!         .with_sink(Vec::<f32>::new())
//!         .with_file_type_hint(FileType::ADTS) // Skip container detection
//!         .with_parsing_buffer_size(16 * 1024)
//!         .build()?;
//!
//!     while !decoder.eof()? {
//!         decoder.decode_next()?;
//!     }
//!     println!("decoded {} samples", decoder.sink().len());
//!     Ok(())
//! }
//! ```
//!
//! # Settings
//!
//! - `file_type_hint` - Container family handed to the engine, `0` to detect it
//! - `max_header_size` - Bytes read at most while looking for the stream header
//! - `parsing_buffer_size` - Size of each read from the byte source

use crate::constants::{MAX_HEADER_SIZE, PARSING_BUFFER_SIZE};
use crate::engine::ContainerEngine;
use crate::error::DecoderError;
use crate::format::FileTypeHint;
use crate::io::HostIo;
use crate::sink::FrameSink;

use super::Decoder;

/// Decoder configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Container family handed to the engine when it is opened.
    /// [`FileTypeHint::AUTO`] lets the engine detect the container.
    pub file_type_hint: FileTypeHint,

    /// Upper bound on the bytes read before the stream must be ready to
    /// produce packets.
    pub max_header_size: usize,

    /// Size of the scratch buffer, and so the largest single read from the
    /// byte source.
    pub parsing_buffer_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            file_type_hint: FileTypeHint::AUTO,
            max_header_size: MAX_HEADER_SIZE,
            parsing_buffer_size: PARSING_BUFFER_SIZE,
        }
    }
}

/// Builder for configuring and creating a decoder.
///
/// Both a byte source ([`with_data`](Self::with_data)) and a sink
/// ([`with_sink`](Self::with_sink)) are required; building without either
/// fails with [`DecoderError::Unknown`].
#[derive(Clone, Debug)]
pub struct DecoderBuilder<H, S> {
    /// The byte source to decode.
    data: Option<H>,
    /// Where decoded frames go.
    sink: Option<S>,
    config: DecoderConfig,
}

impl<H, S> Default for DecoderBuilder<H, S> {
    fn default() -> Self {
        Self {
            data: None,
            sink: None,
            config: DecoderConfig::default(),
        }
    }
}

impl<H: HostIo, S: FrameSink> DecoderBuilder<H, S> {
    /// Creates a new decoder builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the byte source to decode.
    pub fn with_data(mut self, data: H) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the sink that receives decoded frames.
    pub fn with_sink(mut self, sink: S) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the container family hint.
    ///
    /// Engines that cannot use the hint fall back to detecting the container.
    pub fn with_file_type_hint(mut self, hint: impl Into<FileTypeHint>) -> Self {
        self.config.file_type_hint = hint.into();
        self
    }

    /// Sets how many bytes may be read while probing for the stream header.
    pub fn with_max_header_size(mut self, max_header_size: usize) -> Self {
        self.config.max_header_size = max_header_size;
        self
    }

    /// Sets the size of each read from the byte source. Zero is raised to one.
    pub fn with_parsing_buffer_size(mut self, parsing_buffer_size: usize) -> Self {
        self.config.parsing_buffer_size = parsing_buffer_size.max(1);
        self
    }

    /// Replaces every setting at once.
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates a decoder with the engine selected at build time.
    ///
    /// Opening probes the stream header, so this performs I/O.
    pub fn build(self) -> Result<Decoder<H, S>, DecoderError> {
        self.build_with()
    }

    /// Creates a decoder driving a specific container engine.
    pub fn build_with<E: ContainerEngine>(self) -> Result<Decoder<H, S, E>, DecoderError> {
        let (Some(data), Some(sink)) = (self.data, self.sink) else {
            return Err(DecoderError::Unknown(None));
        };
        Decoder::open(self.config, data, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FileType;
    use crate::io::ReadOnlyHost;

    #[test]
    fn settings_are_collected() {
        let builder = DecoderBuilder::<ReadOnlyHost<&[u8]>, Vec<f32>>::new()
            .with_file_type_hint(FileType::WAVE)
            .with_max_header_size(64)
            .with_parsing_buffer_size(0);
        assert_eq!(
            builder.config,
            DecoderConfig {
                file_type_hint: FileType::WAVE.into(),
                max_header_size: 64,
                parsing_buffer_size: 1,
            }
        );
    }

    #[test]
    fn build_requires_data_and_sink() {
        let result = DecoderBuilder::<ReadOnlyHost<&[u8]>, Vec<f32>>::new()
            .with_sink(Vec::new())
            .build();
        assert!(matches!(result, Err(DecoderError::Unknown(None))));
    }
}
