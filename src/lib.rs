//! Streaming audio decoding over a pull-style byte source.
//!
//! The host supplies bytes through [`HostIo`] (`read`, `seek`, `tell`) and
//! receives decoded audio through a [`FrameSink`]. Output is always
//! interleaved `f32` at the stream's own sample rate and channel count.
//!
//! Container parsing and sample conversion are done by a
//! [`ContainerEngine`](engine::ContainerEngine). The portable
//! [`NativeEngine`](engine::native::NativeEngine) handles RIFF/WAVE, ADTS AAC
//! and MPEG layer III streams. With the `audio-toolbox` feature on Apple
//! targets the system AudioToolbox engine is used instead.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use stream_decoder::{Decoder, ReadSeekHost};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = ReadSeekHost::new(File::open("speech.wav")?)?;
//!     let mut decoder = Decoder::new(host, Vec::<f32>::new())?;
//!     while !decoder.eof()? {
//!         decoder.decode_next()?;
//!     }
//!     let format = decoder.format()?;
//!     let samples = decoder.sink();
//!     assert_eq!(samples.len() as u64, format.length_in_frames * u64::from(format.channels));
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `aac` (default): AAC decoding for the native engine
//! - `mp3` (default): MPEG layer III decoding for the native engine
//! - `audio-toolbox`: use AudioToolbox on macOS and iOS

#![cfg_attr(docsrs, feature(doc_cfg))]

mod common;
mod constants;
mod decoder;
mod error;
mod format;
mod io;
mod sink;

pub mod engine;
pub mod runtime;

pub use crate::common::{ChannelCount, Sample, SampleRate};
pub use crate::constants::{
    MAX_HEADER_SIZE, PACKET_AGGREGATION_COUNT, PARSING_BUFFER_SIZE, ZERO_READ_THRESHOLD,
};
pub use crate::decoder::{Decoder, DecoderBuilder, DecoderConfig};
pub use crate::engine::DefaultEngine;
pub use crate::error::{BindingError, DecoderError, EngineError};
pub use crate::format::{
    length_from_bit_rate, length_from_packets, AudioFormat, CodecId, FileType, FileTypeHint,
    FormatFlags, SampleFormat, StreamDescription,
};
pub use crate::io::{HostIo, ReadOnlyHost, ReadSeekHost, SeekError, SeekOrigin, StreamPosition};
pub use crate::sink::FrameSink;
