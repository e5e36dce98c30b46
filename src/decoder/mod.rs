//! Decodes audio from a pull-style byte source.
//!
//! A [`Decoder`] owns a [`HostIo`] byte source, a container engine and a
//! [`FrameSink`]. Each call reads a bounded chunk from the source, hands it to
//! the engine, and the engine's packet notifications are converted into
//! interleaved `f32` frames that reach the sink before the call returns.
//!
//! # Usage
//!
//! ```no_run
//! use std::fs::File;
//! use stream_decoder::{Decoder, ReadSeekHost};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = ReadSeekHost::new(File::open("music.mp3")?)?;
//!     let mut frames = 0;
//!     let mut decoder = Decoder::new(host, |count: usize, _samples: &[f32]| frames += count)?;
//!
//!     let format = decoder.format()?;
//!     println!("{} Hz, {} channels", format.sample_rate, format.channels);
//!
//!     // Jump to the one second mark, then decode to the end
//!     decoder.seek(u64::from(format.sample_rate))?;
//!     while !decoder.eof()? {
//!         decoder.decode_next()?;
//!     }
//!     decoder.uninit()?;
//!     println!("decoded {frames} frames");
//!     Ok(())
//! }
//! ```

use std::io;

use tracing::{debug, trace};

use crate::common::{ChannelCount, SampleRate};
use crate::engine::{ContainerEngine, DefaultEngine, ParseFlags};
use crate::error::{DecoderError, EngineError};
use crate::format::{
    length_from_bit_rate, length_from_packets, AudioFormat, SampleFormat, StreamDescription,
};
use crate::io::{HostIo, SeekError, SeekOrigin};
use crate::runtime;
use crate::sink::FrameSink;

mod adapter;
mod bridge;
mod builder;
mod tracker;

use self::adapter::{Session, SessionListener};
use self::tracker::{EofState, PositionTrackers};
pub use builder::{DecoderBuilder, DecoderConfig};

/// An open audio stream.
///
/// A `Decoder` only exists once the stream header has been parsed and the
/// output format is known; construction fails otherwise. All operations are
/// blocking and call the sink synchronously.
pub struct Decoder<H, S, E = DefaultEngine>
where
    E: ContainerEngine,
{
    host: H,
    sink: S,
    engine: E,
    session: Session<E::Converter>,
    parsing_buffer: Box<[u8]>,
    config: DecoderConfig,
    trackers: PositionTrackers,
}

impl<H: HostIo, S: FrameSink> Decoder<H, S> {
    /// Opens a stream with the default configuration and the engine selected
    /// at build time.
    ///
    /// # Errors
    ///
    /// See [`Decoder::open`].
    pub fn new(host: H, sink: S) -> Result<Self, DecoderError> {
        Self::with_config(DecoderConfig::default(), host, sink)
    }

    /// Opens a stream with `config` and the engine selected at build time.
    pub fn with_config(config: DecoderConfig, host: H, sink: S) -> Result<Self, DecoderError> {
        Self::open(config, host, sink)
    }

    /// Returns a builder for configuring a decoder.
    pub fn builder() -> DecoderBuilder<H, S> {
        DecoderBuilder::new()
    }
}

impl<H, S, E> Decoder<H, S, E>
where
    H: HostIo,
    S: FrameSink,
    E: ContainerEngine,
{
    /// Opens a stream with the engine `E`.
    ///
    /// # Errors
    ///
    /// - `SeekFailed` if rewinding the source fails (an unsupported seek is
    ///   fine)
    /// - `ReadFailed` / `ParseFailed` if the source or the engine fails while
    ///   probing the header
    /// - `UnsupportedFormat` if no stream header is found within
    ///   `max_header_size` bytes, the source keeps returning no data, or no
    ///   converter exists for the discovered format
    pub fn open(config: DecoderConfig, host: H, sink: S) -> Result<Self, DecoderError> {
        runtime::ensure_call_context()?;
        let engine = E::open(config.file_type_hint)
            .map_err(|err| DecoderError::UnsupportedFormat(Some(err)))?;
        Self::from_engine(engine, config, host, sink)
    }

    /// Opens a stream with an engine that was already created.
    pub fn from_engine(
        engine: E,
        config: DecoderConfig,
        host: H,
        sink: S,
    ) -> Result<Self, DecoderError> {
        runtime::ensure_call_context()?;
        let parsing_buffer = vec![0u8; config.parsing_buffer_size.max(1)].into_boxed_slice();
        let mut decoder = Decoder {
            host,
            sink,
            engine,
            session: Session::default(),
            parsing_buffer,
            config,
            trackers: PositionTrackers::default(),
        };
        decoder.load()?;
        Ok(decoder)
    }

    /// Rewinds the source and parses until the engine can produce packets.
    fn load(&mut self) -> Result<(), DecoderError> {
        match self.host.seek(0, SeekOrigin::Start) {
            Ok(()) | Err(SeekError::Unsupported) => {}
            Err(err) => return Err(DecoderError::SeekFailed(err)),
        }

        let max_header_size = self.config.max_header_size;
        let mut total = 0;
        while total < max_header_size {
            let len = self.parsing_buffer.len().min(max_header_size - total);
            total += self.parse_chunk(len)?;

            if self.engine.is_ready() {
                if self.session.bridge.is_none() {
                    return Err(DecoderError::UnsupportedFormat(None));
                }
                debug!(
                    header_bytes = total,
                    file_type = ?self.engine.file_type(),
                    data_offset = ?self.engine.data_offset(),
                    "stream ready"
                );
                return Ok(());
            }
            if self.trackers.zero_reads_exhausted() {
                debug!(header_bytes = total, "byte source ran dry while probing");
                return Err(DecoderError::UnsupportedFormat(None));
            }
        }

        debug!(max_header_size, "no stream header within the probe budget");
        Err(DecoderError::UnsupportedFormat(None))
    }

    /// Reads up to `len` bytes and parses them. Returns the bytes read.
    fn parse_chunk(&mut self, len: usize) -> Result<usize, DecoderError> {
        let buffer = &mut self.parsing_buffer[..len];
        let read = match self.host.read(buffer) {
            Ok(read) => read.min(len),
            Err(err) => {
                self.trackers.is_read_failed = true;
                return Err(DecoderError::ReadFailed(err));
            }
        };
        self.trackers.record_read(read);
        if read == 0 {
            trace!(zero_reads = self.trackers.contiguous_zero_reads, "empty read");
            return Ok(0);
        }

        let flags = if self.trackers.is_discontinuous {
            ParseFlags::DISCONTINUITY
        } else {
            ParseFlags::empty()
        };
        let mut listener = SessionListener {
            session: &mut self.session,
            sink: &mut self.sink,
        };
        let parsed = self
            .engine
            .parse_bytes(&self.parsing_buffer[..read], flags, &mut listener);
        let failure = self.session.take_failure();
        parsed.map_err(DecoderError::ParseFailed)?;
        failure?;

        self.trackers.is_discontinuous = false;
        trace!(read, ?flags, "parsed chunk");
        Ok(read)
    }

    /// Moves the source to where the engine expects the next bytes, if the
    /// two disagree.
    fn sync_position(&mut self) -> Result<(), DecoderError> {
        let Some(expected) = self.engine.expected_offset() else {
            return Ok(());
        };
        let position = self
            .host
            .tell()
            .map_err(|err| DecoderError::TellFailed(Some(err)))?
            .position;
        if position == expected {
            return Ok(());
        }

        debug!(position, expected, "repositioning byte source");
        let offset = i64::try_from(expected).map_err(|_| {
            DecoderError::SeekFailed(SeekError::Failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                "byte offset out of range",
            )))
        })?;
        self.host
            .seek(offset, SeekOrigin::Start)
            .map_err(DecoderError::SeekFailed)
    }

    /// Reads and parses one chunk of at most `parsing_buffer_size` bytes.
    /// Returns the number of bytes read, zero when the source had nothing.
    ///
    /// The sink may be called any number of times before this returns.
    ///
    /// # Errors
    ///
    /// `ReadFailed`, `SeekFailed` or `TellFailed` when the source fails,
    /// `ParseFailed` when the engine rejects the bytes.
    pub fn decode_next(&mut self) -> Result<usize, DecoderError> {
        runtime::ensure_call_context()?;
        self.sync_position()?;
        self.parse_chunk(self.parsing_buffer.len())
    }

    /// Reads and parses up to `bytes_to_read` bytes, chunk by chunk, stopping
    /// early when a read returns nothing. Returns the number of bytes read.
    pub fn decode(&mut self, bytes_to_read: usize) -> Result<usize, DecoderError> {
        runtime::ensure_call_context()?;
        self.sync_position()?;

        let mut total = 0;
        while total < bytes_to_read {
            let len = (bytes_to_read - total).min(self.parsing_buffer.len());
            let read = self.parse_chunk(len)?;
            if read == 0 {
                break;
            }
            total += read;
        }
        Ok(total)
    }

    /// Describes the output of the stream.
    ///
    /// The length is exact when the container records a packet count and
    /// otherwise estimated from the source length and the bit rate.
    ///
    /// # Errors
    ///
    /// - `TellFailed` if the length has to be estimated but the source length
    ///   is unknown
    /// - `Unknown` if the engine reports no bit rate
    pub fn format(&mut self) -> Result<AudioFormat, DecoderError> {
        runtime::ensure_call_context()?;
        let (Some(input), Some(output)) = (self.session.input_format, self.session.output_format)
        else {
            return Err(DecoderError::Unknown(None));
        };

        Ok(AudioFormat {
            channels: output.channels_per_frame as ChannelCount,
            sample_rate: output.sample_rate as SampleRate,
            sample_format: SampleFormat::F32,
            length_in_frames: self.length_in_frames(&input, &output)?,
            codec: input.codec,
            file_type: self.engine.file_type(),
        })
    }

    fn length_in_frames(
        &mut self,
        input: &StreamDescription,
        output: &StreamDescription,
    ) -> Result<u64, DecoderError> {
        if let Some(packet_count) = self.engine.packet_count() {
            return Ok(length_from_packets(packet_count, input.frames_per_packet));
        }

        let byte_len = self
            .host
            .tell()
            .map_err(|err| DecoderError::TellFailed(Some(err)))?
            .length
            .ok_or(DecoderError::TellFailed(None))?;
        let data_offset = self.engine.data_offset().unwrap_or(0);
        let bit_rate = self.engine.bit_rate().ok_or(DecoderError::Unknown(None))?;

        length_from_bit_rate(byte_len, data_offset, bit_rate, output.sample_rate)
            .ok_or(DecoderError::Unknown(None))
    }

    /// Positions the stream at `frame_index` and returns the absolute byte
    /// offset decoding resumes from.
    ///
    /// The next decode call moves the source to that offset unless the caller
    /// already did. Output starts exactly at `frame_index` even when it falls
    /// inside a packet.
    pub fn seek(&mut self, frame_index: u64) -> Result<u64, DecoderError> {
        runtime::ensure_call_context()?;
        let input = self.session.input_format.ok_or(DecoderError::Unknown(None))?;

        let frames_per_packet = u64::from(input.frames_per_packet.max(1));
        let packet = frame_index / frames_per_packet;
        let seek = self
            .engine
            .seek_to_packet(packet)
            .map_err(|err| DecoderError::Unknown(Some(err)))?;
        let offset = self
            .engine
            .data_offset()
            .unwrap_or(0)
            .checked_add(seek.byte_offset)
            .ok_or(DecoderError::Unknown(Some(EngineError::Unavailable(
                "seek target beyond the addressable stream",
            ))))?;

        if let Some(bridge) = &mut self.session.bridge {
            bridge
                .reset(frame_index - packet * frames_per_packet)
                .map_err(|err| DecoderError::Unknown(Some(err)))?;
        }
        // PCM parsers reject discontinuities they cannot recover from
        if !input.is_linear_pcm() {
            self.trackers.is_discontinuous = true;
        }

        debug!(
            frame_index,
            packet,
            offset,
            estimated = seek.estimated,
            "seek"
        );
        Ok(offset)
    }

    /// Whether the whole stream has been read.
    ///
    /// Decided, in order, by the source position against a known length, a
    /// failed read, or ten consecutive empty reads. After a seek the position
    /// decoding resumes from counts, not where the source currently is.
    ///
    /// # Errors
    ///
    /// `Unknown` when none of the three applies, or when the calling thread
    /// cannot be attached to the installed runtime binding.
    pub fn eof(&mut self) -> Result<bool, DecoderError> {
        runtime::ensure_call_context()?;
        let expected = self.engine.expected_offset();
        let position = self.host.tell().ok().map(|mut position| {
            if let Some(expected) = expected {
                position.position = expected;
            }
            position
        });
        match self.trackers.eof(position) {
            EofState::Reached => Ok(true),
            EofState::NotReached => Ok(false),
            EofState::Undetermined => Err(DecoderError::Unknown(None)),
        }
    }

    /// Closes the stream.
    ///
    /// Everything is released even if the engine fails to close; that error
    /// is returned afterwards.
    pub fn uninit(self) -> Result<(), DecoderError> {
        runtime::ensure_call_context()?;
        let Decoder {
            engine,
            session,
            parsing_buffer,
            ..
        } = self;
        let Session {
            magic_cookie,
            bridge,
            ..
        } = session;

        drop(magic_cookie);
        drop(parsing_buffer);
        drop(bridge);
        let closed = engine.close();
        debug!(ok = closed.is_ok(), "decoder closed");
        closed.map_err(|err| DecoderError::Unknown(Some(err)))
    }

    /// The encoding of the input stream.
    pub fn input_format(&self) -> Option<StreamDescription> {
        self.session.input_format
    }

    /// Whether the next parse is flagged as a discontinuity.
    pub fn is_discontinuous(&self) -> bool {
        self.trackers.is_discontinuous
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// The byte source. Moving it to the offset [`seek`](Self::seek)
    /// returned saves the decoder from doing so itself.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}
