//! Container engines.
//!
//! A container engine turns raw container bytes into encoded packets, and its
//! [`SampleConverter`] turns those packets into canonical `f32` frames. The
//! decoder drives an engine through a fixed protocol:
//!
//! 1. bytes are pushed with [`ContainerEngine::parse_bytes`];
//! 2. while parsing, the engine synchronously reports property changes and
//!    packets to a [`ParseListener`];
//! 3. once [`ContainerEngine::is_ready`] is set, packets flow and the stream
//!    properties (`data_offset`, `packet_count`, ...) may be queried.
//!
//! Two engines exist and one is selected at build time as [`DefaultEngine`]:
//! the portable [`native::NativeEngine`] and, on Apple targets with the
//! `audio-toolbox` feature, `audio_toolbox::AudioToolboxEngine`.

use crate::error::EngineError;
use crate::format::{printable_four_cc, FileType, FileTypeHint, StreamDescription};

#[cfg(audio_toolbox)]
pub mod audio_toolbox;
pub mod native;

/// The engine decoders use unless another one is named explicitly.
#[cfg(audio_toolbox)]
pub type DefaultEngine = audio_toolbox::AudioToolboxEngine;
/// The engine decoders use unless another one is named explicitly.
#[cfg(not(audio_toolbox))]
pub type DefaultEngine = native::NativeEngine;

/// Flags passed along with a chunk of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseFlags(pub u32);

impl ParseFlags {
    /// The bytes do not directly follow the previously parsed bytes.
    pub const DISCONTINUITY: ParseFlags = ParseFlags(1);

    #[inline]
    pub const fn empty() -> Self {
        ParseFlags(0)
    }

    #[inline]
    pub const fn contains(self, other: ParseFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Location of one packet inside a packets notification buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketDescription {
    /// Byte offset of the packet from the start of the buffer.
    pub start_offset: u64,
    /// Frames in the packet when the format has a variable frame count, else 0.
    pub variable_frames: u32,
    /// Size of the packet in bytes.
    pub byte_size: u32,
}

/// A stream property the engine just learned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Property<'a> {
    /// The encoding of the audio data.
    DataFormat(StreamDescription),
    /// Out-of-band codec configuration ("magic cookie").
    MagicCookie(&'a [u8]),
    /// Byte offset of the first audio packet.
    DataOffset(u64),
    /// The engine can now produce packets.
    ReadyToProducePackets,
}

/// Receives the notifications an engine raises while parsing.
///
/// Both methods are called synchronously from inside
/// [`ContainerEngine::parse_bytes`]; borrowed data is valid only during the
/// call.
pub trait ParseListener {
    fn property_changed(&mut self, property: Property<'_>);

    /// `descriptions` is empty for constant-size packets (e.g. PCM), in which
    /// case `data` holds a whole number of packets.
    fn packets(&mut self, data: &[u8], descriptions: &[PacketDescription]);
}

/// Result of [`ContainerEngine::seek_to_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSeek {
    /// Offset of the packet relative to the start of the audio data.
    pub byte_offset: u64,
    /// Whether the offset is an estimate (packet index not known exactly).
    pub estimated: bool,
}

/// An incremental container parser.
pub trait ContainerEngine: Sized {
    /// The sample converter that pairs with this engine.
    type Converter: SampleConverter;

    /// Opens a parser. A zero `hint` asks the engine to detect the container.
    fn open(hint: FileTypeHint) -> Result<Self, EngineError>;

    /// Parses the next bytes of the stream, reporting notifications to
    /// `listener` before returning.
    fn parse_bytes(
        &mut self,
        data: &[u8],
        flags: ParseFlags,
        listener: &mut dyn ParseListener,
    ) -> Result<(), EngineError>;

    /// Whether the header is parsed and packets can be produced.
    fn is_ready(&self) -> bool;

    fn data_format(&self) -> Option<StreamDescription>;

    fn file_type(&self) -> Option<FileType>;

    /// Byte offset of the first audio packet.
    fn data_offset(&self) -> Option<u64>;

    /// Exact number of packets in the stream, when the container records it.
    fn packet_count(&self) -> Option<u64>;

    /// Bit rate of the audio data in bits per second.
    fn bit_rate(&self) -> Option<u32>;

    /// Absolute byte position the engine needs the next parsed bytes to start
    /// at, when it differs from simply continuing.
    fn expected_offset(&self) -> Option<u64>;

    /// Positions the parser at `packet`. The caller is responsible for
    /// feeding bytes from the returned offset onwards.
    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError>;

    /// Releases the parser.
    fn close(self) -> Result<(), EngineError>;
}

/// A batch of encoded packets handed to a converter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketBatch {
    pub data: Vec<u8>,
    /// Empty for constant-size packets.
    pub descriptions: Vec<PacketDescription>,
}

impl PacketBatch {
    pub fn new(data: &[u8], descriptions: &[PacketDescription]) -> Self {
        PacketBatch {
            data: data.to_vec(),
            descriptions: descriptions.to_vec(),
        }
    }

    /// Number of packets in the batch, given the constant packet size used
    /// when there are no descriptions.
    pub fn packet_count(&self, bytes_per_packet: u32) -> usize {
        if !self.descriptions.is_empty() {
            self.descriptions.len()
        } else if bytes_per_packet > 0 {
            self.data.len() / bytes_per_packet as usize
        } else {
            usize::from(!self.data.is_empty())
        }
    }

    /// Bytes of the `index`-th described packet.
    pub fn packet(&self, index: usize) -> Option<&[u8]> {
        let description = self.descriptions.get(index)?;
        let start = usize::try_from(description.start_offset).ok()?;
        let end = start.checked_add(description.byte_size as usize)?;
        self.data.get(start..end)
    }
}

/// Source of input packets for [`SampleConverter::fill`].
pub trait PacketSupplier {
    /// Hands the next batch over to the converter, or `None` when no more
    /// input is available for this fill loop.
    fn next_batch(&mut self) -> Option<PacketBatch>;
}

/// The borrowed-packet slot: a batch can be taken exactly once.
impl PacketSupplier for Option<PacketBatch> {
    #[inline]
    fn next_batch(&mut self) -> Option<PacketBatch> {
        self.take()
    }
}

/// Outcome of one [`SampleConverter::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// Frames written to the output buffer.
    pub frames: usize,
    /// The supplier ran dry and nothing is left to produce from it.
    pub exhausted: bool,
}

/// Converts encoded input into canonical interleaved `f32` frames.
pub trait SampleConverter: Sized {
    /// Negotiates a conversion from `input` to `output`.
    fn new(input: &StreamDescription, output: &StreamDescription) -> Result<Self, EngineError>;

    /// Applies out-of-band codec configuration.
    fn set_magic_cookie(&mut self, cookie: &[u8]) -> Result<(), EngineError>;

    /// Largest number of output packets (frames) one fill call can produce.
    fn max_output_packet_size(&self) -> Result<u32, EngineError>;

    /// Converts a buffer of constant-size input packets in one step (PCM
    /// input). Converted samples are appended to `output`.
    fn convert_buffer(&mut self, input: &[u8], output: &mut Vec<f32>) -> Result<(), EngineError>;

    /// Produces up to `output.len() / channels` frames, pulling input from
    /// `supplier` as needed.
    fn fill(
        &mut self,
        supplier: &mut dyn PacketSupplier,
        output: &mut [f32],
    ) -> Result<Fill, EngineError>;

    /// Drops buffered input and codec history, keeping the negotiated formats.
    fn reset(&mut self) -> Result<(), EngineError>;
}

/// Renders an engine status code, as a four-character code when printable.
pub(crate) fn status_to_string(status: i32) -> String {
    match printable_four_cc(status as u32) {
        Some(code) => format!("{code} ({status})"),
        None => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_hands_out_batch_once() {
        let mut slot = Some(PacketBatch::new(&[1, 2, 3], &[]));
        assert!(slot.next_batch().is_some());
        assert!(slot.next_batch().is_none());
    }

    #[test]
    fn described_packets_are_sliced() {
        let batch = PacketBatch::new(
            &[1, 2, 3, 4, 5],
            &[
                PacketDescription {
                    start_offset: 0,
                    variable_frames: 0,
                    byte_size: 2,
                },
                PacketDescription {
                    start_offset: 2,
                    variable_frames: 0,
                    byte_size: 3,
                },
            ],
        );
        assert_eq!(batch.packet_count(0), 2);
        assert_eq!(batch.packet(1), Some(&[3, 4, 5][..]));
        assert_eq!(batch.packet(2), None);
    }

    #[test]
    fn constant_size_packets_are_counted() {
        let batch = PacketBatch::new(&[0; 12], &[]);
        assert_eq!(batch.packet_count(4), 3);
        assert_eq!(batch.packet_count(0), 1);
    }

    #[test]
    fn status_codes() {
        assert_eq!(status_to_string(-50), "-50");
        assert_eq!(
            status_to_string(i32::from_be_bytes(*b"!dat")),
            "'!dat' (560226676)"
        );
    }
}
