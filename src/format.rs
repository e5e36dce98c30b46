//! Stream format descriptions.
//!
//! Formats are described the way container engines report them: a sample rate,
//! a codec identifier, and a packet/frame/byte layout. Identifiers are
//! four-character codes so that engine-reported values pass through unchanged.

use std::fmt;

use crate::common::{ChannelCount, SampleRate};

/// `code` quoted as four characters, when every byte is printable.
pub(crate) fn printable_four_cc(code: u32) -> Option<String> {
    let bytes = code.to_be_bytes();
    bytes
        .iter()
        .all(|&b| b.is_ascii_graphic() || b == b' ')
        .then(|| format!("'{}'", bytes.iter().map(|&b| b as char).collect::<String>()))
}

fn write_four_cc(f: &mut fmt::Formatter<'_>, code: u32) -> fmt::Result {
    match printable_four_cc(code) {
        Some(text) => f.write_str(&text),
        None => write!(f, "{code:#010x}"),
    }
}

/// Identifier of the encoding carried by a stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CodecId(pub u32);

impl CodecId {
    /// Uncompressed linear PCM, `'lpcm'`.
    pub const LINEAR_PCM: CodecId = CodecId(u32::from_be_bytes(*b"lpcm"));
    /// MPEG-4 AAC, `'aac '`.
    pub const AAC: CodecId = CodecId(u32::from_be_bytes(*b"aac "));
    /// MPEG-1/2 audio layer III, `'.mp3'`.
    pub const MP3: CodecId = CodecId(u32::from_be_bytes(*b".mp3"));
    /// FLAC, `'flac'`.
    pub const FLAC: CodecId = CodecId(u32::from_be_bytes(*b"flac"));
    /// Apple Lossless, `'alac'`.
    pub const ALAC: CodecId = CodecId(u32::from_be_bytes(*b"alac"));
}

impl fmt::Debug for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodecId(")?;
        write_four_cc(f, self.0)?;
        f.write_str(")")
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_four_cc(f, self.0)
    }
}

/// Identifier of a container family.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileType(pub u32);

impl FileType {
    /// RIFF/WAVE, `'WAVE'`.
    pub const WAVE: FileType = FileType(u32::from_be_bytes(*b"WAVE"));
    /// Raw AAC in ADTS framing, `'adts'`.
    pub const ADTS: FileType = FileType(u32::from_be_bytes(*b"adts"));
    /// MPEG audio elementary stream, `'MPG3'`.
    pub const MP3: FileType = FileType(u32::from_be_bytes(*b"MPG3"));
    /// MPEG-4 audio, `'m4af'`.
    pub const M4A: FileType = FileType(u32::from_be_bytes(*b"m4af"));
    /// Core Audio Format, `'caff'`.
    pub const CAF: FileType = FileType(u32::from_be_bytes(*b"caff"));
    /// FLAC, `'flac'`.
    pub const FLAC: FileType = FileType(u32::from_be_bytes(*b"flac"));
}

impl fmt::Debug for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileType(")?;
        write_four_cc(f, self.0)?;
        f.write_str(")")
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_four_cc(f, self.0)
    }
}

/// Opaque container-family hint handed to the engine when it is opened.
///
/// `0` asks the engine to detect the container on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileTypeHint(pub u32);

impl FileTypeHint {
    /// Let the engine detect the container.
    pub const AUTO: FileTypeHint = FileTypeHint(0);

    /// The container the hint names, or `None` for auto-detection.
    #[inline]
    pub fn file_type(self) -> Option<FileType> {
        (self.0 != 0).then_some(FileType(self.0))
    }
}

impl From<FileType> for FileTypeHint {
    #[inline]
    fn from(file_type: FileType) -> Self {
        FileTypeHint(file_type.0)
    }
}

/// Layout flags of a [`StreamDescription`]. Bit values follow the Core Audio
/// convention so they can be passed to native engines unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatFlags(pub u32);

impl FormatFlags {
    pub const IS_FLOAT: FormatFlags = FormatFlags(1 << 0);
    pub const IS_BIG_ENDIAN: FormatFlags = FormatFlags(1 << 1);
    pub const IS_SIGNED_INTEGER: FormatFlags = FormatFlags(1 << 2);
    pub const IS_PACKED: FormatFlags = FormatFlags(1 << 3);

    /// Packed float samples in the platform's byte order.
    pub const NATIVE_FLOAT_PACKED: FormatFlags = {
        #[cfg(target_endian = "big")]
        let flags = Self::IS_FLOAT.0 | Self::IS_PACKED.0 | Self::IS_BIG_ENDIAN.0;
        #[cfg(target_endian = "little")]
        let flags = Self::IS_FLOAT.0 | Self::IS_PACKED.0;
        FormatFlags(flags)
    };

    #[inline]
    pub const fn empty() -> Self {
        FormatFlags(0)
    }

    #[inline]
    pub const fn contains(self, other: FormatFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FormatFlags {
    type Output = FormatFlags;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        FormatFlags(self.0 | rhs.0)
    }
}

/// Description of an audio stream as reported by a container engine.
///
/// For compressed formats `bytes_per_packet` and `bytes_per_frame` are zero
/// when packets vary in size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StreamDescription {
    pub sample_rate: f64,
    pub codec: CodecId,
    pub flags: FormatFlags,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
}

impl StreamDescription {
    /// Whether the stream carries uncompressed linear PCM.
    #[inline]
    pub fn is_linear_pcm(&self) -> bool {
        self.codec == CodecId::LINEAR_PCM
    }

    /// The canonical output format for this input: same rate and channel
    /// count, packed native `f32`, one frame per packet.
    pub fn canonical(&self) -> StreamDescription {
        let bytes_per_frame = std::mem::size_of::<f32>() as u32 * self.channels_per_frame;
        StreamDescription {
            sample_rate: self.sample_rate,
            codec: CodecId::LINEAR_PCM,
            flags: FormatFlags::NATIVE_FLOAT_PACKED,
            bytes_per_packet: bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_frame,
            channels_per_frame: self.channels_per_frame,
            bits_per_channel: 32,
        }
    }
}

/// Sample encoding of decoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    /// Interleaved native-endian `f32`.
    F32,
}

/// What [`Decoder::format`](crate::Decoder::format) reports about an open stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub channels: ChannelCount,
    pub sample_rate: SampleRate,
    /// Always [`SampleFormat::F32`]: output is canonical.
    pub sample_format: SampleFormat,
    /// Stream length in output frames; exact or estimated depending on what
    /// the container reports.
    pub length_in_frames: u64,
    /// Encoding of the input stream.
    pub codec: CodecId,
    /// Container family, when the engine reports it.
    pub file_type: Option<FileType>,
}

/// Exact stream length from a packet count.
#[inline]
pub fn length_from_packets(packet_count: u64, frames_per_packet: u32) -> u64 {
    packet_count.saturating_mul(u64::from(frames_per_packet))
}

/// Estimated stream length from the byte length of the source.
///
/// `ceil(((byte_len - data_offset) / (bit_rate / 8)) * sample_rate)`. Returns
/// `None` when the bit rate is below one byte per second.
pub fn length_from_bit_rate(
    byte_len: u64,
    data_offset: u64,
    bit_rate: u32,
    sample_rate: f64,
) -> Option<u64> {
    let bytes_per_second = bit_rate / 8;
    if bytes_per_second == 0 {
        return None;
    }

    let audio_bytes = byte_len.saturating_sub(data_offset);
    let seconds = audio_bytes as f64 / f64::from(bytes_per_second);
    Some((seconds * sample_rate).ceil() as u64)
}
