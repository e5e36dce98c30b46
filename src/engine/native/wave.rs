//! Incremental RIFF/WAVE parser.
//!
//! The parser walks the chunk list as bytes arrive, reports the `fmt ` chunk
//! as a data format and the start of the `data` chunk as the data offset, then
//! emits whole frames of audio as constant-size packets.

use tracing::{debug, trace};

use super::{ParsedStream, StreamParser};
use crate::engine::{PacketSeek, ParseListener, Property};
use crate::error::EngineError;
use crate::format::{CodecId, FileType, FormatFlags, StreamDescription};

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size written by encoders that do not know the final length of the chunk.
const UNKNOWN_CHUNK_SIZE: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RiffHeader,
    ChunkHeader,
    Fmt { size: u32 },
    Skip { remaining: u64 },
    /// `remaining` is `None` when the data chunk has no usable size.
    Data { remaining: Option<u64> },
    Done,
}

pub(crate) struct WaveParser {
    state: State,
    /// Unconsumed bytes; `buffer[0]` sits at absolute stream offset `offset`.
    buffer: Vec<u8>,
    offset: u64,
    format: Option<StreamDescription>,
    stream: ParsedStream,
    data_size: Option<u64>,
}

impl WaveParser {
    pub(crate) fn new() -> Self {
        WaveParser {
            state: State::RiffHeader,
            buffer: Vec::new(),
            offset: 0,
            format: None,
            stream: ParsedStream::default(),
            data_size: None,
        }
    }

    fn consume(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.offset += count as u64;
    }

    fn block_align(&self) -> u32 {
        self.format.map_or(0, |format| format.bytes_per_frame)
    }

    fn step(&mut self, listener: &mut dyn ParseListener) -> Result<bool, EngineError> {
        match self.state {
            State::RiffHeader => {
                if self.buffer.len() < RIFF_HEADER_LEN {
                    return Ok(false);
                }
                if &self.buffer[0..4] != b"RIFF" || &self.buffer[8..12] != b"WAVE" {
                    return Err(EngineError::InvalidData(
                        "missing RIFF/WAVE header".to_owned(),
                    ));
                }
                self.consume(RIFF_HEADER_LEN);
                self.state = State::ChunkHeader;
            }
            State::ChunkHeader => {
                if self.buffer.len() < CHUNK_HEADER_LEN {
                    return Ok(false);
                }
                let id: [u8; 4] = [self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]];
                let size = read_u32(&self.buffer[4..8]);
                self.consume(CHUNK_HEADER_LEN);
                trace!(chunk = %String::from_utf8_lossy(&id), size, "wave chunk");

                self.state = match &id {
                    b"fmt " => State::Fmt { size },
                    b"data" => self.enter_data(size, listener)?,
                    _ if size == UNKNOWN_CHUNK_SIZE => {
                        return Err(EngineError::InvalidData(
                            "unsized chunk before audio data".to_owned(),
                        ))
                    }
                    // chunks are padded to an even size
                    _ => State::Skip {
                        remaining: u64::from(size) + u64::from(size & 1),
                    },
                };
            }
            State::Fmt { size } => {
                let padded = size as usize + (size & 1) as usize;
                if self.buffer.len() < padded {
                    return Ok(false);
                }
                let format = parse_fmt(&self.buffer[..size as usize])?;
                debug!(
                    sample_rate = format.sample_rate,
                    channels = format.channels_per_frame,
                    bits = format.bits_per_channel,
                    "wave format"
                );
                self.format = Some(format);
                self.stream.format = Some(format);
                listener.property_changed(Property::DataFormat(format));
                self.consume(padded);
                self.state = State::ChunkHeader;
            }
            State::Skip { remaining } => {
                if self.buffer.is_empty() {
                    return Ok(false);
                }
                let count = remaining.min(self.buffer.len() as u64) as usize;
                self.consume(count);
                let remaining = remaining - count as u64;
                if remaining == 0 {
                    self.state = State::ChunkHeader;
                } else {
                    self.state = State::Skip { remaining };
                }
            }
            State::Data { remaining } => {
                let block_align = self.block_align() as usize;
                let available = match remaining {
                    Some(remaining) => remaining.min(self.buffer.len() as u64) as usize,
                    None => self.buffer.len(),
                };
                let whole = available - available % block_align;
                if whole == 0 {
                    if remaining == Some(0) {
                        self.state = State::Done;
                        return Ok(true);
                    }
                    return Ok(false);
                }
                listener.packets(&self.buffer[..whole], &[]);
                self.consume(whole);
                self.state = State::Data {
                    remaining: remaining.map(|remaining| remaining - whole as u64),
                };
            }
            State::Done => {
                // trailing chunks carry no audio
                let count = self.buffer.len();
                self.consume(count);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn enter_data(
        &mut self,
        size: u32,
        listener: &mut dyn ParseListener,
    ) -> Result<State, EngineError> {
        let format = self
            .format
            .ok_or_else(|| EngineError::InvalidData("data chunk before fmt chunk".to_owned()))?;

        let data_size = (size != UNKNOWN_CHUNK_SIZE).then_some(u64::from(size));
        self.data_size = data_size;
        self.stream.data_offset = Some(self.offset);
        self.stream.packet_count =
            data_size.map(|size| size / u64::from(format.bytes_per_packet));
        self.stream.bit_rate = Some(
            (format.sample_rate as u32)
                .saturating_mul(format.bytes_per_frame)
                .saturating_mul(8),
        );
        self.stream.ready = true;

        debug!(
            data_offset = self.offset,
            ?data_size,
            packet_count = ?self.stream.packet_count,
            "wave data chunk"
        );
        listener.property_changed(Property::DataOffset(self.offset));
        listener.property_changed(Property::ReadyToProducePackets);

        Ok(State::Data {
            remaining: data_size,
        })
    }
}

impl StreamParser for WaveParser {
    fn parse(
        &mut self,
        data: &[u8],
        _discontinuity: bool,
        listener: &mut dyn ParseListener,
    ) -> Result<(), EngineError> {
        self.buffer.extend_from_slice(data);
        while self.step(listener)? {}
        Ok(())
    }

    fn stream(&self) -> &ParsedStream {
        &self.stream
    }

    fn file_type(&self) -> FileType {
        FileType::WAVE
    }

    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError> {
        let (Some(format), Some(data_offset)) = (self.format, self.stream.data_offset) else {
            return Err(EngineError::Unavailable("seek before audio data"));
        };

        let mut byte_offset = packet.saturating_mul(u64::from(format.bytes_per_packet));
        if let Some(size) = self.data_size {
            byte_offset = byte_offset.min(size - size % u64::from(format.bytes_per_packet));
        }

        let offset = data_offset
            .checked_add(byte_offset)
            .ok_or(EngineError::Unavailable("seek target beyond the addressable stream"))?;

        self.buffer.clear();
        self.offset = offset;
        self.state = State::Data {
            remaining: self.data_size.map(|size| size - byte_offset),
        };

        Ok(PacketSeek {
            byte_offset,
            estimated: false,
        })
    }
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn parse_fmt(chunk: &[u8]) -> Result<StreamDescription, EngineError> {
    if chunk.len() < 16 {
        return Err(EngineError::InvalidData("fmt chunk too short".to_owned()));
    }

    let mut format_tag = read_u16(&chunk[0..2]);
    let channels = read_u16(&chunk[2..4]);
    let sample_rate = read_u32(&chunk[4..8]);
    let block_align = read_u16(&chunk[12..14]);
    let bits_per_sample = read_u16(&chunk[14..16]);

    if format_tag == WAVE_FORMAT_EXTENSIBLE {
        // cbSize(2) validBits(2) channelMask(4) subFormat GUID(16)
        if chunk.len() < 40 {
            return Err(EngineError::InvalidData(
                "extensible fmt chunk too short".to_owned(),
            ));
        }
        format_tag = read_u16(&chunk[24..26]);
    }

    if channels == 0 || sample_rate == 0 {
        return Err(EngineError::InvalidData(
            "fmt chunk without channels or sample rate".to_owned(),
        ));
    }
    let container_bytes = u32::from(block_align) / u32::from(channels);
    if container_bytes == 0 || u32::from(block_align) % u32::from(channels) != 0 {
        return Err(EngineError::InvalidData(format!(
            "block align {block_align} does not fit {channels} channels"
        )));
    }

    if u32::from(bits_per_sample) > container_bytes * 8 {
        return Err(EngineError::InvalidData(format!(
            "{bits_per_sample} bits per sample in {container_bytes}-byte containers"
        )));
    }

    let flags = match (format_tag, container_bytes) {
        (WAVE_FORMAT_PCM, 1) => FormatFlags::IS_PACKED,
        (WAVE_FORMAT_PCM, 2..=4) => FormatFlags::IS_SIGNED_INTEGER | FormatFlags::IS_PACKED,
        (WAVE_FORMAT_IEEE_FLOAT, 4 | 8) => FormatFlags::IS_FLOAT | FormatFlags::IS_PACKED,
        (tag, bytes) => {
            return Err(EngineError::Unsupported(format!(
                "wave format tag {tag:#06x} with {bytes}-byte samples"
            )))
        }
    };

    Ok(StreamDescription {
        sample_rate: f64::from(sample_rate),
        codec: CodecId::LINEAR_PCM,
        flags,
        bytes_per_packet: u32::from(block_align),
        frames_per_packet: 1,
        bytes_per_frame: u32::from(block_align),
        channels_per_frame: u32::from(channels),
        // samples are laid out by container size, valid bits are left-aligned
        bits_per_channel: container_bytes * 8,
    })
}
