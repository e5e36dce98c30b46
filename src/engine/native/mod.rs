//! Portable container engine written in Rust.
//!
//! Supports RIFF/WAVE with PCM or float samples, ADTS-framed AAC and MPEG
//! audio layer III. Compressed packets are decoded with symphonia's codecs
//! (`aac` and `mp3` features).

mod adts;
mod converter;
mod framed;
mod mpeg;
mod wave;

use tracing::{debug, trace};

pub use self::converter::NativeConverter;
use self::{
    adts::Adts,
    framed::{FrameFormat, FramedParser},
    mpeg::Mpeg,
    wave::WaveParser,
};
use super::{ContainerEngine, PacketSeek, ParseFlags, ParseListener};
use crate::error::EngineError;
use crate::format::{FileType, FileTypeHint, StreamDescription};

/// Bytes needed to recognize a RIFF container.
const SNIFF_LEN: usize = 12;

/// Bytes searched for a frame header before a stream counts as unrecognized.
const SYNC_SEARCH_LEN: usize = 4096;

/// Stream properties a parser has learned so far.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedStream {
    pub format: Option<StreamDescription>,
    pub ready: bool,
    pub data_offset: Option<u64>,
    pub packet_count: Option<u64>,
    pub bit_rate: Option<u32>,
}

/// One container format's incremental parser.
pub(crate) trait StreamParser {
    fn parse(
        &mut self,
        data: &[u8],
        discontinuity: bool,
        listener: &mut dyn ParseListener,
    ) -> Result<(), EngineError>;

    fn stream(&self) -> &ParsedStream;

    fn file_type(&self) -> FileType;

    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError>;
}

enum Container {
    Wave(WaveParser),
    Adts(FramedParser<Adts>),
    Mpeg(FramedParser<Mpeg>),
}

impl Container {
    fn for_file_type(file_type: FileType) -> Option<Self> {
        match file_type {
            FileType::WAVE => Some(Container::Wave(WaveParser::new())),
            FileType::ADTS => Some(Container::Adts(FramedParser::new())),
            FileType::MP3 => Some(Container::Mpeg(FramedParser::new())),
            _ => None,
        }
    }

    fn parser(&self) -> &dyn StreamParser {
        match self {
            Container::Wave(parser) => parser,
            Container::Adts(parser) => parser,
            Container::Mpeg(parser) => parser,
        }
    }

    fn parser_mut(&mut self) -> &mut dyn StreamParser {
        match self {
            Container::Wave(parser) => parser,
            Container::Adts(parser) => parser,
            Container::Mpeg(parser) => parser,
        }
    }
}

/// Detects the container from the first bytes of a stream.
///
/// Frame-based streams may be preceded by junk; the first
/// [`SYNC_SEARCH_LEN`] bytes are searched for a valid frame header. Returns
/// `Ok(None)` while there are too few bytes to decide.
fn sniff(bytes: &[u8]) -> Result<Option<FileType>, EngineError> {
    if bytes.starts_with(b"RIFF") {
        if bytes.len() < SNIFF_LEN {
            return Ok(None);
        }
        return if &bytes[8..12] == b"WAVE" {
            Ok(Some(FileType::WAVE))
        } else {
            Err(EngineError::Unsupported("RIFF container without WAVE form".to_owned()))
        };
    }
    if bytes.len() < 4 {
        return Ok(None);
    }
    if bytes.starts_with(b"ID3") {
        return Ok(Some(FileType::MP3));
    }

    for start in 0..bytes.len().min(SYNC_SEARCH_LEN) {
        let rest = &bytes[start..];
        if rest[0] != 0xFF {
            continue;
        }
        if Adts::parse_header(rest).is_some() {
            return Ok(Some(FileType::ADTS));
        }
        if Mpeg::parse_header(rest).is_some() {
            return Ok(Some(FileType::MP3));
        }
        if rest.len() < Adts::HEADER_LEN {
            // possibly a header cut short
            return Ok(None);
        }
    }

    if bytes.len() >= SYNC_SEARCH_LEN {
        Err(EngineError::InvalidData("unrecognized container".to_owned()))
    } else {
        Ok(None)
    }
}

/// The portable engine.
pub struct NativeEngine {
    container: Option<Container>,
    /// Bytes held back until the container is recognized.
    sniffed: Vec<u8>,
    expected_offset: Option<u64>,
}

impl NativeEngine {
    fn stream(&self) -> Option<&ParsedStream> {
        self.container.as_ref().map(|container| container.parser().stream())
    }
}

impl ContainerEngine for NativeEngine {
    type Converter = NativeConverter;

    fn open(hint: FileTypeHint) -> Result<Self, EngineError> {
        let container = hint.file_type().and_then(Container::for_file_type);
        match (hint.file_type(), &container) {
            (Some(file_type), None) => {
                debug!(%file_type, "no parser for file type hint, detecting container")
            }
            (Some(file_type), Some(_)) => debug!(%file_type, "parser selected by hint"),
            (None, _) => {}
        }

        Ok(NativeEngine {
            container,
            sniffed: Vec::new(),
            expected_offset: None,
        })
    }

    fn parse_bytes(
        &mut self,
        data: &[u8],
        flags: ParseFlags,
        listener: &mut dyn ParseListener,
    ) -> Result<(), EngineError> {
        self.expected_offset = None;
        let discontinuity = flags.contains(ParseFlags::DISCONTINUITY);

        if let Some(container) = &mut self.container {
            return container.parser_mut().parse(data, discontinuity, listener);
        }

        self.sniffed.extend_from_slice(data);
        let Some(file_type) = sniff(&self.sniffed)? else {
            return Ok(());
        };
        debug!(%file_type, "container detected");

        let container = self
            .container
            .insert(Container::for_file_type(file_type).ok_or(EngineError::Unavailable(
                "no parser for detected container",
            ))?);
        let sniffed = std::mem::take(&mut self.sniffed);
        container.parser_mut().parse(&sniffed, discontinuity, listener)
    }

    fn is_ready(&self) -> bool {
        self.stream().is_some_and(|stream| stream.ready)
    }

    fn data_format(&self) -> Option<StreamDescription> {
        self.stream()?.format
    }

    fn file_type(&self) -> Option<FileType> {
        self.container
            .as_ref()
            .map(|container| container.parser().file_type())
    }

    fn data_offset(&self) -> Option<u64> {
        self.stream()?.data_offset
    }

    fn packet_count(&self) -> Option<u64> {
        self.stream()?.packet_count
    }

    fn bit_rate(&self) -> Option<u32> {
        self.stream()?.bit_rate
    }

    fn expected_offset(&self) -> Option<u64> {
        self.expected_offset
    }

    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError> {
        let container = self
            .container
            .as_mut()
            .ok_or(EngineError::Unavailable("seek before the container is known"))?;
        let seek = container.parser_mut().seek_to_packet(packet)?;

        let data_offset = container.parser().stream().data_offset.unwrap_or(0);
        self.expected_offset = Some(
            data_offset
                .checked_add(seek.byte_offset)
                .ok_or(EngineError::Unavailable("seek target beyond the addressable stream"))?,
        );
        trace!(packet, ?seek, "engine seek");
        Ok(seek)
    }

    fn close(self) -> Result<(), EngineError> {
        Ok(())
    }
}
