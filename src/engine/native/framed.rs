//! Parser for elementary streams made of self-describing frames (ADTS, MPEG
//! audio).
//!
//! Each frame starts with a sync word and a header that gives the frame
//! length. The parser locks on to the first valid header, then walks frame by
//! frame. Bytes that do not start a header compatible with the locked stream
//! are skipped one at a time until sync is found again.

use tracing::{debug, trace, warn};

use super::{ParsedStream, StreamParser};
use crate::engine::{PacketDescription, PacketSeek, ParseListener, Property};
use crate::error::EngineError;
use crate::format::{CodecId, FileType, FormatFlags, StreamDescription};

/// What a frame header tells about its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    /// Total length of the frame, header included.
    pub frame_len: usize,
    /// Header bytes to strip before handing the payload to the codec.
    pub strip_len: usize,
    pub sample_rate: u32,
    pub channels: u32,
    pub frames_per_packet: u32,
    /// Bit rate declared by the header, if it declares one.
    pub bit_rate: Option<u32>,
    /// Value that must stay identical between frames of one stream.
    pub stream_key: u32,
}

/// A family of frame-based streams.
pub(crate) trait FrameFormat {
    const FILE_TYPE: FileType;
    const CODEC: CodecId;
    /// Bytes needed to decode a header.
    const HEADER_LEN: usize;

    fn parse_header(bytes: &[u8]) -> Option<FrameHeader>;

    /// Length of a leading tag to skip at `bytes`, or `Err(())` if more bytes
    /// are needed to tell. `Ok(0)` means there is no tag.
    fn tag_len(bytes: &[u8]) -> Result<usize, ()>;

    fn magic_cookie(header: &FrameHeader, first_frame: &[u8]) -> Option<Vec<u8>>;
}

pub(crate) struct FramedParser<F> {
    buffer: Vec<u8>,
    offset: u64,
    locked: Option<FrameHeader>,
    resync: bool,
    /// The buffer starts where the last seek placed it.
    at_seek_target: bool,
    stream: ParsedStream,
    total_frames: u64,
    total_bytes: u64,
    tags_done: bool,
    _format: std::marker::PhantomData<F>,
}

impl<F: FrameFormat> FramedParser<F> {
    pub(crate) fn new() -> Self {
        FramedParser {
            buffer: Vec::new(),
            offset: 0,
            locked: None,
            resync: false,
            at_seek_target: false,
            stream: ParsedStream::default(),
            total_frames: 0,
            total_bytes: 0,
            tags_done: false,
            _format: std::marker::PhantomData,
        }
    }

    fn consume(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.offset += count as u64;
    }

    fn skip_tags(&mut self) -> bool {
        while !self.tags_done {
            match F::tag_len(&self.buffer) {
                Err(()) => return false,
                Ok(0) => self.tags_done = true,
                Ok(len) if len <= self.buffer.len() => {
                    trace!(len, "skipping tag");
                    self.consume(len);
                }
                Ok(_) => return false,
            }
        }
        true
    }

    fn accepts(&self, header: &FrameHeader) -> bool {
        self.locked
            .map_or(true, |locked| locked.stream_key == header.stream_key)
    }

    fn lock(&mut self, header: FrameHeader, listener: &mut dyn ParseListener) {
        let format = StreamDescription {
            sample_rate: f64::from(header.sample_rate),
            codec: F::CODEC,
            flags: FormatFlags::empty(),
            bytes_per_packet: 0,
            frames_per_packet: header.frames_per_packet,
            bytes_per_frame: 0,
            channels_per_frame: header.channels,
            bits_per_channel: 0,
        };
        debug!(
            file_type = %F::FILE_TYPE,
            sample_rate = header.sample_rate,
            channels = header.channels,
            data_offset = self.offset,
            "frame stream locked"
        );

        self.locked = Some(header);
        self.stream.format = Some(format);
        self.stream.data_offset = Some(self.offset);
        self.stream.bit_rate = header.bit_rate;
        self.stream.ready = true;

        listener.property_changed(Property::DataFormat(format));
        if let Some(cookie) = F::magic_cookie(&header, &self.buffer[..header.frame_len]) {
            listener.property_changed(Property::MagicCookie(&cookie));
        }
        listener.property_changed(Property::DataOffset(self.offset));
        listener.property_changed(Property::ReadyToProducePackets);
    }

    /// Collects every complete frame at the front of the buffer.
    fn collect(&mut self, listener: &mut dyn ParseListener) {
        let mut packets = Vec::new();
        let mut descriptions = Vec::new();
        let mut skipped = 0usize;

        loop {
            if self.buffer.len() < F::HEADER_LEN {
                break;
            }
            let at_seek_target = std::mem::take(&mut self.at_seek_target);
            let header = match F::parse_header(&self.buffer) {
                Some(header) if self.accepts(&header) => header,
                _ => {
                    if self.locked.is_some() {
                        self.resync = true;
                    }
                    self.consume(1);
                    skipped += 1;
                    continue;
                }
            };
            if self.buffer.len() < header.frame_len {
                self.at_seek_target = at_seek_target;
                break;
            }
            // a header right at the seek target is trusted unconfirmed
            if self.resync && !at_seek_target && !self.confirmed(&header) {
                if self.buffer.len() < header.frame_len + F::HEADER_LEN {
                    break;
                }
                self.consume(1);
                skipped += 1;
                continue;
            }
            self.resync = false;

            if self.locked.is_none() {
                self.lock(header, listener);
            }

            let payload = &self.buffer[header.strip_len..header.frame_len];
            descriptions.push(PacketDescription {
                start_offset: packets.len() as u64,
                variable_frames: 0,
                byte_size: payload.len() as u32,
            });
            packets.extend_from_slice(payload);

            self.total_frames += 1;
            self.total_bytes += header.frame_len as u64;
            self.consume(header.frame_len);
        }

        if skipped > 0 {
            warn!(skipped, offset = self.offset, "skipped bytes while searching for frame sync");
        }
        if !descriptions.is_empty() {
            if self.locked.is_some_and(|locked| locked.bit_rate.is_none()) {
                self.stream.bit_rate = self.average_bit_rate();
            }
            trace!(packets = descriptions.len(), bytes = packets.len(), "frames parsed");
            listener.packets(&packets, &descriptions);
        }
    }

    /// After a discontinuity a header is only trusted when the next header
    /// follows where it says.
    fn confirmed(&self, header: &FrameHeader) -> bool {
        F::parse_header(&self.buffer[header.frame_len..])
            .is_some_and(|next| next.stream_key == header.stream_key)
    }

    fn average_frame_len(&self) -> Option<u64> {
        (self.total_frames > 0).then(|| self.total_bytes / self.total_frames)
    }

    fn average_bit_rate(&self) -> Option<u32> {
        let locked = self.locked?;
        let samples = self.total_frames * u64::from(locked.frames_per_packet);
        if samples == 0 {
            return None;
        }
        let bits = self.total_bytes * 8 * u64::from(locked.sample_rate);
        u32::try_from(bits / samples).ok()
    }
}

impl<F: FrameFormat> StreamParser for FramedParser<F> {
    fn parse(
        &mut self,
        data: &[u8],
        discontinuity: bool,
        listener: &mut dyn ParseListener,
    ) -> Result<(), EngineError> {
        if discontinuity {
            self.buffer.clear();
            self.resync = self.locked.is_some();
        }
        self.buffer.extend_from_slice(data);

        if !self.skip_tags() {
            return Ok(());
        }
        self.collect(listener);
        Ok(())
    }

    fn stream(&self) -> &ParsedStream {
        &self.stream
    }

    fn file_type(&self) -> FileType {
        F::FILE_TYPE
    }

    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError> {
        let data_offset = self
            .stream
            .data_offset
            .ok_or(EngineError::Unavailable("seek before audio data"))?;
        let frame_len = self
            .average_frame_len()
            .ok_or(EngineError::Unavailable("seek before any frame was parsed"))?;

        let byte_offset = packet.saturating_mul(frame_len);
        let offset = data_offset
            .checked_add(byte_offset)
            .ok_or(EngineError::Unavailable("seek target beyond the addressable stream"))?;
        self.buffer.clear();
        self.offset = offset;
        self.resync = byte_offset > 0;
        self.at_seek_target = true;

        Ok(PacketSeek {
            byte_offset,
            estimated: byte_offset > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::native::{adts::Adts, mpeg::Mpeg};

    #[derive(Default)]
    struct Recorded {
        packets: Vec<Vec<u8>>,
        cookies: Vec<Vec<u8>>,
        data_offsets: Vec<u64>,
        ready: bool,
    }

    impl ParseListener for Recorded {
        fn property_changed(&mut self, property: Property<'_>) {
            match property {
                Property::MagicCookie(cookie) => self.cookies.push(cookie.to_vec()),
                Property::DataOffset(offset) => self.data_offsets.push(offset),
                Property::ReadyToProducePackets => self.ready = true,
                Property::DataFormat(_) => {}
            }
        }

        fn packets(&mut self, data: &[u8], descriptions: &[PacketDescription]) {
            for description in descriptions {
                let start = description.start_offset as usize;
                let end = start + description.byte_size as usize;
                self.packets.push(data[start..end].to_vec());
            }
        }
    }

    /// MPEG-1 layer III, 128 kbit/s, 44.1 kHz: 417 bytes, payload filled
    /// with `fill`.
    fn mpeg_frame(fill: u8) -> Vec<u8> {
        let mut frame = vec![0xFF, 0xFB, 0x90, 0x44];
        frame.resize(417, fill);
        frame
    }

    /// AAC-LC, 44.1 kHz, stereo, payload filled with `fill`.
    fn adts_frame(frame_len: usize, fill: u8) -> Vec<u8> {
        let mut frame = vec![
            0xFF,
            0xF1,
            (1 << 6) | (4 << 2),
            (2 << 6) | ((frame_len >> 11) & 0x03) as u8,
            ((frame_len >> 3) & 0xFF) as u8,
            (((frame_len & 0x07) << 5) as u8) | 0x1F,
            0xFC,
        ];
        frame.resize(frame_len, fill);
        frame
    }

    fn mpeg_stream(frames: u8) -> Vec<u8> {
        (0..frames).flat_map(mpeg_frame).collect()
    }

    #[test]
    fn seek_to_the_last_frame_yields_it() {
        let stream = mpeg_stream(3);
        let mut parser = FramedParser::<Mpeg>::new();
        let mut listener = Recorded::default();
        parser.parse(&stream, false, &mut listener).unwrap();
        assert_eq!(listener.packets.len(), 3);

        let seek = parser.seek_to_packet(2).unwrap();
        assert_eq!(
            seek,
            PacketSeek {
                byte_offset: 834,
                estimated: true
            }
        );

        listener.packets.clear();
        parser.parse(&stream[834..], true, &mut listener).unwrap();
        assert_eq!(listener.packets, vec![mpeg_frame(2)]);
    }

    #[test]
    fn seek_target_survives_a_split_header() {
        let stream = mpeg_stream(3);
        let mut parser = FramedParser::<Mpeg>::new();
        let mut listener = Recorded::default();
        parser.parse(&stream, false, &mut listener).unwrap();
        parser.seek_to_packet(2).unwrap();

        listener.packets.clear();
        parser.parse(&stream[834..836], true, &mut listener).unwrap();
        parser.parse(&stream[836..], false, &mut listener).unwrap();
        assert_eq!(listener.packets.len(), 1);
    }

    #[test]
    fn missed_frame_boundary_resyncs_on_a_confirmed_header() {
        let stream = mpeg_stream(4);
        let mut parser = FramedParser::<Mpeg>::new();
        let mut listener = Recorded::default();
        parser.parse(&stream, false, &mut listener).unwrap();
        parser.seek_to_packet(1).unwrap();

        // lands inside frame 1 instead of at its header
        listener.packets.clear();
        parser.parse(&stream[420..], true, &mut listener).unwrap();
        assert_eq!(listener.packets, vec![mpeg_frame(2), mpeg_frame(3)]);
    }

    #[test]
    fn unconfirmed_header_waits_for_its_successor() {
        let stream = mpeg_stream(3);
        let mut parser = FramedParser::<Mpeg>::new();
        let mut listener = Recorded::default();
        parser.parse(&stream[..417], false, &mut listener).unwrap();

        // discontinuity without a seek, header not yet confirmed
        listener.packets.clear();
        parser.parse(&stream[417..834], true, &mut listener).unwrap();
        assert!(listener.packets.is_empty());
        parser.parse(&stream[834..], false, &mut listener).unwrap();
        assert_eq!(listener.packets, vec![mpeg_frame(1), mpeg_frame(2)]);
    }

    #[test]
    fn skips_junk_between_frames() {
        let mut stream = mpeg_stream(2);
        stream.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9A]);
        stream.extend(mpeg_stream(2));

        let mut parser = FramedParser::<Mpeg>::new();
        let mut listener = Recorded::default();
        for chunk in stream.chunks(100) {
            parser.parse(chunk, false, &mut listener).unwrap();
        }
        assert_eq!(listener.packets.len(), 4);
        assert_eq!(listener.data_offsets, vec![0]);
    }

    #[test]
    fn id3_tag_split_across_parses_is_skipped() {
        let mut stream = b"ID3\x04\x00\x00".to_vec();
        stream.extend_from_slice(&[0, 0, 0, 20]);
        stream.extend_from_slice(&[0; 20]);
        stream.extend(mpeg_stream(2));

        let mut parser = FramedParser::<Mpeg>::new();
        let mut listener = Recorded::default();
        for chunk in [&stream[..5], &stream[5..20], &stream[20..]] {
            parser.parse(chunk, false, &mut listener).unwrap();
        }

        assert_eq!(parser.stream().data_offset, Some(30));
        assert_eq!(listener.data_offsets, vec![30]);
        assert!(listener.ready);
        assert_eq!(listener.packets, vec![mpeg_frame(0), mpeg_frame(1)]);
    }

    #[test]
    fn adts_bit_rate_is_averaged_over_parsed_frames() {
        let stream: Vec<u8> = [371, 380, 371, 380]
            .into_iter()
            .enumerate()
            .flat_map(|(index, len)| adts_frame(len, index as u8))
            .collect();

        let mut parser = FramedParser::<Adts>::new();
        let mut listener = Recorded::default();
        parser.parse(&stream, false, &mut listener).unwrap();

        // 1502 bytes over 4 * 1024 frames at 44.1 kHz
        assert_eq!(parser.stream().bit_rate, Some(129_371));
        assert_eq!(listener.cookies, vec![vec![0x12, 0x10]]);
        // headers are stripped from ADTS payloads
        assert_eq!(listener.packets[1].len(), 373);

        let seek = parser.seek_to_packet(2).unwrap();
        assert_eq!(
            seek,
            PacketSeek {
                byte_offset: 2 * 375,
                estimated: true
            }
        );
    }

    #[test]
    fn seek_before_any_frame_is_unavailable() {
        let mut parser = FramedParser::<Adts>::new();
        assert!(matches!(
            parser.seek_to_packet(0),
            Err(EngineError::Unavailable(_))
        ));
    }
}
