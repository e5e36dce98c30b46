#![allow(dead_code)]
/// in separate folder so its not ran as integration test
use std::io::{self, Cursor};

use stream_decoder::engine::{
    ContainerEngine, Fill, PacketDescription, PacketSeek, PacketSupplier, ParseFlags,
    ParseListener, Property, SampleConverter,
};
use stream_decoder::{
    CodecId, EngineError, FileType, FileTypeHint, FormatFlags, FrameSink, HostIo, SeekError,
    SeekOrigin, StreamDescription, StreamPosition,
};

/// A canonical 44-byte header followed by little-endian 16-bit samples.
pub fn pcm16_wav(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    pcm16_wav_with_data_size(channels, sample_rate, samples, (samples.len() * 2) as u32)
}

/// Like [`pcm16_wav`] but with the data chunk size field set to `data_size`,
/// e.g. `0xFFFF_FFFF` for a stream of unknown length.
pub fn pcm16_wav_with_data_size(
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
    data_size: u32,
) -> Vec<u8> {
    let block_align = channels * 2;
    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + samples.len() as u32 * 2).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// WAVE bytes written by hound.
pub fn hound_wav<S: hound::Sample + Copy>(spec: hound::WavSpec, samples: &[S]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A ramp of `frames` interleaved frames, distinct per channel.
pub fn ramp(frames: usize, channels: u16) -> Vec<i16> {
    (0..frames * channels as usize)
        .map(|i| (i as i32 * 37 % 65_536 - 32_768) as i16)
        .collect()
}

/// In-memory byte source whose failures are scripted.
#[derive(Debug, Clone)]
pub struct ScriptedHost {
    data: Vec<u8>,
    position: usize,
    report_length: bool,
    tell_fails: bool,
    seekable: bool,
    fail_reads_at: Option<usize>,
    stall_at: Option<usize>,
    /// Every successful seek target.
    pub seeks: Vec<u64>,
    /// Every requested read length.
    pub reads: Vec<usize>,
}

impl ScriptedHost {
    pub fn new(data: Vec<u8>) -> Self {
        ScriptedHost {
            data,
            position: 0,
            report_length: true,
            tell_fails: false,
            seekable: true,
            fail_reads_at: None,
            stall_at: None,
            seeks: Vec::new(),
            reads: Vec::new(),
        }
    }

    /// `tell` succeeds but reports an unknown length.
    pub fn without_length(mut self) -> Self {
        self.report_length = false;
        self
    }

    pub fn failing_tell(mut self) -> Self {
        self.tell_fails = true;
        self
    }

    pub fn unseekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Reads that would cross `offset` fail.
    pub fn failing_reads_at(mut self, offset: usize) -> Self {
        self.fail_reads_at = Some(offset);
        self
    }

    /// Reads return no data once `offset` is reached, as if the rest had not
    /// arrived yet.
    pub fn stalled_at(mut self, offset: usize) -> Self {
        self.stall_at = Some(offset);
        self
    }

    /// Moves or lifts the stall point of a live host.
    pub fn set_stall(&mut self, offset: Option<usize>) {
        self.stall_at = offset;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl HostIo for ScriptedHost {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.push(buf.len());
        let mut end = (self.position + buf.len()).min(self.data.len());
        if let Some(fail_at) = self.fail_reads_at {
            if end > fail_at {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted failure"));
            }
        }
        if let Some(stall_at) = self.stall_at {
            end = end.min(stall_at.max(self.position));
        }
        let count = end - self.position;
        buf[..count].copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(count)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<(), SeekError> {
        if !self.seekable {
            return Err(SeekError::Unsupported);
        }
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.position as i64,
        };
        let target = base + offset;
        if target < 0 || target as usize > self.data.len() {
            return Err(SeekError::Failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek out of range",
            )));
        }
        self.position = target as usize;
        self.seeks.push(target as u64);
        Ok(())
    }

    fn tell(&mut self) -> io::Result<StreamPosition> {
        if self.tell_fails {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "no tell"));
        }
        Ok(StreamPosition {
            position: self.position as u64,
            length: self.report_length.then_some(self.data.len() as u64),
        })
    }
}

/// Records every sink callback.
#[derive(Debug, Default)]
pub struct Collector {
    /// Frame count of each callback, in order.
    pub calls: Vec<usize>,
    pub samples: Vec<f32>,
}

impl FrameSink for Collector {
    fn frames_decoded(&mut self, frame_count: usize, samples: &[f32]) {
        self.calls.push(frame_count);
        self.samples.extend_from_slice(samples);
    }
}

/// Header that makes [`MockEngine`] ready.
pub const MOCK_HEADER: &[u8] = b"MOCK";

/// Frames each mock packet decodes to.
pub const MOCK_FRAMES_PER_PACKET: u32 = 4;

/// A compressed mono container: the 4-byte [`MOCK_HEADER`] followed by
/// one-byte packets. Packet `n` decodes to frames `4n .. 4n + 4`, each
/// sample holding its own frame index.
#[derive(Debug)]
pub struct MockEngine {
    codec: CodecId,
    header_seen: usize,
    rejected: bool,
    ready: bool,
    bit_rate: Option<u32>,
    packet_count: Option<u64>,
    expected_offset: Option<u64>,
    /// Packet index of the next byte.
    next_packet: u64,
    /// Flags of every parse call.
    pub flags: Vec<ParseFlags>,
    pub closed_with_error: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        MockEngine {
            codec: CodecId::AAC,
            header_seen: 0,
            rejected: false,
            ready: false,
            bit_rate: None,
            packet_count: None,
            expected_offset: None,
            next_packet: 0,
            flags: Vec::new(),
            closed_with_error: false,
        }
    }

    pub fn with_codec(mut self, codec: CodecId) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn with_packet_count(mut self, packet_count: u64) -> Self {
        self.packet_count = Some(packet_count);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.closed_with_error = true;
        self
    }

    pub fn format(&self) -> StreamDescription {
        StreamDescription {
            sample_rate: 8_000.0,
            codec: self.codec,
            flags: FormatFlags::empty(),
            bytes_per_packet: 1,
            frames_per_packet: MOCK_FRAMES_PER_PACKET,
            bytes_per_frame: 0,
            channels_per_frame: 1,
            bits_per_channel: 0,
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine for MockEngine {
    type Converter = MockConverter;

    fn open(_hint: FileTypeHint) -> Result<Self, EngineError> {
        Ok(MockEngine::new())
    }

    fn parse_bytes(
        &mut self,
        mut data: &[u8],
        flags: ParseFlags,
        listener: &mut dyn ParseListener,
    ) -> Result<(), EngineError> {
        self.flags.push(flags);
        self.expected_offset = None;
        if self.rejected {
            return Ok(());
        }

        if self.header_seen < MOCK_HEADER.len() {
            let count = (MOCK_HEADER.len() - self.header_seen).min(data.len());
            if data[..count] != MOCK_HEADER[self.header_seen..self.header_seen + count] {
                // not ours; stay unready forever
                self.rejected = true;
                return Ok(());
            }
            self.header_seen += count;
            data = &data[count..];
            if self.header_seen < MOCK_HEADER.len() {
                return Ok(());
            }

            listener.property_changed(Property::DataFormat(self.format()));
            listener.property_changed(Property::DataOffset(MOCK_HEADER.len() as u64));
            self.ready = true;
            listener.property_changed(Property::ReadyToProducePackets);
        }

        if data.is_empty() {
            return Ok(());
        }
        // Each packet carries its own index so the converter can number frames
        let bytes: Vec<u8> = (0..data.len() as u64)
            .map(|i| (self.next_packet + i) as u8)
            .collect();
        let descriptions: Vec<PacketDescription> = (0..data.len() as u64)
            .map(|i| PacketDescription {
                start_offset: i,
                variable_frames: 0,
                byte_size: 1,
            })
            .collect();
        self.next_packet += data.len() as u64;
        listener.packets(&bytes, &descriptions);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn data_format(&self) -> Option<StreamDescription> {
        self.ready.then(|| self.format())
    }

    fn file_type(&self) -> Option<FileType> {
        None
    }

    fn data_offset(&self) -> Option<u64> {
        self.ready.then_some(MOCK_HEADER.len() as u64)
    }

    fn packet_count(&self) -> Option<u64> {
        self.packet_count
    }

    fn bit_rate(&self) -> Option<u32> {
        self.bit_rate
    }

    fn expected_offset(&self) -> Option<u64> {
        self.expected_offset
    }

    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError> {
        self.next_packet = packet;
        self.expected_offset = Some(MOCK_HEADER.len() as u64 + packet);
        Ok(PacketSeek {
            byte_offset: packet,
            estimated: false,
        })
    }

    fn close(self) -> Result<(), EngineError> {
        if self.closed_with_error {
            Err(EngineError::Unavailable("scripted close failure"))
        } else {
            Ok(())
        }
    }
}

/// Decodes [`MockEngine`] packets one per fill call.
#[derive(Debug)]
pub struct MockConverter {
    pending: Vec<u8>,
    pub resets: usize,
}

impl SampleConverter for MockConverter {
    fn new(input: &StreamDescription, _output: &StreamDescription) -> Result<Self, EngineError> {
        if input.codec == CodecId::ALAC {
            return Err(EngineError::Unsupported("mock cannot decode ALAC".to_owned()));
        }
        Ok(MockConverter {
            pending: Vec::new(),
            resets: 0,
        })
    }

    fn set_magic_cookie(&mut self, _cookie: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }

    fn max_output_packet_size(&self) -> Result<u32, EngineError> {
        Ok(MOCK_FRAMES_PER_PACKET)
    }

    fn convert_buffer(&mut self, _input: &[u8], _output: &mut Vec<f32>) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("mock packets need the pull path".to_owned()))
    }

    fn fill(
        &mut self,
        supplier: &mut dyn PacketSupplier,
        output: &mut [f32],
    ) -> Result<Fill, EngineError> {
        if self.pending.is_empty() {
            match supplier.next_batch() {
                Some(batch) => self.pending = batch.data,
                None => {
                    return Ok(Fill {
                        frames: 0,
                        exhausted: true,
                    })
                }
            }
        }

        let packet = self.pending.remove(0);
        let first = u32::from(packet) * MOCK_FRAMES_PER_PACKET;
        let frames = (MOCK_FRAMES_PER_PACKET as usize).min(output.len());
        for (i, sample) in output[..frames].iter_mut().enumerate() {
            *sample = (first + i as u32) as f32;
        }
        Ok(Fill {
            frames,
            exhausted: false,
        })
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.pending.clear();
        self.resets += 1;
        Ok(())
    }
}

/// Wraps an engine and records the flags of every parse call.
pub struct Recording<E> {
    pub inner: E,
    pub flags: Vec<ParseFlags>,
}

impl<E: ContainerEngine> ContainerEngine for Recording<E> {
    type Converter = E::Converter;

    fn open(hint: FileTypeHint) -> Result<Self, EngineError> {
        Ok(Recording {
            inner: E::open(hint)?,
            flags: Vec::new(),
        })
    }

    fn parse_bytes(
        &mut self,
        data: &[u8],
        flags: ParseFlags,
        listener: &mut dyn ParseListener,
    ) -> Result<(), EngineError> {
        self.flags.push(flags);
        self.inner.parse_bytes(data, flags, listener)
    }

    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn data_format(&self) -> Option<StreamDescription> {
        self.inner.data_format()
    }

    fn file_type(&self) -> Option<FileType> {
        self.inner.file_type()
    }

    fn data_offset(&self) -> Option<u64> {
        self.inner.data_offset()
    }

    fn packet_count(&self) -> Option<u64> {
        self.inner.packet_count()
    }

    fn bit_rate(&self) -> Option<u32> {
        self.inner.bit_rate()
    }

    fn expected_offset(&self) -> Option<u64> {
        self.inner.expected_offset()
    }

    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError> {
        self.inner.seek_to_packet(packet)
    }

    fn close(self) -> Result<(), EngineError> {
        self.inner.close()
    }
}

/// A mock stream: header plus `packets` one-byte packets.
pub fn mock_stream(packets: usize) -> Vec<u8> {
    let mut data = MOCK_HEADER.to_vec();
    data.extend(std::iter::repeat(0xAA).take(packets));
    data
}
