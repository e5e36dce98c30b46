//! Sample conversion for the native engine.
//!
//! Linear PCM is converted sample by sample with `dasp_sample`. Compressed
//! packets go through a symphonia codec; each packet decodes to a whole number
//! of frames which are queued until `fill` hands them out.

use dasp_sample::{Sample as _, I24};
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_AAC,
    CODEC_TYPE_MP3,
};
use symphonia::core::errors::Error as CodecError;
use symphonia::core::formats::Packet;
use tracing::{debug, warn};

use crate::engine::{Fill, PacketBatch, PacketSupplier, SampleConverter};
use crate::error::EngineError;
use crate::format::{CodecId, FormatFlags, StreamDescription};

/// Output packet size reported for PCM input, in frames.
const PCM_OUTPUT_FRAMES: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PcmEncoding {
    U8,
    I8,
    I16,
    I24,
    I32,
    F32,
    F64,
}

#[derive(Debug, Clone, Copy)]
struct PcmLayout {
    encoding: PcmEncoding,
    big_endian: bool,
    sample_len: usize,
}

impl PcmLayout {
    fn from_description(input: &StreamDescription) -> Result<Self, EngineError> {
        let float = input.flags.contains(FormatFlags::IS_FLOAT);
        let signed = input.flags.contains(FormatFlags::IS_SIGNED_INTEGER);
        let encoding = match (float, signed, input.bits_per_channel) {
            (true, _, 32) => PcmEncoding::F32,
            (true, _, 64) => PcmEncoding::F64,
            (false, false, 8) => PcmEncoding::U8,
            (false, true, 8) => PcmEncoding::I8,
            (false, _, 16) => PcmEncoding::I16,
            (false, _, 24) => PcmEncoding::I24,
            (false, _, 32) => PcmEncoding::I32,
            (_, _, bits) => {
                return Err(EngineError::Unsupported(format!(
                    "{bits}-bit {} samples",
                    if float { "float" } else { "integer" }
                )))
            }
        };
        let sample_len = input.bits_per_channel as usize / 8;
        if input.bytes_per_frame as usize != sample_len * input.channels_per_frame as usize {
            return Err(EngineError::Unsupported(format!(
                "{} bytes per frame for {} channels of {sample_len}-byte samples",
                input.bytes_per_frame, input.channels_per_frame
            )));
        }

        Ok(PcmLayout {
            encoding,
            big_endian: input.flags.contains(FormatFlags::IS_BIG_ENDIAN),
            sample_len,
        })
    }

    fn bytes<const N: usize>(&self, raw: &[u8]) -> [u8; N] {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&raw[..N]);
        if self.big_endian {
            bytes.reverse();
        }
        bytes
    }

    fn sample(&self, raw: &[u8]) -> f32 {
        match self.encoding {
            PcmEncoding::U8 => raw[0].to_sample(),
            PcmEncoding::I8 => (raw[0] as i8).to_sample(),
            PcmEncoding::I16 => i16::from_le_bytes(self.bytes(raw)).to_sample(),
            PcmEncoding::I24 => {
                let [b0, b1, b2] = self.bytes::<3>(raw);
                let value = i32::from_le_bytes([0, b0, b1, b2]) >> 8;
                I24::new(value).unwrap_or(I24::EQUILIBRIUM).to_sample()
            }
            PcmEncoding::I32 => i32::from_le_bytes(self.bytes(raw)).to_sample(),
            PcmEncoding::F32 => f32::from_le_bytes(self.bytes(raw)),
            PcmEncoding::F64 => f64::from_le_bytes(self.bytes(raw)).to_sample(),
        }
    }

    fn convert(&self, input: &[u8], output: &mut Vec<f32>) {
        output.extend(
            input
                .chunks_exact(self.sample_len)
                .map(|raw| self.sample(raw)),
        );
    }
}

struct CodecState {
    params: CodecParameters,
    decoder: Box<dyn CodecDecoder>,
}

impl CodecState {
    fn new(params: CodecParameters) -> Result<Self, EngineError> {
        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
        Ok(CodecState { params, decoder })
    }

    /// Decodes one packet, appending interleaved samples to `output`.
    fn decode(
        &mut self,
        packet: &[u8],
        channels: usize,
        output: &mut Vec<f32>,
    ) -> Result<(), EngineError> {
        let packet = Packet::new_from_slice(0, 0, 0, packet);
        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if spec.channels.count() != channels {
                    warn!(
                        decoded = spec.channels.count(),
                        expected = channels,
                        "dropping packet with unexpected channel count"
                    );
                    return Ok(());
                }
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                output.extend_from_slice(buffer.samples());
            }
            Err(CodecError::DecodeError(err)) => {
                warn!(err, "skipping undecodable packet");
            }
            Err(CodecError::ResetRequired) => {
                debug!("codec requested a reset");
                self.decoder.reset();
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

enum Conversion {
    Pcm(PcmLayout),
    Codec(CodecState),
}

/// The native engine's [`SampleConverter`].
pub struct NativeConverter {
    conversion: Conversion,
    channels: usize,
    frames_per_packet: u32,
    /// Converted samples not yet handed out by `fill`.
    pending: Vec<f32>,
    pending_pos: usize,
}

fn codec_type(codec: CodecId) -> Option<CodecType> {
    match codec {
        CodecId::AAC => Some(CODEC_TYPE_AAC),
        CodecId::MP3 => Some(CODEC_TYPE_MP3),
        _ => None,
    }
}

fn channel_layout(count: u32) -> Option<Channels> {
    if count == 0 || count > 8 {
        return None;
    }
    Channels::from_bits((1u32 << count) - 1)
}

impl NativeConverter {
    fn decode_batch(&mut self, batch: &PacketBatch) -> Result<(), EngineError> {
        match &mut self.conversion {
            Conversion::Pcm(layout) => layout.convert(&batch.data, &mut self.pending),
            Conversion::Codec(state) if batch.descriptions.is_empty() => {
                state.decode(&batch.data, self.channels, &mut self.pending)?
            }
            Conversion::Codec(state) => {
                for index in 0..batch.descriptions.len() {
                    let Some(packet) = batch.packet(index) else {
                        warn!(index, "packet description points outside its batch");
                        continue;
                    };
                    state.decode(packet, self.channels, &mut self.pending)?;
                }
            }
        }
        Ok(())
    }
}

impl SampleConverter for NativeConverter {
    fn new(input: &StreamDescription, output: &StreamDescription) -> Result<Self, EngineError> {
        if !output.is_linear_pcm()
            || !output.flags.contains(FormatFlags::IS_FLOAT)
            || output.bits_per_channel != 32
        {
            return Err(EngineError::Unsupported(
                "output must be packed 32-bit float".to_owned(),
            ));
        }
        if output.channels_per_frame != input.channels_per_frame
            || output.sample_rate != input.sample_rate
        {
            return Err(EngineError::Unsupported(
                "channel mapping and resampling are not supported".to_owned(),
            ));
        }
        if input.channels_per_frame == 0 {
            return Err(EngineError::Unsupported("stream without channels".to_owned()));
        }

        let conversion = if input.is_linear_pcm() {
            Conversion::Pcm(PcmLayout::from_description(input)?)
        } else {
            let codec = codec_type(input.codec)
                .ok_or_else(|| EngineError::Unsupported(format!("no codec for {}", input.codec)))?;
            let layout = channel_layout(input.channels_per_frame).ok_or_else(|| {
                EngineError::Unsupported(format!("{} channels", input.channels_per_frame))
            })?;
            let mut params = CodecParameters::new();
            params
                .for_codec(codec)
                .with_sample_rate(input.sample_rate as u32)
                .with_channels(layout)
                .with_max_frames_per_packet(u64::from(input.frames_per_packet));
            Conversion::Codec(CodecState::new(params)?)
        };

        debug!(codec = %input.codec, channels = input.channels_per_frame, "converter created");
        Ok(NativeConverter {
            conversion,
            channels: input.channels_per_frame as usize,
            frames_per_packet: input.frames_per_packet,
            pending: Vec::new(),
            pending_pos: 0,
        })
    }

    fn set_magic_cookie(&mut self, cookie: &[u8]) -> Result<(), EngineError> {
        if let Conversion::Codec(state) = &mut self.conversion {
            let mut params = state.params.clone();
            params.with_extra_data(cookie.to_vec().into_boxed_slice());
            *state = CodecState::new(params)?;
            debug!(len = cookie.len(), "codec configured from magic cookie");
        }
        Ok(())
    }

    fn max_output_packet_size(&self) -> Result<u32, EngineError> {
        Ok(match self.conversion {
            Conversion::Pcm(_) => PCM_OUTPUT_FRAMES,
            Conversion::Codec(_) => self.frames_per_packet.max(1),
        })
    }

    fn convert_buffer(&mut self, input: &[u8], output: &mut Vec<f32>) -> Result<(), EngineError> {
        match &self.conversion {
            Conversion::Pcm(layout) => {
                layout.convert(input, output);
                Ok(())
            }
            Conversion::Codec(_) => Err(EngineError::Unsupported(
                "compressed packets cannot be converted in one step".to_owned(),
            )),
        }
    }

    fn fill(
        &mut self,
        supplier: &mut dyn PacketSupplier,
        output: &mut [f32],
    ) -> Result<Fill, EngineError> {
        let capacity = output.len() - output.len() % self.channels;
        let mut written = 0;

        loop {
            let available = self.pending.len() - self.pending_pos;
            if available > 0 {
                let count = available.min(capacity - written);
                output[written..written + count]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + count]);
                written += count;
                self.pending_pos += count;
                if written == capacity {
                    return Ok(Fill {
                        frames: written / self.channels,
                        exhausted: false,
                    });
                }
            }

            let Some(batch) = supplier.next_batch() else {
                return Ok(Fill {
                    frames: written / self.channels,
                    exhausted: true,
                });
            };
            self.pending.clear();
            self.pending_pos = 0;
            self.decode_batch(&batch)?;
        }
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.pending.clear();
        self.pending_pos = 0;
        if let Conversion::Codec(state) = &mut self.conversion {
            state.decoder.reset();
        }
        Ok(())
    }
}
