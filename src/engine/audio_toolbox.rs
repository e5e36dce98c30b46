//! AudioToolbox container engine.
//!
//! `AudioFileStream` parses the container and `AudioConverter` decodes
//! packets into canonical `f32` frames. AudioFileStream reports properties and
//! packets through C callbacks while `AudioFileStreamParseBytes` runs; those
//! callbacks only record events into an owned queue, which is replayed to the
//! [`ParseListener`] once the call has returned.

#![allow(unsafe_code)]
#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]
#![allow(non_snake_case)]

use std::ffi::c_void;
use std::mem;
use std::ptr;

use tracing::{debug, trace, warn};

use super::{
    ContainerEngine, Fill, PacketBatch, PacketDescription, PacketSeek, PacketSupplier,
    ParseFlags, ParseListener, Property, SampleConverter,
};
use crate::error::EngineError;
use crate::format::{CodecId, FileType, FileTypeHint, FormatFlags, StreamDescription};

type OSStatus = i32;
type AudioFileStreamID = *mut c_void;
type AudioFileTypeID = u32;
type AudioFileStreamPropertyID = u32;
type AudioConverterRef = *mut c_void;
type UInt32 = u32;
type SInt64 = i64;
type Float64 = f64;

const noErr: OSStatus = 0;
const kAudioFileStreamError_NotOptimized: OSStatus = i32::from_be_bytes(*b"optm");

/// Returned from the input procedure when the supplier is dry. Not a real
/// AudioToolbox status, so it can be told apart from converter failures.
const NO_MORE_INPUT: OSStatus = i32::from_be_bytes(*b"!dat");

const kAudioFileStreamProperty_ReadyToProducePackets: AudioFileStreamPropertyID =
    u32::from_be_bytes(*b"redy");
const kAudioFileStreamProperty_FileFormat: AudioFileStreamPropertyID =
    u32::from_be_bytes(*b"ffmt");
const kAudioFileStreamProperty_DataFormat: AudioFileStreamPropertyID =
    u32::from_be_bytes(*b"dfmt");
const kAudioFileStreamProperty_MagicCookieData: AudioFileStreamPropertyID =
    u32::from_be_bytes(*b"mgic");
const kAudioFileStreamProperty_DataOffset: AudioFileStreamPropertyID =
    u32::from_be_bytes(*b"doff");
const kAudioFileStreamProperty_AudioDataPacketCount: AudioFileStreamPropertyID =
    u32::from_be_bytes(*b"pcnt");
const kAudioFileStreamProperty_BitRate: AudioFileStreamPropertyID =
    u32::from_be_bytes(*b"brat");

const kAudioFileStreamPropertyFlag_CacheProperty: UInt32 = 1;
const kAudioFileStreamParseFlag_Discontinuity: UInt32 = 1;
const kAudioFileStreamSeekFlag_OffsetIsEstimated: UInt32 = 1;

const kAudioConverterDecompressionMagicCookie: u32 = u32::from_be_bytes(*b"dmgc");
const kAudioConverterPropertyMinimumOutputBufferSize: u32 = u32::from_be_bytes(*b"mobs");

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct AudioStreamPacketDescription {
    mStartOffset: SInt64,
    mVariableFramesInPacket: UInt32,
    mDataByteSize: UInt32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct AudioStreamBasicDescription {
    mSampleRate: Float64,
    mFormatID: u32,
    mFormatFlags: u32,
    mBytesPerPacket: UInt32,
    mFramesPerPacket: UInt32,
    mBytesPerFrame: UInt32,
    mChannelsPerFrame: UInt32,
    mBitsPerChannel: UInt32,
    mReserved: UInt32,
}

impl From<&StreamDescription> for AudioStreamBasicDescription {
    fn from(desc: &StreamDescription) -> Self {
        AudioStreamBasicDescription {
            mSampleRate: desc.sample_rate,
            mFormatID: desc.codec.0,
            mFormatFlags: desc.flags.0,
            mBytesPerPacket: desc.bytes_per_packet,
            mFramesPerPacket: desc.frames_per_packet,
            mBytesPerFrame: desc.bytes_per_frame,
            mChannelsPerFrame: desc.channels_per_frame,
            mBitsPerChannel: desc.bits_per_channel,
            mReserved: 0,
        }
    }
}

impl From<AudioStreamBasicDescription> for StreamDescription {
    fn from(asbd: AudioStreamBasicDescription) -> Self {
        StreamDescription {
            sample_rate: asbd.mSampleRate,
            codec: CodecId(asbd.mFormatID),
            flags: FormatFlags(asbd.mFormatFlags),
            bytes_per_packet: asbd.mBytesPerPacket,
            frames_per_packet: asbd.mFramesPerPacket,
            bytes_per_frame: asbd.mBytesPerFrame,
            channels_per_frame: asbd.mChannelsPerFrame,
            bits_per_channel: asbd.mBitsPerChannel,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct AudioBuffer {
    mNumberChannels: UInt32,
    mDataByteSize: UInt32,
    mData: *mut c_void,
}

#[repr(C)]
struct AudioBufferList {
    mNumberBuffers: UInt32,
    mBuffers: [AudioBuffer; 1],
}

type AudioFileStream_PropertyListenerProc = extern "C" fn(
    inClientData: *mut c_void,
    inAudioFileStream: AudioFileStreamID,
    inPropertyID: AudioFileStreamPropertyID,
    ioFlags: *mut UInt32,
);

type AudioFileStream_PacketsProc = extern "C" fn(
    inClientData: *mut c_void,
    inNumberBytes: UInt32,
    inNumberPackets: UInt32,
    inInputData: *const c_void,
    inPacketDescriptions: *mut AudioStreamPacketDescription,
);

type AudioConverterComplexInputDataProc = extern "C" fn(
    inAudioConverter: AudioConverterRef,
    ioNumberDataPackets: *mut UInt32,
    ioData: *mut AudioBufferList,
    outDataPacketDescription: *mut *mut AudioStreamPacketDescription,
    inUserData: *mut c_void,
) -> OSStatus;

#[link(name = "AudioToolbox", kind = "framework")]
extern "C" {
    fn AudioFileStreamOpen(
        inClientData: *mut c_void,
        inPropertyListenerProc: AudioFileStream_PropertyListenerProc,
        inPacketsProc: AudioFileStream_PacketsProc,
        inFileTypeHint: AudioFileTypeID,
        outAudioFileStream: *mut AudioFileStreamID,
    ) -> OSStatus;

    fn AudioFileStreamParseBytes(
        inAudioFileStream: AudioFileStreamID,
        inDataByteSize: UInt32,
        inData: *const c_void,
        inFlags: UInt32,
    ) -> OSStatus;

    fn AudioFileStreamGetPropertyInfo(
        inAudioFileStream: AudioFileStreamID,
        inPropertyID: AudioFileStreamPropertyID,
        outPropertyDataSize: *mut UInt32,
        outWritable: *mut u8,
    ) -> OSStatus;

    fn AudioFileStreamGetProperty(
        inAudioFileStream: AudioFileStreamID,
        inPropertyID: AudioFileStreamPropertyID,
        ioPropertyDataSize: *mut UInt32,
        outPropertyData: *mut c_void,
    ) -> OSStatus;

    fn AudioFileStreamSeek(
        inAudioFileStream: AudioFileStreamID,
        inPacketOffset: SInt64,
        outDataByteOffset: *mut SInt64,
        ioFlags: *mut UInt32,
    ) -> OSStatus;

    fn AudioFileStreamClose(inAudioFileStream: AudioFileStreamID) -> OSStatus;

    fn AudioConverterNew(
        inSourceFormat: *const AudioStreamBasicDescription,
        inDestinationFormat: *const AudioStreamBasicDescription,
        outAudioConverter: *mut AudioConverterRef,
    ) -> OSStatus;

    fn AudioConverterSetProperty(
        inAudioConverter: AudioConverterRef,
        inPropertyID: u32,
        inPropertyDataSize: UInt32,
        inPropertyData: *const c_void,
    ) -> OSStatus;

    fn AudioConverterGetProperty(
        inAudioConverter: AudioConverterRef,
        inPropertyID: u32,
        ioPropertyDataSize: *mut UInt32,
        outPropertyData: *mut c_void,
    ) -> OSStatus;

    fn AudioConverterConvertBuffer(
        inAudioConverter: AudioConverterRef,
        inInputDataSize: UInt32,
        inInputData: *const c_void,
        ioOutputDataSize: *mut UInt32,
        outOutputData: *mut c_void,
    ) -> OSStatus;

    fn AudioConverterFillComplexBuffer(
        inAudioConverter: AudioConverterRef,
        inInputDataProc: AudioConverterComplexInputDataProc,
        inInputDataProcUserData: *mut c_void,
        ioOutputDataPacketSize: *mut UInt32,
        outOutputData: *mut AudioBufferList,
        outPacketDescription: *mut AudioStreamPacketDescription,
    ) -> OSStatus;

    fn AudioConverterReset(inAudioConverter: AudioConverterRef) -> OSStatus;

    fn AudioConverterDispose(inAudioConverter: AudioConverterRef) -> OSStatus;
}

#[inline]
fn check(status: OSStatus) -> Result<(), EngineError> {
    if status == noErr {
        Ok(())
    } else {
        Err(EngineError::Status(status))
    }
}

fn buffer_len(len: usize) -> Result<UInt32, EngineError> {
    UInt32::try_from(len).map_err(|_| EngineError::InvalidData(format!("buffer of {len} bytes")))
}

/// Reads a fixed-size property of a file stream.
///
/// # Safety
///
/// `stream` must be an open AudioFileStream and `T` the property's C layout.
unsafe fn stream_property<T: Default>(
    stream: AudioFileStreamID,
    property: AudioFileStreamPropertyID,
) -> Result<T, OSStatus> {
    let mut value = T::default();
    let mut size = mem::size_of::<T>() as UInt32;
    let status = AudioFileStreamGetProperty(
        stream,
        property,
        &mut size,
        &mut value as *mut T as *mut c_void,
    );
    if status == noErr {
        Ok(value)
    } else {
        Err(status)
    }
}

/// Reads a variable-size property of a file stream.
///
/// # Safety
///
/// `stream` must be an open AudioFileStream.
unsafe fn stream_property_bytes(
    stream: AudioFileStreamID,
    property: AudioFileStreamPropertyID,
) -> Result<Vec<u8>, OSStatus> {
    let mut size: UInt32 = 0;
    let mut writable: u8 = 0;
    let status = AudioFileStreamGetPropertyInfo(stream, property, &mut size, &mut writable);
    if status != noErr {
        return Err(status);
    }

    let mut data = vec![0u8; size as usize];
    let status = AudioFileStreamGetProperty(
        stream,
        property,
        &mut size,
        data.as_mut_ptr() as *mut c_void,
    );
    if status != noErr {
        return Err(status);
    }
    data.truncate(size as usize);
    Ok(data)
}

/// A notification captured during `AudioFileStreamParseBytes`.
#[derive(Debug)]
enum StreamEvent {
    DataFormat(StreamDescription),
    MagicCookie(Vec<u8>),
    DataOffset(u64),
    Ready,
    Packets {
        data: Vec<u8>,
        descriptions: Vec<PacketDescription>,
    },
}

/// Client data handed to the AudioFileStream callbacks.
#[derive(Debug, Default)]
struct CallbackState {
    events: Vec<StreamEvent>,
}

extern "C" fn property_listener(
    client_data: *mut c_void,
    stream: AudioFileStreamID,
    property_id: AudioFileStreamPropertyID,
    flags: *mut UInt32,
) {
    // SAFETY: client data is the engine's boxed CallbackState, alive for as
    // long as the stream is open.
    let state = unsafe { &mut *(client_data as *mut CallbackState) };
    if !flags.is_null() {
        // SAFETY: non-null flags point to a value AudioToolbox owns for this call.
        unsafe { *flags = kAudioFileStreamPropertyFlag_CacheProperty };
    }

    let event = match property_id {
        kAudioFileStreamProperty_DataFormat => {
            // SAFETY: `stream` is the stream invoking this callback.
            match unsafe { stream_property::<AudioStreamBasicDescription>(stream, property_id) } {
                Ok(format) => StreamEvent::DataFormat(format.into()),
                Err(status) => {
                    warn!(status = %super::status_to_string(status), "data format unavailable");
                    return;
                }
            }
        }
        kAudioFileStreamProperty_MagicCookieData => {
            // SAFETY: as above.
            match unsafe { stream_property_bytes(stream, property_id) } {
                Ok(cookie) => StreamEvent::MagicCookie(cookie),
                Err(status) => {
                    warn!(status = %super::status_to_string(status), "magic cookie unavailable");
                    return;
                }
            }
        }
        kAudioFileStreamProperty_DataOffset => {
            // SAFETY: as above.
            match unsafe { stream_property::<SInt64>(stream, property_id) } {
                Ok(offset) => StreamEvent::DataOffset(offset.max(0) as u64),
                Err(_) => return,
            }
        }
        kAudioFileStreamProperty_ReadyToProducePackets => StreamEvent::Ready,
        other => {
            trace!(property = %super::status_to_string(other as i32), "ignored property");
            return;
        }
    };
    state.events.push(event);
}

extern "C" fn packets_listener(
    client_data: *mut c_void,
    num_bytes: UInt32,
    num_packets: UInt32,
    input_data: *const c_void,
    packet_descriptions: *mut AudioStreamPacketDescription,
) {
    // SAFETY: see `property_listener`.
    let state = unsafe { &mut *(client_data as *mut CallbackState) };
    if num_bytes == 0 || input_data.is_null() {
        return;
    }

    // SAFETY: AudioToolbox guarantees `num_bytes` readable bytes for this call.
    let data = unsafe { std::slice::from_raw_parts(input_data as *const u8, num_bytes as usize) };
    let descriptions = if packet_descriptions.is_null() {
        Vec::new()
    } else {
        // SAFETY: one description per packet when the pointer is set.
        let raw = unsafe { std::slice::from_raw_parts(packet_descriptions, num_packets as usize) };
        raw.iter()
            .map(|desc| PacketDescription {
                start_offset: desc.mStartOffset.max(0) as u64,
                variable_frames: desc.mVariableFramesInPacket,
                byte_size: desc.mDataByteSize,
            })
            .collect()
    };

    state.events.push(StreamEvent::Packets {
        data: data.to_vec(),
        descriptions,
    });
}

/// Container engine backed by `AudioFileStream`.
pub struct AudioToolboxEngine {
    stream: AudioFileStreamID,
    state: Box<CallbackState>,
    expected_offset: Option<u64>,
}

// SAFETY: the stream handle is only touched through `&mut self` or `&self`
// queries, never from two threads at once.
unsafe impl Send for AudioToolboxEngine {}

impl AudioToolboxEngine {
    fn property<T: Default>(&self, property: AudioFileStreamPropertyID) -> Option<T> {
        // SAFETY: `self.stream` stays open until close or drop.
        unsafe { stream_property(self.stream, property) }.ok()
    }

    fn replay(&mut self, listener: &mut dyn ParseListener) {
        for event in self.state.events.drain(..) {
            match event {
                StreamEvent::DataFormat(format) => {
                    listener.property_changed(Property::DataFormat(format))
                }
                StreamEvent::MagicCookie(cookie) => {
                    listener.property_changed(Property::MagicCookie(&cookie))
                }
                StreamEvent::DataOffset(offset) => {
                    listener.property_changed(Property::DataOffset(offset))
                }
                StreamEvent::Ready => listener.property_changed(Property::ReadyToProducePackets),
                StreamEvent::Packets { data, descriptions } => {
                    listener.packets(&data, &descriptions)
                }
            }
        }
    }
}

impl ContainerEngine for AudioToolboxEngine {
    type Converter = AudioToolboxConverter;

    fn open(hint: FileTypeHint) -> Result<Self, EngineError> {
        let mut state = Box::<CallbackState>::default();
        let mut stream: AudioFileStreamID = ptr::null_mut();
        // SAFETY: the boxed state outlives the stream; it is owned by the
        // engine and only dropped after the stream is closed.
        let status = unsafe {
            AudioFileStreamOpen(
                state.as_mut() as *mut CallbackState as *mut c_void,
                property_listener,
                packets_listener,
                hint.0,
                &mut stream,
            )
        };
        check(status)?;
        debug!(?hint, "AudioFileStream opened");

        Ok(AudioToolboxEngine {
            stream,
            state,
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
        let raw_flags = if flags.contains(ParseFlags::DISCONTINUITY) {
            kAudioFileStreamParseFlag_Discontinuity
        } else {
            0
        };

        // SAFETY: `data` is valid for the duration of the call; callbacks only
        // copy out of the buffers AudioToolbox hands them.
        let status = unsafe {
            AudioFileStreamParseBytes(
                self.stream,
                buffer_len(data.len())?,
                data.as_ptr() as *const c_void,
                raw_flags,
            )
        };
        // Events captured before a failure are still delivered
        self.replay(listener);

        if status == kAudioFileStreamError_NotOptimized {
            warn!("container is not optimized for streaming");
            return Ok(());
        }
        check(status)
    }

    fn is_ready(&self) -> bool {
        self.property::<UInt32>(kAudioFileStreamProperty_ReadyToProducePackets) == Some(1)
    }

    fn data_format(&self) -> Option<StreamDescription> {
        self.property::<AudioStreamBasicDescription>(kAudioFileStreamProperty_DataFormat)
            .map(StreamDescription::from)
    }

    fn file_type(&self) -> Option<FileType> {
        self.property::<UInt32>(kAudioFileStreamProperty_FileFormat)
            .filter(|&id| id != 0)
            .map(FileType)
    }

    fn data_offset(&self) -> Option<u64> {
        self.property::<SInt64>(kAudioFileStreamProperty_DataOffset)
            .map(|offset| offset.max(0) as u64)
    }

    fn packet_count(&self) -> Option<u64> {
        self.property::<u64>(kAudioFileStreamProperty_AudioDataPacketCount)
    }

    fn bit_rate(&self) -> Option<u32> {
        self.property::<UInt32>(kAudioFileStreamProperty_BitRate)
    }

    fn expected_offset(&self) -> Option<u64> {
        self.expected_offset
    }

    fn seek_to_packet(&mut self, packet: u64) -> Result<PacketSeek, EngineError> {
        let packet = SInt64::try_from(packet)
            .map_err(|_| EngineError::InvalidData(format!("packet index {packet}")))?;
        let mut byte_offset: SInt64 = 0;
        let mut flags: UInt32 = 0;
        // SAFETY: the stream is open and both out-pointers are valid locals.
        let status =
            unsafe { AudioFileStreamSeek(self.stream, packet, &mut byte_offset, &mut flags) };
        check(status)?;

        let byte_offset = byte_offset.max(0) as u64;
        self.expected_offset = Some(self.data_offset().unwrap_or(0) + byte_offset);
        Ok(PacketSeek {
            byte_offset,
            estimated: flags & kAudioFileStreamSeekFlag_OffsetIsEstimated != 0,
        })
    }

    fn close(mut self) -> Result<(), EngineError> {
        let stream = mem::replace(&mut self.stream, ptr::null_mut());
        // SAFETY: the handle was open and is not used again; Drop sees null.
        check(unsafe { AudioFileStreamClose(stream) })
    }
}

impl Drop for AudioToolboxEngine {
    fn drop(&mut self) {
        if self.stream.is_null() {
            return;
        }
        // SAFETY: the handle is open and dropped exactly once.
        let status = unsafe { AudioFileStreamClose(self.stream) };
        if status != noErr {
            warn!(status = %super::status_to_string(status), "AudioFileStreamClose failed");
        }
    }
}

/// The batch the converter is currently reading from. AudioConverter keeps
/// pointers into it until it asks for more input.
#[derive(Default)]
struct HeldInput {
    batch: Option<PacketBatch>,
    descriptions: Vec<AudioStreamPacketDescription>,
}

/// User data of one `AudioConverterFillComplexBuffer` call.
struct InputContext<'a> {
    supplier: &'a mut dyn PacketSupplier,
    held: &'a mut HeldInput,
    channels: UInt32,
    bytes_per_packet: UInt32,
}

extern "C" fn converter_input(
    _converter: AudioConverterRef,
    io_num_packets: *mut UInt32,
    io_data: *mut AudioBufferList,
    out_packet_desc: *mut *mut AudioStreamPacketDescription,
    user_data: *mut c_void,
) -> OSStatus {
    // SAFETY: user data is the InputContext living on the stack of `fill`,
    // which blocks until the converter stops calling back.
    let ctx = unsafe { &mut *(user_data as *mut InputContext<'_>) };

    let Some(batch) = ctx.supplier.next_batch() else {
        ctx.held.batch = None;
        ctx.held.descriptions.clear();
        // SAFETY: AudioToolbox passes valid in/out pointers.
        unsafe {
            *io_num_packets = 0;
            (*io_data).mNumberBuffers = 0;
        }
        return NO_MORE_INPUT;
    };

    let packet_count = batch.packet_count(ctx.bytes_per_packet) as UInt32;
    ctx.held.descriptions = batch
        .descriptions
        .iter()
        .map(|desc| AudioStreamPacketDescription {
            mStartOffset: desc.start_offset as SInt64,
            mVariableFramesInPacket: desc.variable_frames,
            mDataByteSize: desc.byte_size,
        })
        .collect();
    let held = ctx.held.batch.insert(batch);

    // SAFETY: the held batch and descriptions stay put until the next pull
    // replaces them, which is when AudioToolbox stops reading them.
    unsafe {
        (*io_data).mNumberBuffers = 1;
        (*io_data).mBuffers[0] = AudioBuffer {
            mNumberChannels: ctx.channels,
            mDataByteSize: held.data.len() as UInt32,
            mData: held.data.as_ptr() as *mut c_void,
        };
        *io_num_packets = packet_count;
        if !out_packet_desc.is_null() {
            *out_packet_desc = if ctx.held.descriptions.is_empty() {
                ptr::null_mut()
            } else {
                ctx.held.descriptions.as_mut_ptr()
            };
        }
    }
    noErr
}

/// Sample converter backed by `AudioConverter`.
pub struct AudioToolboxConverter {
    converter: AudioConverterRef,
    input: StreamDescription,
    output: StreamDescription,
    held: HeldInput,
}

// SAFETY: see `AudioToolboxEngine`.
unsafe impl Send for AudioToolboxConverter {}

impl SampleConverter for AudioToolboxConverter {
    fn new(input: &StreamDescription, output: &StreamDescription) -> Result<Self, EngineError> {
        let source = AudioStreamBasicDescription::from(input);
        let destination = AudioStreamBasicDescription::from(output);
        let mut converter: AudioConverterRef = ptr::null_mut();
        // SAFETY: both descriptions are valid locals.
        check(unsafe { AudioConverterNew(&source, &destination, &mut converter) })?;
        debug!(codec = %input.codec, "AudioConverter created");

        Ok(AudioToolboxConverter {
            converter,
            input: *input,
            output: *output,
            held: HeldInput::default(),
        })
    }

    fn set_magic_cookie(&mut self, cookie: &[u8]) -> Result<(), EngineError> {
        // SAFETY: the converter is live and the cookie slice valid for the call.
        check(unsafe {
            AudioConverterSetProperty(
                self.converter,
                kAudioConverterDecompressionMagicCookie,
                buffer_len(cookie.len())?,
                cookie.as_ptr() as *const c_void,
            )
        })
    }

    fn max_output_packet_size(&self) -> Result<u32, EngineError> {
        let mut min_buffer: UInt32 = 0;
        let mut size = mem::size_of::<UInt32>() as UInt32;
        // SAFETY: the converter is live and `min_buffer` is a valid local.
        check(unsafe {
            AudioConverterGetProperty(
                self.converter,
                kAudioConverterPropertyMinimumOutputBufferSize,
                &mut size,
                &mut min_buffer as *mut UInt32 as *mut c_void,
            )
        })?;

        let bytes_per_frame = self.output.bytes_per_frame.max(1);
        Ok(self
            .input
            .frames_per_packet
            .max(min_buffer / bytes_per_frame)
            .max(1))
    }

    fn convert_buffer(&mut self, input: &[u8], output: &mut Vec<f32>) -> Result<(), EngineError> {
        let bytes_per_frame = self.input.bytes_per_frame;
        if bytes_per_frame == 0 {
            return Err(EngineError::Unsupported(format!(
                "direct conversion of {}",
                self.input.codec
            )));
        }

        let frames = input.len() / bytes_per_frame as usize;
        let channels = self.output.channels_per_frame as usize;
        let start = output.len();
        output.resize(start + frames * channels, 0.0);
        let out = &mut output[start..];
        let mut out_size = buffer_len(mem::size_of_val(out))?;

        // SAFETY: `out` has room for `out_size` bytes and `input` is whole
        // frames.
        let status = unsafe {
            AudioConverterConvertBuffer(
                self.converter,
                buffer_len(frames * bytes_per_frame as usize)?,
                input.as_ptr() as *const c_void,
                &mut out_size,
                out.as_mut_ptr() as *mut c_void,
            )
        };
        let written = out_size as usize / mem::size_of::<f32>();
        output.truncate(start + written.min(frames * channels));
        check(status)
    }

    fn fill(
        &mut self,
        supplier: &mut dyn PacketSupplier,
        output: &mut [f32],
    ) -> Result<Fill, EngineError> {
        let channels = self.output.channels_per_frame.max(1);
        let capacity = output.len() / channels as usize;
        let mut frames = buffer_len(capacity)?;
        let mut buffers = AudioBufferList {
            mNumberBuffers: 1,
            mBuffers: [AudioBuffer {
                mNumberChannels: channels,
                mDataByteSize: buffer_len(capacity * channels as usize * mem::size_of::<f32>())?,
                mData: output.as_mut_ptr() as *mut c_void,
            }],
        };
        let mut ctx = InputContext {
            supplier,
            held: &mut self.held,
            channels: self.input.channels_per_frame,
            bytes_per_packet: self.input.bytes_per_packet,
        };

        // SAFETY: `ctx` and `buffers` outlive the call; the input procedure is
        // only invoked synchronously from within it.
        let status = unsafe {
            AudioConverterFillComplexBuffer(
                self.converter,
                converter_input,
                &mut ctx as *mut InputContext<'_> as *mut c_void,
                &mut frames,
                &mut buffers,
                ptr::null_mut(),
            )
        };

        let frames = (frames as usize).min(capacity);
        match status {
            noErr => Ok(Fill {
                frames,
                exhausted: false,
            }),
            NO_MORE_INPUT => Ok(Fill {
                frames,
                exhausted: true,
            }),
            status => Err(EngineError::Status(status)),
        }
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        // SAFETY: the converter is live.
        let status = unsafe { AudioConverterReset(self.converter) };
        // The converter no longer references the held batch
        self.held = HeldInput::default();
        check(status)
    }
}

impl Drop for AudioToolboxConverter {
    fn drop(&mut self) {
        // SAFETY: the converter was created in `new` and is disposed once.
        let status = unsafe { AudioConverterDispose(self.converter) };
        if status != noErr {
            warn!(status = %super::status_to_string(status), "AudioConverterDispose failed");
        }
    }
}
