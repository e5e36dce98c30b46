//! Turns packets into sink callbacks.
//!
//! Linear PCM takes the direct path: each packets notification is converted in
//! one call and handed to the sink as one burst. Compressed input takes the
//! pull path: the batch is parked in a single-use slot, the converter pulls it
//! while filling one output packet at a time, and outputs are aggregated so the
//! sink sees few large bursts instead of many small ones.

use tracing::trace;

use crate::constants::PACKET_AGGREGATION_COUNT;
use crate::engine::{Fill, PacketBatch, PacketDescription, SampleConverter};
use crate::error::EngineError;
use crate::format::StreamDescription;
use crate::sink::FrameSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConversionPath {
    Direct,
    Pull,
}

pub(crate) struct ConverterBridge<C> {
    converter: C,
    path: ConversionPath,
    channels: usize,
    /// The borrowed-packet slot the converter pulls from.
    slot: Option<PacketBatch>,
    /// One maximal output packet.
    scratch: Vec<f32>,
    aggregate: Vec<f32>,
    aggregate_capacity: usize,
    /// Output frames still to drop after a seek landed inside a packet.
    skip_frames: u64,
}

impl<C: SampleConverter> ConverterBridge<C> {
    pub fn new(converter: C, input: &StreamDescription) -> Result<Self, EngineError> {
        let channels = input.channels_per_frame as usize;
        let path = if input.is_linear_pcm() {
            ConversionPath::Direct
        } else {
            ConversionPath::Pull
        };

        let (scratch, aggregate_capacity) = match path {
            ConversionPath::Direct => (Vec::new(), 0),
            ConversionPath::Pull => {
                let max_output = converter.max_output_packet_size()? as usize;
                let packet_len = max_output.max(1) * channels;
                (
                    vec![0.0; packet_len],
                    packet_len * PACKET_AGGREGATION_COUNT,
                )
            }
        };

        Ok(ConverterBridge {
            converter,
            path,
            channels,
            slot: None,
            scratch,
            aggregate: Vec::with_capacity(aggregate_capacity),
            aggregate_capacity,
            skip_frames: 0,
        })
    }

    pub fn path(&self) -> ConversionPath {
        self.path
    }

    pub fn converter_mut(&mut self) -> &mut C {
        &mut self.converter
    }

    /// Drops converter state and arranges for the first `skip_frames` output
    /// frames to be discarded.
    pub fn reset(&mut self, skip_frames: u64) -> Result<(), EngineError> {
        self.slot = None;
        self.aggregate.clear();
        self.skip_frames = skip_frames;
        self.converter.reset()
    }

    pub fn process(
        &mut self,
        data: &[u8],
        descriptions: &[PacketDescription],
        sink: &mut dyn FrameSink,
    ) -> Result<(), EngineError> {
        match self.path {
            ConversionPath::Direct => self.convert_direct(data, sink),
            ConversionPath::Pull => self.convert_pulled(data, descriptions, sink),
        }
    }

    fn convert_direct(&mut self, data: &[u8], sink: &mut dyn FrameSink) -> Result<(), EngineError> {
        self.scratch.clear();
        self.converter.convert_buffer(data, &mut self.scratch)?;

        let skip = self.take_skip(self.scratch.len() / self.channels);
        let samples = &self.scratch[skip * self.channels..];
        let frames = samples.len() / self.channels;
        if frames > 0 {
            sink.frames_decoded(frames, samples);
        }
        Ok(())
    }

    fn convert_pulled(
        &mut self,
        data: &[u8],
        descriptions: &[PacketDescription],
        sink: &mut dyn FrameSink,
    ) -> Result<(), EngineError> {
        self.slot = Some(PacketBatch::new(data, descriptions));

        let result = loop {
            let Fill { frames, exhausted } =
                match self.converter.fill(&mut self.slot, &mut self.scratch) {
                    Ok(fill) => fill,
                    Err(err) => break Err(err),
                };

            let skip = self.take_skip(frames);
            let samples = &self.scratch[skip * self.channels..frames * self.channels];
            if self.aggregate.len() + samples.len() > self.aggregate_capacity {
                trace!(samples = self.aggregate.len(), "aggregation buffer full");
                flush(&mut self.aggregate, self.channels, sink);
            }
            self.aggregate.extend_from_slice(samples);

            // no progress without exhaustion would spin forever
            if exhausted || frames == 0 {
                break Ok(());
            }
        };

        self.slot = None;
        flush(&mut self.aggregate, self.channels, sink);
        result
    }

    fn take_skip(&mut self, frames: usize) -> usize {
        let skip = self.skip_frames.min(frames as u64);
        self.skip_frames -= skip;
        skip as usize
    }
}

fn flush(aggregate: &mut Vec<f32>, channels: usize, sink: &mut dyn FrameSink) {
    if !aggregate.is_empty() {
        sink.frames_decoded(aggregate.len() / channels, aggregate);
        aggregate.clear();
    }
}
