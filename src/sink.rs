/// Receives decoded audio.
///
/// `samples` holds `frame_count` interleaved frames in the decoder's output
/// format and is only valid for the duration of the call.
///
/// Any `FnMut(usize, &[f32])` closure is a sink:
///
/// ```
/// use stream_decoder::FrameSink;
///
/// let mut total = 0;
/// let mut sink = |frames: usize, _samples: &[f32]| total += frames;
/// sink.frames_decoded(4, &[0.0; 8]);
/// assert_eq!(total, 4);
/// ```
pub trait FrameSink {
    fn frames_decoded(&mut self, frame_count: usize, samples: &[f32]);
}

impl<F> FrameSink for F
where
    F: FnMut(usize, &[f32]),
{
    #[inline]
    fn frames_decoded(&mut self, frame_count: usize, samples: &[f32]) {
        self(frame_count, samples)
    }
}

impl FrameSink for Vec<f32> {
    /// Appends every decoded sample.
    #[inline]
    fn frames_decoded(&mut self, _frame_count: usize, samples: &[f32]) {
        self.extend_from_slice(samples);
    }
}
