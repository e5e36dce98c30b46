/// Stream sample rate (frames per second).
pub type SampleRate = u32;

/// Number of channels in a stream.
pub type ChannelCount = u16;

/// The canonical output sample. Decoded frames are always interleaved `f32`.
pub type Sample = f32;
