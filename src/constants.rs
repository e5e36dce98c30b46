//! Decoder constants

/// Upper bound on the bytes read while probing for a stream header.
pub const MAX_HEADER_SIZE: usize = 1024 * 1024;

/// Size of the scratch buffer every read/parse cycle goes through.
pub const PARSING_BUFFER_SIZE: usize = 4096;

/// Number of maximal converter output packets collected before the sink fires.
pub const PACKET_AGGREGATION_COUNT: usize = 128;

/// Consecutive zero-byte reads after which the stream is considered finished.
pub const ZERO_READ_THRESHOLD: u32 = 10;
