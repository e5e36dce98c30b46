//! ADTS framing for raw AAC.

use super::framed::{FrameFormat, FrameHeader};
use crate::format::{CodecId, FileType};

const SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
    7_350,
];

const AAC_FRAMES_PER_PACKET: u32 = 1024;

pub(crate) struct Adts;

impl Adts {
    /// Whether `bytes` start with an ADTS sync word (`0xFFF`, layer 0).
    pub(crate) fn is_sync(bytes: &[u8]) -> bool {
        bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xF6 == 0xF0
    }
}

impl FrameFormat for Adts {
    const FILE_TYPE: FileType = FileType::ADTS;
    const CODEC: CodecId = CodecId::AAC;
    const HEADER_LEN: usize = 7;

    fn parse_header(bytes: &[u8]) -> Option<FrameHeader> {
        if bytes.len() < Self::HEADER_LEN || !Self::is_sync(bytes) {
            return None;
        }

        let protection_absent = bytes[1] & 0x01 == 1;
        let profile = (bytes[2] >> 6) & 0x03;
        let sample_rate_index = (bytes[2] >> 2) & 0x0F;
        let channel_config = ((bytes[2] & 0x01) << 2) | (bytes[3] >> 6);
        let frame_len = (usize::from(bytes[3] & 0x03) << 11)
            | (usize::from(bytes[4]) << 3)
            | usize::from(bytes[5] >> 5);
        let raw_blocks = bytes[6] & 0x03;

        let sample_rate = *SAMPLE_RATES.get(usize::from(sample_rate_index))?;
        // channel configuration 0 needs an in-band program config element
        if channel_config == 0 || raw_blocks != 0 {
            return None;
        }
        let header_len = if protection_absent { 7 } else { 9 };
        if frame_len <= header_len {
            return None;
        }

        Some(FrameHeader {
            frame_len,
            strip_len: header_len,
            sample_rate,
            channels: if channel_config == 7 { 8 } else { u32::from(channel_config) },
            frames_per_packet: AAC_FRAMES_PER_PACKET,
            bit_rate: None,
            stream_key: (u32::from(profile) << 8)
                | (u32::from(sample_rate_index) << 4)
                | u32::from(channel_config),
        })
    }

    fn tag_len(_bytes: &[u8]) -> Result<usize, ()> {
        Ok(0)
    }

    /// Two-byte AudioSpecificConfig built from the first header.
    fn magic_cookie(header: &FrameHeader, _first_frame: &[u8]) -> Option<Vec<u8>> {
        let object_type = ((header.stream_key >> 8) & 0x03) as u16 + 1;
        let sample_rate_index = ((header.stream_key >> 4) & 0x0F) as u16;
        let channel_config = (header.stream_key & 0x0F) as u16;
        let config = (object_type << 11) | (sample_rate_index << 7) | (channel_config << 3);
        Some(config.to_be_bytes().to_vec())
    }
}
