//! MPEG audio layer III elementary streams.

use super::framed::{FrameFormat, FrameHeader};
use crate::format::{CodecId, FileType};

const ID3V2_HEADER_LEN: usize = 10;

/// Layer III bit rates in kbit/s, MPEG-1 then MPEG-2/2.5.
const BIT_RATES: [[u32; 15]; 2] = [
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl Version {
    fn sample_rates(self) -> [u32; 3] {
        match self {
            Version::Mpeg1 => [44_100, 48_000, 32_000],
            Version::Mpeg2 => [22_050, 24_000, 16_000],
            Version::Mpeg25 => [11_025, 12_000, 8_000],
        }
    }
}

pub(crate) struct Mpeg;

impl FrameFormat for Mpeg {
    const FILE_TYPE: FileType = FileType::MP3;
    const CODEC: CodecId = CodecId::MP3;
    const HEADER_LEN: usize = 4;

    fn parse_header(bytes: &[u8]) -> Option<FrameHeader> {
        if bytes.len() < Self::HEADER_LEN || bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (bytes[1] >> 3) & 0x03 {
            0 => Version::Mpeg25,
            2 => Version::Mpeg2,
            3 => Version::Mpeg1,
            _ => return None,
        };
        // layer III only
        if (bytes[1] >> 1) & 0x03 != 0x01 {
            return None;
        }

        let bit_rate_index = usize::from(bytes[2] >> 4);
        let sample_rate_index = usize::from((bytes[2] >> 2) & 0x03);
        let padding = usize::from((bytes[2] >> 1) & 0x01);
        let mono = bytes[3] >> 6 == 0x03;

        // free format (0) and the reserved index (15) cannot be framed
        if bit_rate_index == 0 || bit_rate_index == 15 || sample_rate_index == 3 {
            return None;
        }
        let table = usize::from(version != Version::Mpeg1);
        let bit_rate = BIT_RATES[table][bit_rate_index] * 1000;
        let sample_rate = version.sample_rates()[sample_rate_index];

        let (coefficient, frames_per_packet) = match version {
            Version::Mpeg1 => (144, 1152),
            Version::Mpeg2 | Version::Mpeg25 => (72, 576),
        };
        let frame_len = (coefficient * bit_rate / sample_rate) as usize + padding;

        Some(FrameHeader {
            frame_len,
            strip_len: 0,
            sample_rate,
            channels: if mono { 1 } else { 2 },
            frames_per_packet,
            bit_rate: Some(bit_rate),
            stream_key: (u32::from(bytes[1]) << 8)
                | ((sample_rate_index as u32) << 1)
                | u32::from(mono),
        })
    }

    /// ID3v2 tags, sized by a 28-bit syncsafe integer.
    fn tag_len(bytes: &[u8]) -> Result<usize, ()> {
        if bytes.len() < 3 {
            return Err(());
        }
        if &bytes[..3] != b"ID3" {
            return Ok(0);
        }
        if bytes.len() < ID3V2_HEADER_LEN {
            return Err(());
        }

        let size = bytes[6..10]
            .iter()
            .fold(0usize, |size, &b| (size << 7) | usize::from(b & 0x7F));
        let footer = if bytes[5] & 0x10 != 0 { ID3V2_HEADER_LEN } else { 0 };
        Ok(ID3V2_HEADER_LEN + size + footer)
    }

    fn magic_cookie(_header: &FrameHeader, _first_frame: &[u8]) -> Option<Vec<u8>> {
        None
    }
}
