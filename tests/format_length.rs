use rstest::rstest;
use stream_decoder::{CodecId, Decoder, DecoderError, FileType};

mod test_support;
use test_support::{mock_stream, pcm16_wav_with_data_size, ramp, Collector, MockEngine, ScriptedHost};

fn open_mock(
    engine: MockEngine,
    host: ScriptedHost,
) -> Decoder<ScriptedHost, Collector, MockEngine> {
    Decoder::from_engine(engine, Default::default(), host, Collector::default()).unwrap()
}

#[test]
fn packet_count_gives_exact_length() {
    let engine = MockEngine::new().with_packet_count(10).with_bit_rate(1);
    let mut decoder = open_mock(engine, ScriptedHost::new(mock_stream(3)));

    let format = decoder.format().unwrap();
    assert_eq!(format.length_in_frames, 40);
    assert_eq!(format.codec, CodecId::AAC);
    assert_eq!(format.channels, 1);
    assert_eq!(format.sample_rate, 8_000);
}

#[rstest]
#[case(16, 80_000)]
#[case(24, 53_334)]
#[case(32, 40_000)]
fn bit_rate_gives_rounded_up_estimate(#[case] bit_rate: u32, #[case] expected: u64) {
    // 20 audio bytes after a 4-byte header
    let engine = MockEngine::new().with_bit_rate(bit_rate);
    let mut decoder = open_mock(engine, ScriptedHost::new(mock_stream(20)));
    assert_eq!(decoder.format().unwrap().length_in_frames, expected);
}

#[test]
fn streaming_wave_is_estimated_from_bit_rate() {
    let samples = ramp(100, 1);
    let data = pcm16_wav_with_data_size(1, 8_000, &samples, 0xFFFF_FFFF);
    let mut decoder = Decoder::new(ScriptedHost::new(data), Collector::default()).unwrap();

    let format = decoder.format().unwrap();
    assert_eq!(format.length_in_frames, 100);
    assert_eq!(format.file_type, Some(FileType::WAVE));
}

#[test]
fn estimate_needs_a_known_source_length() {
    let data = pcm16_wav_with_data_size(1, 8_000, &ramp(100, 1), 0xFFFF_FFFF);

    let host = ScriptedHost::new(data.clone()).without_length();
    let mut decoder = Decoder::new(host, Collector::default()).unwrap();
    assert!(matches!(decoder.format(), Err(DecoderError::TellFailed(None))));

    let host = ScriptedHost::new(data).failing_tell();
    let mut decoder = Decoder::new(host, Collector::default()).unwrap();
    assert!(matches!(
        decoder.format(),
        Err(DecoderError::TellFailed(Some(_)))
    ));
}

#[rstest]
#[case::no_bit_rate(MockEngine::new())]
#[case::under_a_byte_per_second(MockEngine::new().with_bit_rate(7))]
fn estimate_without_usable_bit_rate_is_unknown(#[case] engine: MockEngine) {
    let mut decoder = open_mock(engine, ScriptedHost::new(mock_stream(20)));
    assert!(matches!(decoder.format(), Err(DecoderError::Unknown(None))));
}
