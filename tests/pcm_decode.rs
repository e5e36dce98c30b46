use quickcheck::{quickcheck, TestResult};
use rstest::rstest;
use stream_decoder::{CodecId, Decoder, DecoderConfig, FileType, ReadOnlyHost, SampleFormat};

mod test_support;
use test_support::{hound_wav, pcm16_wav, ramp, Collector, ScriptedHost};

fn decode_all(data: Vec<u8>, config: DecoderConfig) -> Collector {
    let host = ScriptedHost::new(data);
    let mut decoder = Decoder::with_config(config, host, Collector::default()).unwrap();
    while !decoder.eof().unwrap() {
        decoder.decode_next().unwrap();
    }
    let collected = std::mem::take(decoder.sink_mut());
    decoder.uninit().unwrap();
    collected
}

#[rstest]
fn sixteen_bit_pcm_is_bit_exact(#[values(1, 3, 7, 44, 4096)] parsing_buffer_size: usize) {
    let data = pcm16_wav(1, 44_100, &[0, 16_384, -32_768, 32_767]);
    let config = DecoderConfig {
        parsing_buffer_size,
        ..Default::default()
    };

    let collected = decode_all(data, config);
    assert_eq!(collected.samples, vec![0.0, 0.5, -1.0, 32_767.0 / 32_768.0]);
    assert_eq!(collected.calls.iter().sum::<usize>(), 4);
}

#[test]
fn every_callback_holds_whole_frames() {
    let samples = ramp(1_000, 2);
    let data = pcm16_wav(2, 48_000, &samples);
    let host = ScriptedHost::new(data);
    let config = DecoderConfig {
        parsing_buffer_size: 333,
        ..Default::default()
    };

    let mut total_frames = 0;
    let sink = |frames: usize, samples: &[f32]| {
        assert_eq!(samples.len(), frames * 2);
        total_frames += frames;
    };
    let mut decoder = Decoder::with_config(config, host, sink).unwrap();
    while !decoder.eof().unwrap() {
        decoder.decode_next().unwrap();
    }
    drop(decoder);
    assert_eq!(total_frames, 1_000);
}

#[test]
fn twenty_four_bit_and_float_samples() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 22_050,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let data = hound_wav(spec, &[0x40_0000i32, -0x80_0000, 0, -0x40_0000]);
    let collected = decode_all(data, DecoderConfig::default());
    assert_eq!(collected.samples, vec![0.5, -1.0, 0.0, -0.5]);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22_050,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let data = hound_wav(spec, &[0.25f32, -0.75, 1.0]);
    let collected = decode_all(data, DecoderConfig::default());
    assert_eq!(collected.samples, vec![0.25, -0.75, 1.0]);
}

#[test]
fn format_describes_canonical_output() {
    let data = pcm16_wav(2, 48_000, &ramp(250, 2));
    let mut decoder = Decoder::new(ScriptedHost::new(data), Vec::<f32>::new()).unwrap();

    let format = decoder.format().unwrap();
    assert_eq!(format.channels, 2);
    assert_eq!(format.sample_rate, 48_000);
    assert_eq!(format.sample_format, SampleFormat::F32);
    assert_eq!(format.length_in_frames, 250);
    assert_eq!(format.codec, CodecId::LINEAR_PCM);
    assert_eq!(format.file_type, Some(FileType::WAVE));
}

#[test]
fn hint_and_detection_agree() {
    let data = pcm16_wav(1, 8_000, &ramp(64, 1));
    let detected = decode_all(data.clone(), DecoderConfig::default());
    let hinted = decode_all(
        data,
        DecoderConfig {
            file_type_hint: FileType::WAVE.into(),
            ..Default::default()
        },
    );
    assert_eq!(detected.samples, hinted.samples);
    assert_eq!(detected.samples.len(), 64);
}

#[test]
fn forward_only_source_decodes_to_the_end() {
    let samples = ramp(300, 1);
    let data = pcm16_wav(1, 16_000, &samples);
    let host = ReadOnlyHost::new(&data[..]);

    let mut decoder = Decoder::builder()
        .with_data(host)
        .with_sink(Vec::<f32>::new())
        .with_parsing_buffer_size(100)
        .build()
        .unwrap();
    decoder.decode(usize::MAX).unwrap();

    let expected: Vec<f32> = samples.iter().map(|&s| f32::from(s) / 32_768.0).collect();
    assert_eq!(decoder.sink(), &expected);
}

#[test]
fn decode_reads_at_most_the_requested_bytes() {
    let data = pcm16_wav(1, 16_000, &ramp(1_000, 1));
    let config = DecoderConfig {
        parsing_buffer_size: 64,
        ..Default::default()
    };
    let host = ScriptedHost::new(data);
    let mut decoder = Decoder::with_config(config, host, Vec::<f32>::new()).unwrap();
    let before = decoder.host().position();

    assert_eq!(decoder.decode(100).unwrap(), 100);
    assert_eq!(decoder.host().position(), before + 100);
    assert!(decoder.host().reads.iter().all(|&len| len <= 64));
}

quickcheck! {
    fn any_pcm16_stream_round_trips(samples: Vec<i16>, stereo: bool, buffer: u8) -> TestResult {
        let channels = if stereo { 2 } else { 1 };
        if samples.is_empty() || samples.len() % channels != 0 {
            return TestResult::discard();
        }

        let data = pcm16_wav(channels as u16, 44_100, &samples);
        let config = DecoderConfig {
            parsing_buffer_size: usize::from(buffer).max(1),
            ..Default::default()
        };
        let collected = decode_all(data, config);
        let expected: Vec<f32> = samples.iter().map(|&s| f32::from(s) / 32_768.0).collect();
        TestResult::from_bool(collected.samples == expected)
    }
}
