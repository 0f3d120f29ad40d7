mod common;

use common::*;
use pvoc_oracle::{
    analyze, synthesize, AnalysisStream, OracleError, SampleBuffer, Synthesizer, WindowType,
};

fn stereo_input() -> SampleBuffer {
    let left = gen_two_tone(220.0, 0.4, 1760.0, 0.2, 44100, 10_000);
    let right = gen_sine(660.0, 44100, 10_000, |i| 0.5 * (i as f64 / 10_000.0));
    SampleBuffer::from_channels(&[left, right], 44100).unwrap()
}

#[test]
fn test_saved_stream_resynthesizes_bit_identically() {
    let stream = analyze(&stereo_input(), 1024, 256, WindowType::Hann).unwrap();
    let direct = synthesize(&stream).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.pvas");
    stream.save(&path).unwrap();
    let loaded = AnalysisStream::load(&path).unwrap();
    assert_eq!(loaded, stream);

    let reloaded = synthesize(&loaded).unwrap();
    assert_eq!(reloaded.data(), direct.data());
}

#[test]
fn test_json_stream_resynthesizes_bit_identically() {
    let stream = analyze(&stereo_input(), 512, 64, WindowType::Kaiser(800)).unwrap();
    let json = stream.to_json().unwrap();
    let parsed = AnalysisStream::from_json(&json).unwrap();
    assert_eq!(parsed, stream);

    let stretch = Synthesizer::with_hop(32);
    assert_eq!(
        stretch.synthesize(&parsed).unwrap().data(),
        stretch.synthesize(&stream).unwrap().data()
    );
}

#[test]
fn test_truncated_file_is_serialization_error() {
    let stream = analyze(&stereo_input(), 1024, 256, WindowType::Hann).unwrap();
    let bytes = stream.to_bytes().unwrap();

    for cut in [0, 3, 20, bytes.len() / 2, bytes.len() - 1] {
        let err = AnalysisStream::from_bytes(&bytes[..cut]).unwrap_err();
        assert!(
            matches!(err, OracleError::SerializationError(_)),
            "cut at {} gave {:?}",
            cut,
            err
        );
    }

    let mut padded = bytes.clone();
    padded.push(0);
    assert!(matches!(
        AnalysisStream::from_bytes(&padded),
        Err(OracleError::SerializationError(_))
    ));
}

#[test]
fn test_corrupt_header_is_serialization_error() {
    let stream = analyze(&stereo_input(), 1024, 256, WindowType::Hann).unwrap();
    let mut bytes = stream.to_bytes().unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        AnalysisStream::from_bytes(&bytes),
        Err(OracleError::SerializationError(_))
    ));

    let mut bytes = stream.to_bytes().unwrap();
    bytes[4] = 99; // version
    assert!(matches!(
        AnalysisStream::from_bytes(&bytes),
        Err(OracleError::SerializationError(_))
    ));

    assert!(matches!(
        AnalysisStream::from_json("{\"metadata\": 1}"),
        Err(OracleError::SerializationError(_))
    ));
}

#[test]
fn test_empty_stream_persists() {
    let empty = SampleBuffer::mono(vec![], 8000).unwrap();
    let stream = analyze(&empty, 256, 64, WindowType::Hann).unwrap();
    let bytes = stream.to_bytes().unwrap();
    let back = AnalysisStream::from_bytes(&bytes).unwrap();
    assert!(back.is_empty());
    assert_eq!(back.metadata(), stream.metadata());
    assert!(matches!(synthesize(&back), Err(OracleError::InvalidInput(_))));
}

#[test]
fn test_corrupt_sample_count_fails_to_load() {
    let stream = analyze(&stereo_input(), 1024, 256, WindowType::Hann).unwrap();
    let mut bytes = stream.to_bytes().unwrap();
    // magic, version, fft, hop, window tag and param, rate, channels
    let at = 4 + 2 + 8 + 8 + 1 + 4 + 4 + 2;
    assert_eq!(
        u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap()),
        10_000
    );
    bytes[at..at + 8].copy_from_slice(&(1u64 << 62).to_le_bytes());
    let err = AnalysisStream::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, OracleError::SerializationError(_)), "{:?}", err);

    // One sample past the last frame's reach is already inconsistent
    let reach = (stream.frame_count() as u64 - 1) * 256 + 1024;
    bytes[at..at + 8].copy_from_slice(&(reach + 1).to_le_bytes());
    assert!(AnalysisStream::from_bytes(&bytes).is_err());
    bytes[at..at + 8].copy_from_slice(&reach.to_le_bytes());
    let padded = AnalysisStream::from_bytes(&bytes).unwrap();
    assert_eq!(synthesize(&padded).unwrap().num_frames() as u64, reach);
}
