//! End-to-end encoding through the component and the simulated DSP

use omx_cli::{encode_file, encode_pcm, load_pcm};
use omx_core::{ComponentConfig, INPUT_FRAME_SIZE, OUTPUT_FRAME_SIZE, OUTPUT_FRAME_SIZE_MIME};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tone(samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| (((i % 40) as i16) - 20) * 800)
        .collect()
}

fn to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[test]
fn test_encode_whole_frames() {
    init_logging();
    let pcm = to_bytes(&tone(800));
    let (encoded, summary) = encode_pcm(&pcm, ComponentConfig::application()).unwrap();

    assert_eq!(summary.frames_in, 10);
    assert_eq!(encoded.len(), 10 * OUTPUT_FRAME_SIZE);
    assert_eq!(summary.bytes_out, encoded.len());
    // Every frame starts with the speech frame type
    for frame in encoded.chunks(OUTPUT_FRAME_SIZE) {
        assert_eq!(u16::from_le_bytes([frame[0], frame[1]]), 1);
    }
}

#[test]
fn test_partial_last_frame_is_padded() {
    init_logging();
    let pcm = to_bytes(&tone(250));
    assert_eq!(pcm.len(), 500);
    let (encoded, summary) = encode_pcm(&pcm, ComponentConfig::application()).unwrap();

    assert_eq!(summary.frames_in, pcm.len().div_ceil(INPUT_FRAME_SIZE));
    assert_eq!(encoded.len(), 4 * OUTPUT_FRAME_SIZE);
}

#[test]
fn test_mime_frames() {
    init_logging();
    let pcm = to_bytes(&tone(320));
    let config = ComponentConfig::application().with_mime(true);
    let (encoded, _) = encode_pcm(&pcm, config).unwrap();
    assert_eq!(encoded.len(), 4 * OUTPUT_FRAME_SIZE_MIME);
}

#[test]
fn test_empty_input_still_completes() {
    init_logging();
    let (encoded, summary) = encode_pcm(&[], ComponentConfig::application()).unwrap();
    assert!(encoded.is_empty());
    assert_eq!(summary.frames_in, 0);
}

#[test]
fn test_multiple_buffers_per_port() {
    init_logging();
    let pcm = to_bytes(&tone(1600));
    let config = ComponentConfig::application().with_buffer_counts(3, 2);
    let (encoded, summary) = encode_pcm(&pcm, config).unwrap();
    assert_eq!(summary.frames_in, 20);
    assert_eq!(encoded.len(), 20 * OUTPUT_FRAME_SIZE);
}

#[test]
fn test_encode_raw_file() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("speech.pcm");
    let output = dir.path().join("speech.g729");
    std::fs::write(&input, to_bytes(&tone(480))).unwrap();

    let summary = encode_file(&input, &output, ComponentConfig::application()).unwrap();
    let written = std::fs::read(&output).unwrap();
    assert_eq!(summary.frames_in, 6);
    assert_eq!(written.len(), 6 * OUTPUT_FRAME_SIZE);
}

#[test]
fn test_odd_trailing_byte_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odd.pcm");
    let mut bytes = to_bytes(&tone(10));
    bytes.push(0x7f);
    std::fs::write(&path, &bytes).unwrap();

    let pcm = load_pcm(&path).unwrap();
    assert_eq!(pcm.len(), 20);
    assert_eq!(pcm, to_bytes(&tone(10)));
}

#[test]
fn test_missing_input_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.pcm");
    let err = load_pcm(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.pcm"));
}
