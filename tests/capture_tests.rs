// WAV capture tests: files round-trip through hound and survive early drops.

use nest_gateway::{AudioFormat, AudioFrame, SessionCapture};

fn frame(samples: Vec<i16>, sequence: u64, offset_ms: u64) -> AudioFrame {
    AudioFrame {
        samples,
        sequence,
        offset_ms,
        end_of_audio: false,
    }
}

#[test]
fn capture_writes_a_readable_wav() {
    let dir = tempfile::tempdir().unwrap();
    let format = AudioFormat::default();

    let mut capture = SessionCapture::create(dir.path(), "cap-test", &format).unwrap();
    capture.write_frame(&frame(vec![1, 2, 3, 4], 0, 0)).unwrap();
    capture.write_frame(&frame(vec![5, 6], 1, 100)).unwrap();

    let path = capture.finish().unwrap();
    assert_eq!(path.file_name().unwrap(), "cap-test.wav");

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn dropped_capture_still_finalizes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let format = AudioFormat::default();

    let path = {
        let mut capture = SessionCapture::create(dir.path(), "dropped", &format).unwrap();
        capture.write_frame(&frame(vec![9; 160], 0, 0)).unwrap();
        capture.path().to_path_buf()
        // Dropped here without finish()
    };

    let mut reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.samples::<i16>().count(), 160);
}

#[test]
fn capture_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let format = AudioFormat::default();

    let capture = SessionCapture::create(&nested, "nested", &format).unwrap();
    assert!(capture.path().starts_with(&nested));
}
