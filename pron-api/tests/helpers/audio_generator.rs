//! WAV fixtures generated in memory

use std::io::Cursor;

/// Mono 16-bit PCM silence
pub fn silent_wav(sample_rate: u32, seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let frames = (f64::from(sample_rate) * seconds).round() as u32;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// One second of 16 kHz silence
pub fn one_second_wav() -> Vec<u8> {
    silent_wav(16_000, 1.0)
}
