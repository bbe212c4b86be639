//! Recording metadata derived from the uploaded bytes

use std::io::Cursor;
use tracing::debug;

/// Byte rate assumed when the payload is not a readable WAV file
const FALLBACK_BYTES_PER_SECOND: f64 = 16_000.0;

/// Content types accepted without a warning
pub const WAV_CONTENT_TYPES: [&str; 3] = ["audio/wav", "audio/wave", "audio/x-wav"];

/// Duration from the WAV header (frames / sample rate), else `len / 16000`
pub fn duration_seconds(audio: &[u8]) -> f64 {
    match hound::WavReader::new(Cursor::new(audio)) {
        Ok(reader) => {
            let spec = reader.spec();
            if spec.sample_rate == 0 {
                return fallback_duration(audio);
            }
            f64::from(reader.duration()) / f64::from(spec.sample_rate)
        }
        Err(e) => {
            debug!("Not a readable WAV payload ({}), estimating duration", e);
            fallback_duration(audio)
        }
    }
}

fn fallback_duration(audio: &[u8]) -> f64 {
    audio.len() as f64 / FALLBACK_BYTES_PER_SECOND
}

/// Whether a multipart content type names a WAV recording
pub fn is_wav_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .map(|ct| WAV_CONTENT_TYPES.contains(&ct.as_str()))
        .unwrap_or(false)
}
