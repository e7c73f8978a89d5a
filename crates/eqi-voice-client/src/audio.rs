//! Audio capture and chunk production.

use serde::{Deserialize, Serialize};

pub mod encoder;
pub use encoder::{encoder_for, AudioEncoder, PcmEncoder};

#[cfg(feature = "mic")]
pub mod mic;
#[cfg(feature = "mic")]
pub use mic::MicCapture;
#[cfg(feature = "mic")]
mod capture;
#[cfg(feature = "mic")]
pub use capture::AudioCaptureSession;

/// Nominal interval between emitted chunks.
pub const CHUNK_INTERVAL_MS: u64 = 300;

/// Internal capture rate; everything is downmixed/resampled to this.
pub const CAPTURE_SAMPLE_RATE_HZ: u32 = 24_000;

/// Samples per 300 ms chunk at the capture rate.
pub const CHUNK_SAMPLES: usize =
    (CAPTURE_SAMPLE_RATE_HZ as usize * CHUNK_INTERVAL_MS as usize) / 1000;

/// Container/codec for outgoing audio, ordered here by preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// Opus in a WebM container.
    OpusWebm,
    /// WebM with a backend-chosen codec.
    Webm,
    /// MP4 container.
    Mp4,
    /// Raw little-endian 16-bit PCM at [`CAPTURE_SAMPLE_RATE_HZ`].
    Pcm,
}

impl AudioFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            AudioFormat::OpusWebm => "audio/webm;codecs=opus",
            AudioFormat::Webm => "audio/webm",
            AudioFormat::Mp4 => "audio/mp4",
            AudioFormat::Pcm => "audio/pcm",
        }
    }
}

/// Pick the best format the capture backend supports, walking the
/// preference list opus-in-webm → webm → mp4. Falls back to raw PCM
/// when nothing on the list is available.
pub fn negotiate_format(supported: &[AudioFormat]) -> AudioFormat {
    const PREFERENCE: [AudioFormat; 3] =
        [AudioFormat::OpusWebm, AudioFormat::Webm, AudioFormat::Mp4];

    PREFERENCE
        .into_iter()
        .find(|f| supported.contains(f))
        .unwrap_or(AudioFormat::Pcm)
}

/// One encoded fragment of audio. Chunks are ordered by `seq` and must
/// reach the transport in that order; none is ever retransmitted.
#[derive(Clone, Debug)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub format: AudioFormat,
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_walks_the_preference_list() {
        assert_eq!(
            negotiate_format(&[AudioFormat::Mp4, AudioFormat::OpusWebm]),
            AudioFormat::OpusWebm
        );
        assert_eq!(negotiate_format(&[AudioFormat::Webm, AudioFormat::Mp4]), AudioFormat::Webm);
        assert_eq!(negotiate_format(&[AudioFormat::Mp4]), AudioFormat::Mp4);
    }

    #[test]
    fn negotiation_falls_back_to_pcm() {
        assert_eq!(negotiate_format(&[]), AudioFormat::Pcm);
        assert_eq!(negotiate_format(&[AudioFormat::Pcm]), AudioFormat::Pcm);
    }

    #[test]
    fn chunk_samples_cover_300ms() {
        assert_eq!(CHUNK_SAMPLES, 7200);
    }
}
