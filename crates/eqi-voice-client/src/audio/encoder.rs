use crate::audio::AudioFormat;

/// Seam between capture and the wire format. Codec internals are out of
/// scope here; the capture backend reports what it can produce and the
/// negotiated encoder turns sample windows into chunk payloads.
pub trait AudioEncoder: Send {
    fn format(&self) -> AudioFormat;

    /// Encode one window of mono f32 samples.
    fn encode(&mut self, pcm: &[f32]) -> Vec<u8>;

    /// Flush any buffered state. Called once when capture stops.
    fn finish(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

/// Raw PCM passthrough: f32 samples to little-endian i16. This is the
/// fallback format and the only one the cpal backend produces natively.
#[derive(Clone, Copy, Debug, Default)]
pub struct PcmEncoder;

impl AudioEncoder for PcmEncoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Pcm
    }

    fn encode(&mut self, pcm: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(pcm.len() * 2);
        for &sample in pcm {
            let clamped = sample.clamp(-1.0, 1.0);
            out.extend_from_slice(&((clamped * 32767.0) as i16).to_le_bytes());
        }
        out
    }
}

/// Build the encoder for a negotiated format.
pub fn encoder_for(format: AudioFormat) -> Box<dyn AudioEncoder> {
    match format {
        // Container formats would be produced by a capture backend that
        // supports them natively; the local backend yields raw PCM.
        AudioFormat::OpusWebm | AudioFormat::Webm | AudioFormat::Mp4 | AudioFormat::Pcm => {
            Box::new(PcmEncoder)
        }
    }
}
