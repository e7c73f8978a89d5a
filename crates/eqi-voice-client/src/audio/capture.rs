use crate::audio::{
    encoder_for, negotiate_format, AudioChunk, AudioFormat, MicCapture, CHUNK_SAMPLES,
};
use crate::error::Result;
use crate::vad::rms;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Formats the cpal backend can produce natively. Container formats
/// would come from a platform recorder; this backend yields raw PCM.
const MIC_FORMATS: &[AudioFormat] = &[AudioFormat::Pcm];

/// Owns the microphone and an encoder, emitting ordered 300 ms
/// [`AudioChunk`]s plus RMS level taps for the VAD.
///
/// Stopping is idempotent and safe before capture produced anything.
/// The device is released before the final partial chunk is flushed, so
/// no handle outlives the session.
pub struct AudioCaptureSession {
    format: AudioFormat,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl AudioCaptureSession {
    /// Acquire the input device and start producing chunks. On failure
    /// nothing is left open.
    pub fn start(
        device: Option<&str>,
    ) -> Result<(Self, mpsc::Receiver<AudioChunk>, mpsc::Receiver<f32>)> {
        let mic = MicCapture::start(device)?;
        let format = negotiate_format(MIC_FORMATS);
        let mut encoder = encoder_for(format);

        let (chunks_tx, chunks_rx) = mpsc::channel::<AudioChunk>(32);
        let (levels_tx, levels_rx) = mpsc::channel::<f32>(32);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut mic = mic;
            let mut pending = Vec::<f32>::new();
            let mut seq = 0u64;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    batch = mic.recv() => {
                        let Some(batch) = batch else { break };

                        // Level taps are best-effort; chunks are not.
                        let _ = levels_tx.try_send(rms(&batch));

                        pending.extend_from_slice(&batch);
                        while pending.len() >= CHUNK_SAMPLES {
                            let window: Vec<f32> = pending.drain(..CHUNK_SAMPLES).collect();
                            let data = encoder.encode(&window);
                            if chunks_tx.send(AudioChunk { data, format, seq }).await.is_err() {
                                return;
                            }
                            seq += 1;
                        }
                    }
                }
            }

            // Release the device, then flush the buffered partial
            // chunk and any encoder tail.
            drop(mic);
            if !pending.is_empty() {
                let data = encoder.encode(&pending);
                if chunks_tx.send(AudioChunk { data, format, seq }).await.is_err() {
                    return;
                }
                seq += 1;
            }
            let tail = encoder.finish();
            if !tail.is_empty() {
                let _ = chunks_tx.send(AudioChunk { data: tail, format, seq }).await;
            }
            debug!(chunks = seq, "capture flushed");
        });

        Ok((Self { format, stop_tx, task: Some(task) }, chunks_rx, levels_rx))
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Ask the capture task to stop and flush. Idempotent. The caller
    /// must keep draining the chunk channel until it closes so the
    /// flush can complete.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the capture task to finish. Idempotent.
    pub async fn stopped(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Convenience for callers that do not forward chunks anywhere:
    /// signal, then wait. Relies on channel capacity for the flush.
    pub async fn stop(&mut self) {
        self.signal_stop();
        self.stopped().await;
    }
}
