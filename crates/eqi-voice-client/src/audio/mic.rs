use crate::audio::CAPTURE_SAMPLE_RATE_HZ;
use crate::error::{Result, VoiceError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Microphone handle. Delivers mono f32 sample batches, resampled to
/// [`CAPTURE_SAMPLE_RATE_HZ`], over a bounded channel. Dropping the
/// handle releases the device.
pub struct MicCapture {
    rx: mpsc::Receiver<Vec<f32>>,
    _stream: cpal::Stream,
}

impl MicCapture {
    /// Open the named input device, or the host default when `name` is
    /// `None`.
    pub fn start(name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match name {
            Some(name) => host
                .input_devices()
                .map_err(|e| VoiceError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| VoiceError::Device(format!("input device not found: {name}")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| VoiceError::Device("no default input device".to_string()))?,
        };

        let config = device
            .default_input_config()
            .map_err(|e| VoiceError::Device(e.to_string()))?;
        let in_rate_hz = config.sample_rate().0;
        let channels = usize::from(config.channels());
        let stream_config: StreamConfig = config.clone().into();

        debug!(
            device = %device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
            rate = in_rate_hz,
            channels,
            "opening input stream"
        );

        let (tx, rx) = mpsc::channel::<Vec<f32>>(32);

        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, channels, in_rate_hz, tx, |s| s)?
            }
            SampleFormat::I16 => build_stream::<i16>(
                &device,
                &stream_config,
                channels,
                in_rate_hz,
                tx,
                |s| f32::from(s) / 32768.0,
            )?,
            SampleFormat::U16 => build_stream::<u16>(
                &device,
                &stream_config,
                channels,
                in_rate_hz,
                tx,
                |s| (f32::from(s) - 32768.0) / 32768.0,
            )?,
            other => {
                return Err(VoiceError::Device(format!(
                    "unsupported input sample format: {other:?}"
                )));
            }
        };

        stream.play().map_err(|e| VoiceError::Device(e.to_string()))?;

        Ok(Self { rx, _stream: stream })
    }

    pub async fn recv(&mut self) -> Option<Vec<f32>> {
        self.rx.recv().await
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    in_rate_hz: u32,
    tx: mpsc::Sender<Vec<f32>>,
    to_f32: fn(T) -> f32,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let mut resampler = (in_rate_hz != CAPTURE_SAMPLE_RATE_HZ)
        .then(|| LinearResampler::new(in_rate_hz, CAPTURE_SAMPLE_RATE_HZ));
    let mut mono = Vec::<f32>::new();
    let mut resampled = Vec::<f32>::new();
    // Samples the channel could not take yet; kept rather than dropped
    // so chunk ordering survives backpressure.
    let mut backlog = Vec::<f32>::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                downmix_to_mono(data, channels, to_f32, &mut mono);
                let samples = match resampler.as_mut() {
                    Some(r) => {
                        r.process_into(&mono, &mut resampled);
                        resampled.as_slice()
                    }
                    None => mono.as_slice(),
                };

                if samples.is_empty() && backlog.is_empty() {
                    return;
                }

                if backlog.is_empty() {
                    if let Err(mpsc::error::TrySendError::Full(batch)) =
                        tx.try_send(samples.to_vec())
                    {
                        backlog = batch;
                    }
                } else {
                    backlog.extend_from_slice(samples);
                    let batch = std::mem::take(&mut backlog);
                    if let Err(mpsc::error::TrySendError::Full(batch)) = tx.try_send(batch) {
                        backlog = batch;
                    }
                }
            },
            move |err| {
                warn!(error = %err, "input stream error");
            },
            None,
        )
        .map_err(|e| VoiceError::Device(e.to_string()))
}

fn downmix_to_mono<T: Copy>(data: &[T], channels: usize, to_f32: fn(T) -> f32, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend(data.iter().map(|&s| to_f32(s)));
        return;
    }

    let frames = data.len() / channels;
    out.reserve(frames);
    for frame in 0..frames {
        let base = frame * channels;
        let sum: f32 = data[base..base + channels].iter().map(|&s| to_f32(s)).sum();
        out.push(sum / channels as f32);
    }
}

struct LinearResampler {
    in_rate_hz: u32,
    out_rate_hz: u32,
    step: f64,
    pos: f64,
    buf: Vec<f32>,
}

impl LinearResampler {
    fn new(in_rate_hz: u32, out_rate_hz: u32) -> Self {
        Self {
            in_rate_hz,
            out_rate_hz,
            step: in_rate_hz as f64 / out_rate_hz as f64,
            pos: 0.0,
            buf: Vec::new(),
        }
    }

    fn process_into(&mut self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        if input.is_empty() {
            return;
        }

        self.buf.extend_from_slice(input);

        let approx = ((input.len() as u64 * self.out_rate_hz as u64)
            / self.in_rate_hz.max(1) as u64)
            .saturating_add(2) as usize;
        out.reserve(approx);

        while self.pos + 1.0 < self.buf.len() as f64 {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = self.buf[i];
            let b = self.buf[i + 1];
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }

        let drain = self.pos.floor() as usize;
        if drain > 0 {
            self.buf.drain(0..drain);
            self.pos -= drain as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let mut out = Vec::new();
        downmix_to_mono(&[0.5f32, -0.5, 1.0, 0.0], 2, |s| s, &mut out);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn downmix_mono_converts_in_place() {
        let mut out = Vec::new();
        downmix_to_mono(&[16384i16, -16384], 1, |s| f32::from(s) / 32768.0, &mut out);
        assert_eq!(out, vec![0.5, -0.5]);
    }

    #[test]
    fn resampler_halves_rate() {
        let mut r = LinearResampler::new(48_000, 24_000);
        let input: Vec<f32> = (0..96).map(|i| i as f32).collect();
        let mut out = Vec::new();
        r.process_into(&input, &mut out);
        // Roughly every other sample, linearly interpolated.
        assert!((out.len() as i64 - 48).abs() <= 2);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn resampler_is_stateful_across_batches() {
        let mut r = LinearResampler::new(48_000, 24_000);
        let mut total = 0usize;
        let mut out = Vec::new();
        for _ in 0..10 {
            let input = vec![0.25f32; 480];
            r.process_into(&input, &mut out);
            total += out.len();
        }
        // 4800 input samples at 2:1 should produce ~2400 outputs.
        assert!((total as i64 - 2400).abs() <= 4);
    }
}
