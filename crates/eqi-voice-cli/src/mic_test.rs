//! Local microphone meter, no backend required.

use crate::settings::Settings;
use anyhow::Result;
use clap::Args;
use eqi_voice_client::audio::AudioCaptureSession;
use std::io::Write;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

const BAR_WIDTH: usize = 40;
/// Full-scale end of the meter; matches the VAD threshold ceiling.
const METER_MAX_RMS: f32 = 0.2;

#[derive(Args, Debug)]
pub struct MicTestArgs {
    /// Input device name; defaults to the host default microphone
    #[arg(long)]
    pub device: Option<String>,

    /// Seconds to run; 0 runs until Ctrl+C
    #[arg(long, default_value = "10")]
    pub seconds: u64,
}

pub async fn run_mic_test(settings: &Settings, args: MicTestArgs) -> Result<()> {
    let device = args.device.as_deref().or(settings.mic_device.as_deref());
    let (mut capture, mut chunks_rx, mut levels_rx) = AudioCaptureSession::start(device)?;
    eprintln!(
        "capturing ({}) — threshold {:.3}, Ctrl+C to stop",
        capture.format().mime(),
        settings.vad_threshold
    );

    let deadline =
        (args.seconds > 0).then(|| Instant::now() + Duration::from_secs(args.seconds));
    let mut chunk_count = 0u64;
    let mut bytes = 0usize;
    let mut peak = 0.0f32;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sleep_deadline(deadline), if deadline.is_some() => break,
            chunk = chunks_rx.recv() => {
                let Some(chunk) = chunk else { break };
                chunk_count += 1;
                bytes += chunk.data.len();
            }
            level = levels_rx.recv() => {
                let Some(level) = level else { break };
                peak = peak.max(level);
                render_meter(level, settings.vad_threshold);
            }
        }
    }

    capture.signal_stop();
    while let Some(chunk) = chunks_rx.recv().await {
        chunk_count += 1;
        bytes += chunk.data.len();
    }
    capture.stopped().await;

    clear_line();
    eprintln!("{chunk_count} chunks, {bytes} bytes, peak rms {peak:.3}");
    Ok(())
}

async fn sleep_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn render_meter(level: f32, threshold: f32) {
    let filled = ((level / METER_MAX_RMS).clamp(0.0, 1.0) * BAR_WIDTH as f32) as usize;
    let marker = ((threshold / METER_MAX_RMS).clamp(0.0, 1.0) * BAR_WIDTH as f32) as usize;

    let mut bar = String::with_capacity(BAR_WIDTH);
    for i in 0..BAR_WIDTH {
        if i < filled {
            bar.push('█');
        } else if i == marker {
            bar.push('|');
        } else {
            bar.push('░');
        }
    }
    let tag = if level > threshold { "voice" } else { "quiet" };
    eprint!("\r\x1b[2K[{bar}] {level:.3} {tag}");
    let _ = std::io::stderr().flush();
}

fn clear_line() {
    eprint!("\r\x1b[2K");
    let _ = std::io::stderr().flush();
}
