//! Live voice turns over the duplex socket.

use crate::settings::Settings;
use anyhow::Result;
use clap::Args;
use eqi_voice_client::diff::diff_mcp;
use eqi_voice_client::mcp::Mcp;
use eqi_voice_client::session::{
    DuplexTranscriptSession, SessionState, StopReason, VoiceEvent,
};
use eqi_voice_client::TutorApi;
use std::io::Write;

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Reuse an existing session instead of creating one
    #[arg(long)]
    pub session_id: Option<i64>,

    /// Objective code forwarded to the backend
    #[arg(long)]
    pub objective: Option<String>,

    /// Chat history turns sent with the connection (1-20)
    #[arg(long)]
    pub hist: Option<u32>,

    /// Disable silence auto-stop and the stale-transcript watchdog
    #[arg(long)]
    pub no_auto_stop: bool,

    /// Input device name; defaults to the host default microphone
    #[arg(long)]
    pub device: Option<String>,

    /// RMS level above which audio counts as voice
    #[arg(long)]
    pub vad_threshold: Option<f32>,

    /// Record a single turn instead of looping until Ctrl+C
    #[arg(long)]
    pub once: bool,

    /// Persist the effective options to the settings file
    #[arg(long)]
    pub save: bool,
}

enum TurnOutcome {
    Completed,
    Interrupted,
    Failed,
}

pub async fn run_stream(settings: &Settings, args: StreamArgs) -> Result<()> {
    let mut merged = settings.clone();
    if let Some(code) = args.objective.clone() {
        merged.objective_code = Some(code);
    }
    if let Some(hist) = args.hist {
        merged.history_turns = hist;
    }
    if args.no_auto_stop {
        merged.auto_stop = false;
    }
    if let Some(device) = args.device.clone() {
        merged.mic_device = Some(device);
    }
    if let Some(threshold) = args.vad_threshold {
        merged.vad_threshold = threshold;
    }
    if args.save {
        merged.save()?;
    }

    let api = TutorApi::new(&merged.base_url)?;
    let session_id = match args.session_id {
        Some(id) => id,
        None => api.start_session().await?,
    };
    eprintln!("session {session_id} on {}", merged.base_url);

    let mut last_mcp: Option<Mcp> = None;
    loop {
        match run_turn(merged.session_config(session_id), &mut last_mcp).await {
            TurnOutcome::Completed if !args.once => {}
            TurnOutcome::Completed | TurnOutcome::Interrupted => break,
            TurnOutcome::Failed => anyhow::bail!("voice turn failed"),
        }
    }
    Ok(())
}

async fn run_turn(
    cfg: eqi_voice_client::SessionConfig,
    last_mcp: &mut Option<Mcp>,
) -> TurnOutcome {
    let (mut session, mut events) = DuplexTranscriptSession::new(cfg);
    session.start();

    let mut interrupted = false;
    let mut outcome = TurnOutcome::Completed;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                session.stop();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    VoiceEvent::Status(state) => render_status(state),
                    VoiceEvent::Partial(text) => {
                        eprint!("\r\x1b[2K{text}");
                        let _ = std::io::stderr().flush();
                    }
                    VoiceEvent::Final { transcript, reply } => {
                        clear_status_line();
                        println!("you:   {transcript}");
                        println!("tutor: {}", reply.text);
                        if let Some(reward) = reply.reward {
                            println!("reward: {reward:.3}");
                        }
                        for change in diff_mcp(last_mcp.as_ref(), &reply.mcp) {
                            println!("  {change}");
                        }
                        *last_mcp = Some(reply.mcp);
                    }
                    VoiceEvent::Failed(err) => {
                        clear_status_line();
                        eprintln!("error: {err}");
                        outcome = TurnOutcome::Failed;
                    }
                    VoiceEvent::Stopped(reason) => {
                        clear_status_line();
                        eprintln!("stopped ({})", describe_stop(reason));
                    }
                }
            }
        }
    }

    session.finished().await;
    if interrupted {
        TurnOutcome::Interrupted
    } else {
        outcome
    }
}

fn render_status(state: SessionState) {
    match state {
        SessionState::Connecting => eprintln!("connecting..."),
        SessionState::Ready => eprintln!("server ready, opening microphone..."),
        SessionState::Recording => eprintln!("listening (Ctrl+C to stop)"),
        SessionState::Idle => {}
    }
}

fn describe_stop(reason: StopReason) -> &'static str {
    match reason {
        StopReason::User => "requested",
        StopReason::Silence => "silence detected",
        StopReason::MaxDuration => "recording limit reached",
        StopReason::StalePartial => "no transcript progress",
    }
}

fn clear_status_line() {
    eprint!("\r\x1b[2K");
    let _ = std::io::stderr().flush();
}
