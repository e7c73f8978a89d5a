//! Duplex transcript session: the protocol state machine and its
//! async driver.
//!
//! The state machine is a pure function from inputs to effects, which
//! keeps the protocol rules testable without a socket or a microphone.
//! The driver owns the tokio plumbing: it turns socket frames, audio
//! chunks, level taps, watchdog ticks and user stop requests into
//! inputs, and executes the effects the machine returns.

use crate::audio::AudioChunk;
use crate::config::SessionConfig;
use crate::error::VoiceError;
use crate::mcp::TutorReply;
use crate::protocol::ServerEvent;
use crate::reconcile::PartialReconciler;
use crate::vad::VoiceActivityDetector;
use crate::ws::{self, Connection, SendCmd, WsIncoming};

#[cfg(feature = "mic")]
use crate::audio::AudioCaptureSession;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Hard ceiling on one recording, measured from capture start.
pub const MAX_RECORDING: Duration = Duration::from_secs(25);

/// Auto-stop when no partial has been accepted for this long while
/// recording. Only armed when auto-stop is enabled.
pub const STALE_PARTIAL: Duration = Duration::from_secs(10);

/// Delay between the stop control message and teardown, giving the
/// server a last chance to deliver its final transcript.
pub const STOP_GRACE: Duration = Duration::from_millis(50);

const WATCHDOG_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Socket opened, waiting for the server's ready event.
    Connecting,
    /// Server is ready; the input device is being acquired.
    Ready,
    Recording,
}

/// Why a session ended without a server-side terminal event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop request from the caller.
    User,
    /// The voice activity detector observed enough trailing silence.
    Silence,
    /// The recording hit the hard duration ceiling.
    MaxDuration,
    /// No partial transcript arrived for too long.
    StalePartial,
}

/// Everything a consumer sees from a running session. Exactly one of
/// `Final`, `Failed` or `Stopped` is delivered per session, and nothing
/// follows it.
#[derive(Clone, Debug)]
pub enum VoiceEvent {
    Status(SessionState),
    /// A deduplicated, sanitized incremental transcript.
    Partial(String),
    Final { transcript: String, reply: TutorReply },
    Failed(VoiceError),
    Stopped(StopReason),
}

#[derive(Debug)]
enum Input {
    Start,
    ServerReady,
    DeviceAcquired,
    DeviceFailed(String),
    ServerPartial(String),
    ServerFinal { transcript: String, reply: TutorReply },
    ServerError(String),
    LocalStop(StopReason),
    GraceElapsed,
    TransportLost(Option<String>),
}

#[derive(Debug)]
enum Effect {
    OpenConnection,
    AcquireDevice,
    StartStreaming,
    EmitPartial(String),
    /// Stop capture and forward whatever chunks it still holds.
    DrainCapture,
    SendStop,
    ArmGrace,
    /// Stop capture and discard anything still buffered.
    StopCapture,
    CloseConnection,
    DeliverFinal { transcript: String, reply: TutorReply },
    DeliverError(VoiceError),
    DeliverStopped(StopReason),
}

/// Pure protocol state machine. One input in, a short list of effects
/// out; all I/O happens in the driver.
struct Machine {
    state: SessionState,
    reconciler: PartialReconciler,
    stop_sent: bool,
    stop_reason: Option<StopReason>,
    done: bool,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            reconciler: PartialReconciler::new(),
            stop_sent: false,
            stop_reason: None,
            done: false,
        }
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) {
        self.done = true;
    }

    fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.done {
            return Vec::new();
        }

        match input {
            Input::Start => match self.state {
                SessionState::Idle => {
                    self.state = SessionState::Connecting;
                    vec![Effect::OpenConnection]
                }
                _ => Vec::new(),
            },

            Input::ServerReady => match self.state {
                SessionState::Connecting => {
                    self.state = SessionState::Ready;
                    vec![Effect::AcquireDevice]
                }
                // A repeated ready is framing noise.
                _ => Vec::new(),
            },

            Input::DeviceAcquired => match self.state {
                SessionState::Ready => {
                    self.state = SessionState::Recording;
                    vec![Effect::StartStreaming]
                }
                _ => Vec::new(),
            },

            Input::DeviceFailed(message) => {
                self.finish();
                vec![
                    Effect::CloseConnection,
                    Effect::DeliverError(VoiceError::Device(message)),
                ]
            }

            Input::ServerPartial(text) => match self.state {
                SessionState::Ready | SessionState::Recording => {
                    match self.reconciler.push(&text) {
                        Some(accepted) => vec![Effect::EmitPartial(accepted)],
                        None => Vec::new(),
                    }
                }
                _ => Vec::new(),
            },

            // A final is honored even after a local stop was sent: the
            // server got our audio and its answer is the whole point.
            Input::ServerFinal { transcript, reply } => {
                self.finish();
                vec![
                    Effect::StopCapture,
                    Effect::CloseConnection,
                    Effect::DeliverFinal { transcript, reply },
                ]
            }

            Input::ServerError(message) => {
                self.finish();
                vec![
                    Effect::StopCapture,
                    Effect::CloseConnection,
                    Effect::DeliverError(VoiceError::Server(message)),
                ]
            }

            Input::LocalStop(reason) => {
                if self.stop_sent {
                    return Vec::new();
                }
                self.stop_reason = Some(reason);
                match self.state {
                    SessionState::Recording => {
                        self.stop_sent = true;
                        vec![Effect::DrainCapture, Effect::SendStop, Effect::ArmGrace]
                    }
                    // Nothing is streaming yet; tear down directly.
                    _ => {
                        self.finish();
                        vec![
                            Effect::StopCapture,
                            Effect::CloseConnection,
                            Effect::DeliverStopped(reason),
                        ]
                    }
                }
            }

            Input::GraceElapsed => {
                if !self.stop_sent {
                    return Vec::new();
                }
                self.finish();
                vec![
                    Effect::CloseConnection,
                    Effect::DeliverStopped(self.stop_reason.unwrap_or(StopReason::User)),
                ]
            }

            Input::TransportLost(reason) => {
                self.finish();
                match reason {
                    Some(message) => vec![
                        Effect::StopCapture,
                        Effect::DeliverError(VoiceError::Transport(message)),
                    ],
                    // A clean close after our stop message is a normal
                    // ending; before it, the server hung up on us.
                    None if self.stop_sent => vec![
                        Effect::StopCapture,
                        Effect::DeliverStopped(self.stop_reason.unwrap_or(StopReason::User)),
                    ],
                    None => vec![
                        Effect::StopCapture,
                        Effect::DeliverError(VoiceError::Transport(
                            "connection closed before a final transcript".to_string(),
                        )),
                    ],
                }
            }
        }
    }
}

fn input_from_event(event: ServerEvent) -> Input {
    match event {
        ServerEvent::Ready => Input::ServerReady,
        ServerEvent::Partial { text } => Input::ServerPartial(text),
        ServerEvent::Final { transcript, reply } => Input::ServerFinal { transcript, reply },
        ServerEvent::Error { message } => Input::ServerError(message),
    }
}

async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// One voice turn against the tutoring backend.
///
/// Created idle; [`start`](Self::start) spawns the driver, events flow
/// over the receiver returned from [`new`](Self::new), and the session
/// ends with exactly one terminal event. `start` and
/// [`stop`](Self::stop) are both idempotent.
pub struct DuplexTranscriptSession {
    stop_tx: watch::Sender<bool>,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    runner: Option<Runner>,
}

impl DuplexTranscriptSession {
    pub fn new(cfg: SessionConfig) -> (Self, mpsc::Receiver<VoiceEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let active = Arc::new(AtomicBool::new(false));

        let runner = Runner {
            cfg,
            machine: Machine::new(),
            events_tx,
            stop_rx,
            active: Arc::clone(&active),
            conn: None,
            chunks_rx: None,
            levels_rx: None,
        };

        (Self { stop_tx, active, task: None, runner: Some(runner) }, events_rx)
    }

    /// Begin the turn. A second call while the session is running or
    /// after it ended is a no-op.
    pub fn start(&mut self) {
        if let Some(runner) = self.runner.take() {
            self.active.store(true, Ordering::SeqCst);
            self.task = Some(tokio::spawn(runner.run()));
        }
    }

    /// Request a user stop. Idempotent; safe from any task.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for the driver to finish. Returns immediately when the
    /// session never started or already ended.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

struct Runner {
    cfg: SessionConfig,
    machine: Machine,
    events_tx: mpsc::Sender<VoiceEvent>,
    stop_rx: watch::Receiver<bool>,
    active: Arc<AtomicBool>,
    /// Pre-opened transport; when `None` the driver dials the
    /// configured endpoint itself.
    conn: Option<Connection>,
    /// Pre-wired capture channels; when `None` the driver opens the
    /// microphone once the server is ready.
    chunks_rx: Option<mpsc::Receiver<AudioChunk>>,
    levels_rx: Option<mpsc::Receiver<f32>>,
}

impl Runner {
    async fn run(mut self) {
        let mut queue: VecDeque<Input> = VecDeque::new();
        queue.push_back(Input::Start);

        let mut cmd_tx: Option<mpsc::Sender<SendCmd>> = None;
        let mut incoming_rx: Option<mpsc::Receiver<WsIncoming>> = None;
        let mut ws_task: Option<JoinHandle<()>> = None;
        if let Some(conn) = self.conn.take() {
            cmd_tx = Some(conn.cmd_tx);
            incoming_rx = Some(conn.incoming_rx);
            ws_task = Some(conn.task);
        }

        let mut chunks_rx = self.chunks_rx.take();
        let mut levels_rx = self.levels_rx.take();
        #[cfg(feature = "mic")]
        let mut capture_ctrl: Option<AudioCaptureSession> = None;

        let mut vad: Option<VoiceActivityDetector> = None;
        let mut recording_started: Option<Instant> = None;
        let mut last_partial_at: Option<Instant> = None;
        let mut watchdog_at: Option<Instant> = None;
        let mut grace_at: Option<Instant> = None;
        let mut last_status = SessionState::Idle;
        let mut stop_requested = false;

        loop {
            while let Some(input) = queue.pop_front() {
                for effect in self.machine.handle(input) {
                    match effect {
                        Effect::OpenConnection => {
                            if cmd_tx.is_none() {
                                match ws::connect(&self.cfg).await {
                                    Ok(conn) => {
                                        cmd_tx = Some(conn.cmd_tx);
                                        incoming_rx = Some(conn.incoming_rx);
                                        ws_task = Some(conn.task);
                                    }
                                    Err(e) => {
                                        queue.push_back(Input::TransportLost(Some(e.to_string())));
                                    }
                                }
                            }
                        }

                        Effect::AcquireDevice => {
                            if chunks_rx.is_some() {
                                queue.push_back(Input::DeviceAcquired);
                            } else {
                                #[cfg(feature = "mic")]
                                match AudioCaptureSession::start(self.cfg.mic_device.as_deref()) {
                                    Ok((ctrl, chunks, levels)) => {
                                        capture_ctrl = Some(ctrl);
                                        chunks_rx = Some(chunks);
                                        levels_rx = Some(levels);
                                        queue.push_back(Input::DeviceAcquired);
                                    }
                                    Err(e) => {
                                        queue.push_back(Input::DeviceFailed(e.to_string()));
                                    }
                                }
                                #[cfg(not(feature = "mic"))]
                                queue.push_back(Input::DeviceFailed(
                                    "no capture backend compiled in".to_string(),
                                ));
                            }
                        }

                        Effect::StartStreaming => {
                            let now = Instant::now();
                            vad = Some(VoiceActivityDetector::new(
                                self.cfg.vad,
                                self.cfg.auto_stop,
                                now,
                            ));
                            recording_started = Some(now);
                            last_partial_at = Some(now);
                            watchdog_at = Some(now + WATCHDOG_TICK);
                            debug!("recording started");
                        }

                        Effect::EmitPartial(text) => {
                            last_partial_at = Some(Instant::now());
                            let _ = self.events_tx.send(VoiceEvent::Partial(text)).await;
                        }

                        Effect::DrainCapture => {
                            watchdog_at = None;
                            #[cfg(feature = "mic")]
                            if let Some(mut ctrl) = capture_ctrl.take() {
                                ctrl.signal_stop();
                                if let Some(rx) = chunks_rx.as_mut() {
                                    while let Some(chunk) = rx.recv().await {
                                        forward_audio(cmd_tx.as_ref(), chunk).await;
                                    }
                                }
                                ctrl.stopped().await;
                            }
                            if let Some(rx) = chunks_rx.as_mut() {
                                while let Ok(chunk) = rx.try_recv() {
                                    forward_audio(cmd_tx.as_ref(), chunk).await;
                                }
                            }
                            chunks_rx = None;
                            levels_rx = None;
                        }

                        Effect::SendStop => {
                            if let Some(tx) = cmd_tx.as_ref() {
                                if tx.send(SendCmd::Stop).await.is_err() {
                                    warn!("stop message lost: send channel closed");
                                }
                            }
                        }

                        Effect::ArmGrace => {
                            grace_at = Some(Instant::now() + STOP_GRACE);
                        }

                        Effect::StopCapture => {
                            #[cfg(feature = "mic")]
                            if let Some(ctrl) = capture_ctrl.take() {
                                ctrl.signal_stop();
                            }
                            chunks_rx = None;
                            levels_rx = None;
                            watchdog_at = None;
                        }

                        Effect::CloseConnection => {
                            if let Some(tx) = cmd_tx.take() {
                                let _ = tx.try_send(SendCmd::Close);
                            }
                            incoming_rx = None;
                        }

                        Effect::DeliverFinal { transcript, reply } => {
                            info!("final transcript delivered");
                            let _ =
                                self.events_tx.send(VoiceEvent::Final { transcript, reply }).await;
                        }

                        Effect::DeliverError(err) => {
                            warn!(error = %err, "session failed");
                            let _ = self.events_tx.send(VoiceEvent::Failed(err)).await;
                        }

                        Effect::DeliverStopped(reason) => {
                            info!(?reason, "session stopped");
                            let _ = self.events_tx.send(VoiceEvent::Stopped(reason)).await;
                        }
                    }
                }

                if !self.machine.is_done() && self.machine.state() != last_status {
                    last_status = self.machine.state();
                    let _ = self.events_tx.send(VoiceEvent::Status(last_status)).await;
                }
            }

            if self.machine.is_done() {
                break;
            }

            tokio::select! {
                res = self.stop_rx.changed(), if !stop_requested => {
                    // A dropped handle counts as a stop request.
                    let _ = res;
                    stop_requested = true;
                    queue.push_back(Input::LocalStop(StopReason::User));
                }

                incoming = recv_opt(&mut incoming_rx) => {
                    match incoming {
                        Some(WsIncoming::Event(event)) => {
                            queue.push_back(input_from_event(event));
                        }
                        Some(WsIncoming::Closed(reason)) => {
                            incoming_rx = None;
                            queue.push_back(Input::TransportLost(reason));
                        }
                        None => {
                            incoming_rx = None;
                            queue.push_back(Input::TransportLost(Some(
                                "socket task stopped".to_string(),
                            )));
                        }
                    }
                }

                chunk = recv_opt(&mut chunks_rx) => {
                    match chunk {
                        Some(chunk) => {
                            if let Some(tx) = cmd_tx.as_ref() {
                                if tx.send(SendCmd::Audio(chunk.data)).await.is_err() {
                                    queue.push_back(Input::TransportLost(Some(
                                        "send channel closed".to_string(),
                                    )));
                                }
                            }
                        }
                        None => chunks_rx = None,
                    }
                }

                level = recv_opt(&mut levels_rx) => {
                    match level {
                        Some(level) => {
                            if let Some(vad) = vad.as_mut() {
                                let now = Instant::now();
                                vad.observe_level(level, now);
                                if vad.poll_auto_stop(now) {
                                    queue.push_back(Input::LocalStop(StopReason::Silence));
                                }
                            }
                        }
                        None => levels_rx = None,
                    }
                }

                _ = sleep_opt(watchdog_at), if watchdog_at.is_some() => {
                    let now = Instant::now();
                    if let (Some(started), Some(last_partial)) =
                        (recording_started, last_partial_at)
                    {
                        if now.duration_since(started) >= MAX_RECORDING {
                            queue.push_back(Input::LocalStop(StopReason::MaxDuration));
                        } else if self.cfg.auto_stop
                            && now.duration_since(last_partial) >= STALE_PARTIAL
                        {
                            queue.push_back(Input::LocalStop(StopReason::StalePartial));
                        }
                    }
                    watchdog_at = Some(now + WATCHDOG_TICK);
                }

                _ = sleep_opt(grace_at), if grace_at.is_some() => {
                    grace_at = None;
                    queue.push_back(Input::GraceElapsed);
                }
            }
        }

        // Closing the command channel ends the socket task; wait for
        // it so no connection outlives the session.
        drop(cmd_tx);
        if let Some(task) = ws_task {
            let _ = task.await;
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

async fn forward_audio(cmd_tx: Option<&mpsc::Sender<SendCmd>>, chunk: AudioChunk) {
    if let Some(tx) = cmd_tx {
        let _ = tx.send(SendCmd::Audio(chunk.data)).await;
    }
}
