//! WebSocket transport for the voice protocol.
//!
//! A connected socket is driven by one task that owns both halves of
//! the stream: outbound commands arrive over a channel (audio frames,
//! the stop control message, close) and inbound frames are decoded and
//! forwarded. The session driver never touches the socket directly.

use crate::config::SessionConfig;
use crate::error::{Result, VoiceError};
use crate::protocol::{decode_server_event, encode_client_msg, ClientMsg, ServerEvent};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
pub(crate) enum SendCmd {
    /// One encoded audio chunk, forwarded as a binary frame.
    Audio(Vec<u8>),
    /// The terminal `{"event":"stop"}` control message.
    Stop,
    Close,
}

#[derive(Debug)]
pub(crate) enum WsIncoming {
    Event(ServerEvent),
    /// The connection ended. `Some` carries a transport failure
    /// reason; `None` is a clean close.
    Closed(Option<String>),
}

pub(crate) struct Connection {
    pub(crate) cmd_tx: mpsc::Sender<SendCmd>,
    pub(crate) incoming_rx: mpsc::Receiver<WsIncoming>,
    pub(crate) task: JoinHandle<()>,
}

/// Build the `/ws/voice` target from the base endpoint and session
/// parameters. `http(s)` bases are mapped to `ws(s)`.
pub fn voice_url(cfg: &SessionConfig) -> Result<Url> {
    let mut url =
        Url::parse(&cfg.base_url).map_err(|e| VoiceError::Protocol(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        s @ ("ws" | "wss") => s,
        other => {
            return Err(VoiceError::Protocol(format!("unsupported scheme: {other}")));
        }
    }
    .to_string();
    url.set_scheme(&scheme)
        .map_err(|()| VoiceError::Protocol("scheme rewrite failed".to_string()))?;

    let path = format!("{}/ws/voice", url.path().trim_end_matches('/'));
    url.set_path(&path);

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.append_pair("session_id", &cfg.session_id.to_string());
        pairs.append_pair("hist", &cfg.history_turns.clamp(1, 20).to_string());
        if let Some(code) = cfg.objective_code.as_deref() {
            pairs.append_pair("objective_code", code);
        }
    }

    Ok(url)
}

pub(crate) async fn connect(cfg: &SessionConfig) -> Result<Connection> {
    let url = voice_url(cfg)?;
    debug!(url = %url, "connecting voice socket");

    let (ws_stream, _resp) = connect_async(url.as_str())
        .await
        .map_err(|e| VoiceError::Transport(e.to_string()))?;

    Ok(spawn_socket_task(ws_stream))
}

fn spawn_socket_task(ws_stream: WsStream) -> Connection {
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SendCmd>(64);
    let (incoming_tx, incoming_rx) = mpsc::channel::<WsIncoming>(64);

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        SendCmd::Audio(bytes) => {
                            if let Err(e) = ws_write.send(Message::Binary(bytes.into())).await {
                                let _ = incoming_tx
                                    .send(WsIncoming::Closed(Some(e.to_string())))
                                    .await;
                                break;
                            }
                        }
                        SendCmd::Stop => {
                            let text = match encode_client_msg(&ClientMsg::Stop) {
                                Ok(text) => text,
                                Err(_) => break,
                            };
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                let _ = incoming_tx
                                    .send(WsIncoming::Closed(Some(e.to_string())))
                                    .await;
                                break;
                            }
                        }
                        SendCmd::Close => {
                            let _ = ws_write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                item = ws_read.next() => {
                    let Some(item) = item else {
                        let _ = incoming_tx.send(WsIncoming::Closed(None)).await;
                        break;
                    };

                    let msg = match item {
                        Ok(msg) => msg,
                        Err(e) => {
                            let _ = incoming_tx
                                .send(WsIncoming::Closed(Some(e.to_string())))
                                .await;
                            break;
                        }
                    };

                    match msg {
                        Message::Text(text) => {
                            match decode_server_event(text.as_ref()) {
                                Some(event) => {
                                    if incoming_tx.send(WsIncoming::Event(event)).await.is_err() {
                                        break;
                                    }
                                }
                                // Framing noise; the session continues.
                                None => trace!("dropping undecodable frame"),
                            }
                        }
                        Message::Close(frame) => {
                            let reason = frame.and_then(|f| {
                                let code: u16 = f.code.into();
                                (code != 1000).then(|| {
                                    format!("socket closed (code {code}): {}", f.reason)
                                })
                            });
                            let _ = incoming_tx.send(WsIncoming::Closed(reason)).await;
                            break;
                        }
                        // The server speaks JSON text frames only.
                        _ => {}
                    }
                }
            }
        }
    });

    Connection { cmd_tx, incoming_rx, task }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_session_and_history() {
        let cfg = SessionConfig::new("http://127.0.0.1:8000", 61);
        let url = voice_url(&cfg).expect("url should build");
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/voice?session_id=61&hist=8");
    }

    #[test]
    fn https_maps_to_wss_and_objective_is_appended() {
        let cfg = SessionConfig::new("https://tutor.example.com", 7)
            .history_turns(12)
            .objective_code("B1");
        let url = voice_url(&cfg).expect("url should build");
        assert_eq!(
            url.as_str(),
            "wss://tutor.example.com/ws/voice?session_id=7&hist=12&objective_code=B1"
        );
    }

    #[test]
    fn ws_base_is_kept_and_path_prefix_survives() {
        let cfg = SessionConfig::new("ws://gateway.local/api", 1);
        let url = voice_url(&cfg).expect("url should build");
        assert_eq!(url.as_str(), "ws://gateway.local/api/ws/voice?session_id=1&hist=8");
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let cfg = SessionConfig::new("ftp://nope", 1);
        assert!(matches!(voice_url(&cfg), Err(VoiceError::Protocol(_))));
    }
}
