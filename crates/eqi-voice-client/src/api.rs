//! REST companion to the voice socket: session bootstrap, text turns,
//! one-shot audio turns and read-only tutoring data.

use crate::error::{Result, VoiceError};
use crate::mcp::TutorReply;

use reqwest::multipart;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use url::Url;

#[derive(Deserialize)]
struct SessionStarted {
    session_id: i64,
}

/// One curriculum objective row. The backend serves these from a CSV,
/// so everything beyond the code is best-effort text.
#[derive(Clone, Debug, Deserialize)]
pub struct Objective {
    pub objective_code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub strands: Option<String>,
    #[serde(default)]
    pub prereqs: Option<String>,
    #[serde(default)]
    pub examples: Option<String>,
    #[serde(default)]
    pub mastery_threshold: Option<String>,
}

#[derive(Deserialize)]
struct ObjectiveList {
    items: Vec<Objective>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActionDistribution {
    #[serde(default)]
    pub tone: HashMap<String, u64>,
    #[serde(default)]
    pub pacing: HashMap<String, u64>,
    #[serde(default)]
    pub difficulty: HashMap<String, u64>,
    #[serde(default)]
    pub next_step: HashMap<String, u64>,
}

/// Aggregate tutoring metrics for a session or the whole deployment.
#[derive(Clone, Debug, Deserialize)]
pub struct MetricsSnapshot {
    pub turns_total: u64,
    pub avg_reward: f64,
    #[serde(default)]
    pub frustration_adaptation_rate: f64,
    #[serde(default)]
    pub tone_alignment_rate: f64,
    #[serde(default)]
    pub last_10_reward_avg: f64,
    #[serde(default)]
    pub by_emotion: HashMap<String, u64>,
    #[serde(default)]
    pub action_distribution: ActionDistribution,
}

/// HTTP client against the tutoring backend.
#[derive(Clone, Debug)]
pub struct TutorApi {
    base: Url,
    http: reqwest::Client,
}

impl TutorApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| VoiceError::Protocol(e.to_string()))?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(VoiceError::Protocol(format!("unsupported scheme: {other}")));
            }
        }
        Ok(Self { base, http: reqwest::Client::new() })
    }

    fn endpoint(&self, path: &str) -> Url {
        let joined = format!("{}/{}", self.base.path().trim_end_matches('/'), path);
        let mut url = self.base.clone();
        url.set_path(&joined);
        url
    }

    /// Create a fresh learner session and return its identity.
    pub async fn start_session(&self) -> Result<i64> {
        let url = self.endpoint("session/start");
        let resp = self.http.post(url).send().await.map_err(transport)?;
        let started: SessionStarted = decode(resp).await?;
        Ok(started.session_id)
    }

    /// Run one typed turn through the full tutoring pipeline.
    pub async fn text_turn(&self, session_id: i64, user_text: &str) -> Result<TutorReply> {
        let url = self.endpoint("session");
        let resp = self
            .http
            .post(url)
            .json(&json!({ "session_id": session_id, "user_text": user_text }))
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }

    /// Run one recorded-audio turn. The backend transcribes the upload
    /// itself; `user_text` optionally seeds the transcript.
    pub async fn audio_turn(
        &self,
        session_id: i64,
        audio: Vec<u8>,
        file_name: &str,
        mime: &str,
        user_text: Option<&str>,
    ) -> Result<TutorReply> {
        let part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| VoiceError::Protocol(e.to_string()))?;
        let mut form = multipart::Form::new()
            .text("session_id", session_id.to_string())
            .part("file", part);
        if let Some(text) = user_text {
            form = form.text("user_text", text.to_string());
        }

        let url = self.endpoint("session");
        let resp = self.http.post(url).multipart(form).send().await.map_err(transport)?;
        decode(resp).await
    }

    /// List curriculum objectives, optionally filtered by unit or a
    /// free-text query.
    pub async fn objectives(
        &self,
        unit: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<Objective>> {
        let mut url = self.endpoint("api/v1/objectives");
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(unit) = unit {
                pairs.append_pair("unit", unit);
            }
            if let Some(query) = query {
                pairs.append_pair("q", query);
            }
        }

        let resp = self.http.get(url).send().await.map_err(transport)?;
        let list: ObjectiveList = decode(resp).await?;
        Ok(list.items)
    }

    /// Fetch aggregate metrics, scoped to one session when given.
    pub async fn metrics(&self, session_id: Option<i64>) -> Result<MetricsSnapshot> {
        let mut url = self.endpoint("api/v1/metrics");
        if let Some(id) = session_id {
            url.query_pairs_mut().append_pair("session_id", &id.to_string());
        }

        let resp = self.http.get(url).send().await.map_err(transport)?;
        decode(resp).await
    }
}

fn transport(err: reqwest::Error) -> VoiceError {
    VoiceError::Transport(err.to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(VoiceError::Server(format!("{status}: {body}")));
    }
    resp.json::<T>().await.map_err(|e| VoiceError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_under_a_path_prefix() {
        let api = TutorApi::new("http://gateway.local/eqi").expect("valid base");
        let url = api.endpoint("session/start");
        assert_eq!(url.as_str(), "http://gateway.local/eqi/session/start");
    }

    #[test]
    fn non_http_base_is_rejected() {
        assert!(matches!(TutorApi::new("ws://nope"), Err(VoiceError::Protocol(_))));
    }

    #[test]
    fn objective_rows_tolerate_missing_columns() {
        let json = r#"{"count": 1, "items": [{"objective_code": "B1"}]}"#;
        let list: ObjectiveList = serde_json::from_str(json).expect("decode should succeed");
        assert_eq!(list.items[0].objective_code, "B1");
        assert!(list.items[0].description.is_none());
    }

    #[test]
    fn metrics_snapshot_decodes_partial_payloads() {
        let json = r#"{"turns_total": 12, "avg_reward": 0.4}"#;
        let snap: MetricsSnapshot = serde_json::from_str(json).expect("decode should succeed");
        assert_eq!(snap.turns_total, 12);
        assert!(snap.by_emotion.is_empty());
    }
}
