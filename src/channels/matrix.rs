//! Matrix channel: polls one room over the client-server API.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::MessageSource;
use crate::config::Credentials;
use crate::error::ChannelError;
use crate::pipeline::types::Message;

/// Request timeout for every Matrix API call.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Matrix channel bound to a single room.
pub struct MatrixChannel {
    homeserver: String,
    room_id: String,
    access_token: SecretString,
    client: reqwest::Client,
    txn_counter: AtomicU64,
}

impl MatrixChannel {
    pub fn new(credentials: &Credentials) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            homeserver: credentials.homeserver.clone(),
            room_id: credentials.room_id.clone(),
            access_token: credentials.access_token.clone(),
            client,
            txn_counter: AtomicU64::new(0),
        })
    }

    /// Build an API URL from path segments, percent-encoding each one.
    fn api_url(&self, segments: &[&str]) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&self.homeserver)
            .map_err(|e| ChannelError::Http(format!("invalid homeserver URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ChannelError::Http("homeserver URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["_matrix", "client", "v3"])
            .extend(segments);
        Ok(url)
    }

    fn next_txn_id(&self) -> String {
        let seq = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("rd{}-{seq}", Utc::now().timestamp_millis())
    }
}

#[async_trait]
impl MessageSource for MatrixChannel {
    fn name(&self) -> &str {
        "matrix"
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Message>, ChannelError> {
        let mut url = self.api_url(&["rooms", &self.room_id, "messages"])?;
        url.query_pairs_mut()
            .append_pair("dir", "b")
            .append_pair("limit", &limit.to_string());

        let resp = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;
        let body = check_status(resp).await?;
        parse_messages(&body)
    }

    async fn send(&self, text: &str) -> Result<String, ChannelError> {
        let txn_id = self.next_txn_id();
        let url = self.api_url(&["rooms", &self.room_id, "send", "m.room.message", &txn_id])?;
        let payload = serde_json::json!({ "msgtype": "m.text", "body": text });

        let resp = self
            .client
            .put(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        let body = check_status(resp).await?;

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;
        parsed
            .get("event_id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ChannelError::InvalidResponse("send response has no event_id".into()))
    }

    async fn whoami(&self) -> Result<String, ChannelError> {
        let url = self.api_url(&["account", "whoami"])?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;
        let body = check_status(resp).await?;

        #[derive(Deserialize)]
        struct WhoAmI {
            user_id: String,
        }
        let who: WhoAmI = serde_json::from_str(&body)
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;
        Ok(who.user_id)
    }
}

/// Turn a non-success response into a `ChannelError`, otherwise return the body.
async fn check_status(resp: reqwest::Response) -> Result<String, ChannelError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        return Ok(body);
    }

    #[derive(Deserialize, Default)]
    struct ApiError {
        #[serde(default)]
        errcode: String,
        #[serde(default)]
        error: String,
    }
    let err: ApiError = serde_json::from_str(&body).unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ChannelError::AuthFailed(format!(
            "{} {}",
            err.errcode, err.error
        )));
    }
    Err(ChannelError::Api {
        status: status.as_u16(),
        errcode: err.errcode,
        message: err.error,
    })
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    chunk: Vec<serde_json::Value>,
}

/// Parse a `/messages` response (newest-first with `dir=b`).
///
/// Only `m.room.message` events are returned. An event whose content has no
/// string `body` comes back with an empty body so the dispatcher can still
/// advance past it. Events without an `event_id` cannot be tracked and are dropped.
pub fn parse_messages(body: &str) -> Result<Vec<Message>, ChannelError> {
    let resp: MessagesResponse =
        serde_json::from_str(body).map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;

    let messages = resp
        .chunk
        .iter()
        .filter(|ev| ev.get("type").and_then(|t| t.as_str()) == Some("m.room.message"))
        .filter_map(|ev| {
            let id = ev.get("event_id")?.as_str()?;
            let sender = ev.get("sender").and_then(|s| s.as_str()).unwrap_or_default();
            let text = ev
                .get("content")
                .and_then(|c| c.get("body"))
                .and_then(|b| b.as_str())
                .unwrap_or_default();
            let sent_at = ev
                .get("origin_server_ts")
                .and_then(|ts| ts.as_i64())
                .and_then(DateTime::<Utc>::from_timestamp_millis);
            Some(Message {
                id: id.to_string(),
                sender: sender.to_string(),
                body: text.to_string(),
                sent_at,
            })
        })
        .collect();
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(homeserver: &str) -> MatrixChannel {
        MatrixChannel::new(&Credentials {
            homeserver: homeserver.to_string(),
            user_id: "@aria:matrix.org".into(),
            access_token: SecretString::from("syt_test"),
            room_id: "!abc:matrix.org".into(),
            instance_name: "Aria".into(),
        })
        .unwrap()
    }

    #[test]
    fn api_url_encodes_room_id() {
        let url = channel("https://matrix.example.org")
            .api_url(&["rooms", "!abc:matrix.org", "messages"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://matrix.example.org/_matrix/client/v3/rooms/!abc:matrix.org/messages"
        );
    }

    #[test]
    fn api_url_keeps_homeserver_path_prefix() {
        let url = channel("https://example.org/synapse/")
            .api_url(&["account", "whoami"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.org/synapse/_matrix/client/v3/account/whoami"
        );
    }

    #[test]
    fn txn_ids_are_unique() {
        let ch = channel("https://matrix.example.org");
        assert_ne!(ch.next_txn_id(), ch.next_txn_id());
    }

    #[test]
    fn parses_messages_newest_first() {
        let body = r#"{
            "chunk": [
                {"type": "m.room.message", "event_id": "$e2", "sender": "@thomas:matrix.org",
                 "origin_server_ts": 1732111200000,
                 "content": {"msgtype": "m.text", "body": "/task summarize the log"}},
                {"type": "m.room.member", "event_id": "$m1", "sender": "@bob:matrix.org",
                 "content": {"membership": "join"}},
                {"type": "m.room.message", "event_id": "$e1", "sender": "@bob:matrix.org",
                 "content": {"msgtype": "m.text", "body": "hello"}}
            ],
            "start": "t1", "end": "t0"
        }"#;
        let msgs = parse_messages(body).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].id, "$e2");
        assert_eq!(msgs[0].body, "/task summarize the log");
        assert!(msgs[0].sent_at.is_some());
        assert_eq!(msgs[1].id, "$e1");
        assert!(msgs[1].sent_at.is_none());
    }

    #[test]
    fn malformed_event_surfaces_with_empty_body() {
        let body = r#"{"chunk": [
            {"type": "m.room.message", "event_id": "$img", "sender": "@bob:matrix.org",
             "content": {"msgtype": "m.image"}},
            {"type": "m.room.message", "sender": "@bob:matrix.org",
             "content": {"body": "no id"}}
        ]}"#;
        let msgs = parse_messages(body).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, "$img");
        assert!(msgs[0].body.is_empty());
    }

    #[test]
    fn empty_chunk() {
        assert!(parse_messages(r#"{"start": "t0"}"#).unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            parse_messages("<html>bad gateway</html>"),
            Err(ChannelError::InvalidResponse(_))
        ));
    }
}
