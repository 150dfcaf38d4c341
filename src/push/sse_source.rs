use crate::error::PushError;
use crate::push::models::RawUpdate;
use crate::push::{PushStream, UpdateSource};
use crate::session::SharedSession;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use tracing::{info, warn};

/// Push channel over a `text/event-stream` endpoint.
#[derive(Clone)]
pub struct SseSource {
    http: reqwest::Client,
    url: String,
    session: SharedSession,
}

impl SseSource {
    pub fn new(http: reqwest::Client, url: impl Into<String>, session: SharedSession) -> Self {
        Self {
            http,
            url: url.into(),
            session,
        }
    }
}

#[async_trait]
impl UpdateSource for SseSource {
    async fn subscribe(&self) -> Result<PushStream, PushError> {
        let mut request = self.http.get(&self.url).header(ACCEPT, "text/event-stream");
        if let Some(token) = self.session.read().await.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(PushError::Rejected(response.status().as_u16()));
        }
        info!(url = %self.url, "push channel connected");

        let mut body = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut framer = SseFramer::default();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for update in framer.push(&bytes) {
                            yield update;
                        }
                    }
                    Err(e) => {
                        warn!("push channel read failed: {e}");
                        break;
                    }
                }
            }
            info!("push channel disconnected");
        };

        Ok(Box::pin(stream))
    }
}

/// Splits an event-stream byte sequence into messages. Chunk boundaries may
/// fall anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseFramer {
    buf: Vec<u8>,
}

impl SseFramer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawUpdate> {
        self.buf.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut updates = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(update) = parse_frame(&String::from_utf8_lossy(&frame)) {
                updates.push(update);
            }
        }
        updates
    }
}

/// Parses one frame; comment-only frames (keep-alives) yield nothing.
pub fn parse_frame(frame: &str) -> Option<RawUpdate> {
    let mut kind = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => kind = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }

    Some(RawUpdate {
        kind: kind.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}
