use super::{ByteStream, ChatBackend, OpenStreamFuture, TransportError};
use crate::chat::{ChatTurn, Role};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Offline backend.
///
/// Echoes the last user turn as a real event-stream body, cut into small
/// chunks so that lines, JSON payloads and multi-byte characters are split
/// the way a slow network splits them.
#[derive(Debug, Clone)]
pub struct StubBackend {
    chunk_size: usize,
    delay: Duration,
    mode: Mode,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Reply,
    FailStatus,
    InterruptAfter(usize),
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            chunk_size: 7,
            delay: Duration::ZERO,
            mode: Mode::Reply,
        }
    }

    /// Every request fails with a 500 and an unreadable body.
    pub fn failing() -> Self {
        Self {
            mode: Mode::FailStatus,
            ..Self::new()
        }
    }

    /// Stream `chunks` chunks of the reply, then fail.
    pub fn interrupted_after(chunks: usize) -> Self {
        Self {
            mode: Mode::InterruptAfter(chunks),
            ..Self::new()
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reply_for(prompt: &str) -> String {
        format!("[stub tutor] You said: {prompt} 🚀")
    }

    fn event_stream_body(reply: &str) -> Vec<u8> {
        let mut body = String::from(": stub connected\n\n");
        for word in reply.split_inclusive(' ') {
            let frame = serde_json::json!({ "choices": [{ "delta": { "content": word } }] });
            body.push_str(&format!("data: {frame}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body.into_bytes()
    }
}

impl ChatBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn open_stream(&self, turns: &[ChatTurn]) -> OpenStreamFuture {
        let this = self.clone();
        let prompt = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .unwrap_or_default();

        Box::pin(async move {
            if let Mode::FailStatus = this.mode {
                return Err(TransportError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    message: None,
                });
            }

            let body = Self::event_stream_body(&Self::reply_for(&prompt));
            let chunks: Vec<Bytes> = body
                .chunks(this.chunk_size)
                .map(Bytes::copy_from_slice)
                .collect();

            let (tx, rx) = mpsc::channel::<Result<Bytes, TransportError>>(32);

            tokio::spawn(async move {
                for (i, chunk) in chunks.into_iter().enumerate() {
                    if let Mode::InterruptAfter(n) = this.mode {
                        if i == n {
                            let _ = tx
                                .send(Err(TransportError::Interrupted("stub connection dropped".into())))
                                .await;
                            return;
                        }
                    }
                    if !this.delay.is_zero() {
                        tokio::time::sleep(this.delay).await;
                    }
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ByteStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{decode_stream, ChatSession, Language, SendOutcome};

    #[tokio::test]
    async fn body_decodes_to_reply_for_any_chunk_size() {
        for size in [1, 2, 3, 5, 64, 4096] {
            let backend = StubBackend::new().with_chunk_size(size);
            let stream = backend.open_stream(&[ChatTurn::user("ção")]).await.unwrap();
            let text = decode_stream(stream, |_: &str| {}).await.unwrap();
            assert_eq!(text, StubBackend::reply_for("ção"), "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn echoes_last_user_turn() {
        let backend = StubBackend::new();
        let turns = [
            ChatTurn::user("first"),
            ChatTurn::assistant("reply"),
            ChatTurn::user("second"),
        ];
        let stream = backend.open_stream(&turns).await.unwrap();
        let text = decode_stream(stream, |_: &str| {}).await.unwrap();
        assert_eq!(text, StubBackend::reply_for("second"));
    }

    #[tokio::test]
    async fn failing_stub_reports_status() {
        let result = StubBackend::failing().open_stream(&[ChatTurn::user("x")]).await;
        assert!(matches!(
            result,
            Err(TransportError::Status { message: None, .. })
        ));
    }

    #[tokio::test]
    async fn interrupted_stream_keeps_partial_text() {
        // Large chunks: the first one carries complete frames.
        let backend = StubBackend::interrupted_after(1).with_chunk_size(80);
        let mut session = ChatSession::new(Language::En);

        assert_eq!(session.send(&backend, "hello there").await, SendOutcome::Failed);

        let turns = session.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(!turns[1].content.is_empty());
        assert!(StubBackend::reply_for("hello there").starts_with(&turns[1].content));
        assert_eq!(turns[2], ChatTurn::assistant(Language::En.failure_reply()));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_paces_chunks() {
        let backend = StubBackend::new().with_delay(Duration::from_millis(50));
        let started = tokio::time::Instant::now();
        let stream = backend.open_stream(&[ChatTurn::user("x")]).await.unwrap();
        decode_stream(stream, |_: &str| {}).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
