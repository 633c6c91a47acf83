//! Incremental decoder for streamed chat-completion responses.
//!
//! The response body is a sequence of newline-delimited frames:
//!
//! ```text
//! : keep-alive
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//! data: [DONE]
//! ```
//!
//! Chunks may end anywhere: inside a line, inside a JSON payload, or inside a
//! multi-byte character. Each content-bearing frame extends the accumulated
//! reply, and the sink always receives the full text so far.

use futures_core::Stream;
use serde_json::Value;
use tokio_stream::StreamExt;

const DATA_PREFIX: &str = "data: ";
const DONE_TOKEN: &str = "[DONE]";

/// Classification of a single line of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Blank,
    Comment,
    /// Any line that is not a `data: ` frame (`event:`, `id:`, `retry:`, ...).
    Unrecognized,
    /// Trimmed payload of a `data: ` line.
    Data(&'a str),
    Done,
}

impl<'a> Frame<'a> {
    /// Classify a line with its line terminator already removed.
    pub fn classify(line: &'a str) -> Self {
        if line.trim().is_empty() {
            return Frame::Blank;
        }
        if line.starts_with(':') {
            return Frame::Comment;
        }
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            return Frame::Unrecognized;
        };
        match rest.trim() {
            DONE_TOKEN => Frame::Done,
            payload => Frame::Data(payload),
        }
    }
}

/// `choices[0].delta.content` of a parsed frame, if it is a non-empty string.
///
/// Any other shape simply carries no text.
fn delta_content(payload: &Value) -> Option<&str> {
    payload["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|c| !c.is_empty())
}

/// Stateful UTF-8 decoder.
///
/// An incomplete multi-byte sequence at the end of a chunk is carried into
/// the next one. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
struct Utf8Carry {
    partial: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.partial);
        input.extend_from_slice(chunk);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.partial = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn pending_len(&self) -> usize {
        self.partial.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Reading,
    Closed,
}

/// Turns response chunks into a growing assistant reply.
#[derive(Debug)]
pub struct StreamDecoder {
    utf8: Utf8Carry,
    pending: String,
    content: String,
    state: DecoderState,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            utf8: Utf8Carry::default(),
            pending: String::new(),
            content: String::new(),
            state: DecoderState::Reading,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Assistant text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Feed one chunk. `sink` is called with the full accumulated text after
    /// every content-bearing frame. Returns the number of sink calls made.
    pub fn push<F>(&mut self, chunk: &[u8], mut sink: F) -> usize
    where
        F: FnMut(&str),
    {
        if self.state == DecoderState::Closed {
            tracing::trace!(len = chunk.len(), "chunk after close ignored");
            return 0;
        }

        let text = self.utf8.decode(chunk);
        self.pending.push_str(&text);

        let mut updates = 0;
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }

            let payload = match Frame::classify(&line) {
                Frame::Blank | Frame::Comment | Frame::Unrecognized => continue,
                // Only this chunk's line loop stops; reading continues until EOF.
                Frame::Done => break,
                Frame::Data(payload) => payload,
            };

            match serde_json::from_str::<Value>(payload) {
                Ok(value) => {
                    if let Some(text) = delta_content(&value) {
                        self.content.push_str(text);
                        sink(&self.content);
                        updates += 1;
                    }
                }
                Err(err) => {
                    // Treat as not yet fully buffered: put the line back and
                    // wait for the next chunk.
                    tracing::trace!(%err, "frame payload incomplete, rebuffering");
                    let mut rebuffered =
                        String::with_capacity(line.len() + 1 + self.pending.len());
                    rebuffered.push_str(&line);
                    rebuffered.push('\n');
                    rebuffered.push_str(&self.pending);
                    self.pending = rebuffered;
                    break;
                }
            }
        }
        updates
    }

    /// End of stream. Anything not terminated by a line feed is dropped.
    pub fn close(&mut self) {
        if self.state == DecoderState::Closed {
            return;
        }
        let discarded = self.pending.len() + self.utf8.pending_len();
        if discarded > 0 {
            tracing::debug!(discarded, "dropping unterminated tail of stream");
        }
        self.pending.clear();
        self.utf8 = Utf8Carry::default();
        self.state = DecoderState::Closed;
    }

    pub fn into_content(mut self) -> String {
        self.close();
        self.content
    }
}

/// Drive a [`StreamDecoder`] over a byte stream until EOF.
///
/// Returns the final accumulated text. A stream error closes the decoder and
/// is returned as-is; updates already delivered to `on_update` stand.
pub async fn decode_stream<S, B, E, F>(mut stream: S, mut on_update: F) -> Result<String, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    F: FnMut(&str),
{
    let mut decoder = StreamDecoder::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                decoder.push(chunk.as_ref(), &mut on_update);
            }
            Err(err) => {
                decoder.close();
                return Err(err);
            }
        }
    }
    Ok(decoder.into_content())
}
