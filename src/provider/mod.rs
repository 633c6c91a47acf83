pub mod http;
pub mod stub;

use crate::chat::{ChatTurn, Language};
use bytes::Bytes;
use futures_core::stream::BoxStream;
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;

/// Raw response body, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

pub type OpenStreamFuture = Pin<Box<dyn Future<Output = Result<ByteStream, TransportError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to send request to the tutor endpoint")]
    Request(#[source] reqwest::Error),

    #[error("tutor endpoint returned HTTP {status}")]
    Status {
        status: StatusCode,
        /// `error` field of a JSON error body, if the body could be parsed.
        message: Option<String>,
    },

    #[error("response stream failed")]
    Body(#[source] reqwest::Error),

    #[error("response stream interrupted: {0}")]
    Interrupted(String),
}

impl TransportError {
    /// One-line description for logs and status lines.
    pub fn describe(&self, language: Language) -> String {
        match self {
            TransportError::Status { status, message } => {
                let message = message.as_deref().unwrap_or(language.unreadable_error());
                format!("HTTP {status}: {message}")
            }
            TransportError::Request(e) | TransportError::Body(e) => format!("{self}: {e}"),
            TransportError::Interrupted(_) => self.to_string(),
        }
    }
}

/// Backend interface.
///
/// One call sends the whole conversation and yields the streamed reply body.
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a request. Non-success responses resolve to
    /// [`TransportError::Status`] before any body is streamed.
    fn open_stream(&self, turns: &[ChatTurn]) -> OpenStreamFuture;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_falls_back_to_localized_message() {
        let err = TransportError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: None,
        };
        assert_eq!(
            err.describe(Language::En),
            format!("HTTP 500 Internal Server Error: {}", Language::En.unreadable_error())
        );

        let err = TransportError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: Some("Rate limit exceeded".into()),
        };
        assert_eq!(err.describe(Language::Pt), "HTTP 429 Too Many Requests: Rate limit exceeded");
    }
}
