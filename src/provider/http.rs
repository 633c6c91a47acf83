use super::{ByteStream, ChatBackend, OpenStreamFuture, TransportError};
use crate::chat::ChatTurn;
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

/// Calls the tutor edge function, which proxies to the hosted
/// chat-completion gateway and streams its reply back.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl HttpBackend {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        function: &str,
        publishable_key: &str,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            endpoint: endpoint_url(base_url, function)?,
            headers: headers(publishable_key)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn endpoint_url(base_url: &str, function: &str) -> anyhow::Result<Url> {
    let mut base = Url::parse(base_url).with_context(|| format!("invalid base URL: {base_url}"))?;
    // Url::join replaces the last segment unless the path ends in '/'.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("functions/v1/{function}"))
        .with_context(|| format!("invalid function name: {function}"))
}

fn headers(publishable_key: &str) -> anyhow::Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let v = HeaderValue::from_str(&format!("Bearer {publishable_key}"))
        .map_err(|e| anyhow!(e).context("publishable key is not a valid header value"))?;
    h.insert(AUTHORIZATION, v);
    Ok(h)
}

#[derive(Debug, Serialize)]
struct ChatRequestBody {
    messages: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl ChatBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn open_stream(&self, turns: &[ChatTurn]) -> OpenStreamFuture {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let headers = self.headers.clone();
        let body = ChatRequestBody {
            messages: turns.to_vec(),
        };

        Box::pin(async move {
            tracing::debug!(%endpoint, messages = body.messages.len(), "POST chat");
            let resp = http
                .post(endpoint)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .map_err(TransportError::Request)?;

            let status = resp.status();
            if !status.is_success() {
                let message = resp.json::<ErrorBody>().await.ok().map(|b| b.error);
                return Err(TransportError::Status { status, message });
            }

            let stream = resp.bytes_stream().map(|chunk| chunk.map_err(TransportError::Body));
            Ok(Box::pin(stream) as ByteStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::decode_stream;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> HttpBackend {
        HttpBackend::new(reqwest::Client::new(), &server.uri(), "ai-tutor", "pk_test").unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let url = endpoint_url("https://abc.example.co", "ai-tutor").unwrap();
        assert_eq!(url.as_str(), "https://abc.example.co/functions/v1/ai-tutor");

        let url = endpoint_url("https://gw.example.com/academy", "tutor").unwrap();
        assert_eq!(url.as_str(), "https://gw.example.com/academy/functions/v1/tutor");

        assert!(endpoint_url("not a url", "ai-tutor").is_err());
    }

    #[test]
    fn rejects_key_with_newline() {
        assert!(headers("bad\nkey").is_err());
    }

    #[tokio::test]
    async fn streams_successful_response() {
        let server = MockServer::start().await;
        let sse = concat!(
            ": ok\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/functions/v1/ai-tutor"))
            .and(header("authorization", "Bearer pk_test"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "messages": [{ "role": "user", "content": "hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let stream = backend(&server)
            .open_stream(&[ChatTurn::user("hi")])
            .await
            .unwrap();
        let mut calls = Vec::new();
        let text = decode_stream(stream, |s: &str| calls.push(s.to_string()))
            .await
            .unwrap();

        assert_eq!(text, "Hello");
        assert_eq!(calls, ["Hel", "Hello"]);
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(serde_json::json!({ "error": "Rate limit exceeded" })),
            )
            .mount(&server)
            .await;

        let err = match backend(&server).open_stream(&[ChatTurn::user("hi")]).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        match err {
            TransportError::Status { status, message } => {
                assert_eq!(status, reqwest::StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(message.as_deref(), Some("Rate limit exceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparsable_error_body_has_no_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = match backend(&server).open_stream(&[ChatTurn::user("hi")]).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(
            err,
            TransportError::Status { status, message: None } if status == reqwest::StatusCode::BAD_GATEWAY
        ));
    }

    #[tokio::test]
    async fn session_appends_fallback_on_http_failure() {
        use crate::chat::{ChatSession, Language, SendOutcome};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let backend = backend(&server);
        let mut session = ChatSession::new(Language::En);
        assert_eq!(session.send(&backend, "hi").await, SendOutcome::Failed);
        assert!(!session.is_busy());
        assert_eq!(
            session.turns(),
            [ChatTurn::user("hi"), ChatTurn::assistant(Language::En.failure_reply())]
        );
    }
}
