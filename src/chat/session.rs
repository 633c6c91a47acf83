use super::decoder::decode_stream;
use super::turn::{ChatTurn, Role, Transcript};
use crate::provider::{ChatBackend, TransportError};
use std::str::FromStr;

/// Language used for the fixed messages shown when a request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    En,
    #[default]
    Pt,
    Es,
}

impl Language {
    /// Assistant turn appended when an exchange fails.
    pub fn failure_reply(self) -> &'static str {
        match self {
            Language::En => "Sorry, something went wrong while talking to the tutor. Please try again!",
            Language::Pt => "Desculpe, ocorreu um erro ao falar com o tutor. Tente novamente!",
            Language::Es => "Lo siento, ocurrió un error al hablar con el tutor. ¡Inténtalo de nuevo!",
        }
    }

    /// Used when an error response carries no readable message.
    pub fn unreadable_error(self) -> &'static str {
        match self {
            Language::En => "The tutor could not answer right now.",
            Language::Pt => "O tutor não conseguiu responder agora.",
            Language::Es => "El tutor no pudo responder ahora.",
        }
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept BCP 47 style tags: "pt", "pt-BR", "en_US".
        let primary = s
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Ok(Language::En),
            "pt" => Ok(Language::Pt),
            "es" => Ok(Language::Es),
            _ => anyhow::bail!("unsupported language: {s} (expected en, pt or es)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream ran to EOF.
    Completed,
    /// The request or stream failed; a fallback turn was appended.
    Failed,
    /// Nothing was sent: a request is already outstanding or the text is blank.
    Rejected,
}

/// State of one conversation with the tutor.
///
/// At most one request is outstanding at a time. While it is, the trailing
/// assistant turn is the only turn that changes.
#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Transcript,
    busy: bool,
    language: Language,
}

impl ChatSession {
    pub fn new(language: Language) -> Self {
        Self {
            transcript: Transcript::new(),
            busy: false,
            language,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn turns(&self) -> &[ChatTurn] {
        self.transcript.turns()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// True between submission and the first piece of assistant text.
    pub fn is_waiting(&self) -> bool {
        self.busy && self.transcript.last().map(|t| t.role) != Some(Role::Assistant)
    }

    /// Start an exchange. Returns the turns to send, or `None` if a request
    /// is already outstanding or `text` is blank.
    pub fn begin(&mut self, text: &str) -> Option<Vec<ChatTurn>> {
        let text = text.trim();
        if self.busy || text.is_empty() {
            return None;
        }
        self.transcript.push_user(text);
        self.busy = true;
        Some(self.transcript.turns().to_vec())
    }

    /// Sink for the decoder: receives the full assistant text so far.
    pub fn apply_update(&mut self, accumulated: &str) {
        if !self.busy {
            tracing::warn!("assistant update outside of an exchange ignored");
            return;
        }
        self.transcript.apply_assistant_update(accumulated);
    }

    pub fn finish(&mut self) {
        self.busy = false;
    }

    /// End the exchange with a failure. Text already streamed is kept.
    pub fn fail(&mut self, err: &TransportError) {
        tracing::warn!(error = %err.describe(self.language), "tutor request failed");
        self.transcript.push_assistant(self.language.failure_reply());
        self.busy = false;
    }

    pub fn clear(&mut self) {
        if !self.busy {
            self.transcript.clear();
        }
    }

    /// Run one full exchange against `backend`.
    pub async fn send(&mut self, backend: &dyn ChatBackend, text: &str) -> SendOutcome {
        let Some(turns) = self.begin(text) else {
            return SendOutcome::Rejected;
        };
        self.stream_reply(backend, &turns, |_: &str| {}).await
    }

    /// Second half of an exchange started with [`ChatSession::begin`].
    ///
    /// Every accumulated-text update is applied to the transcript and then
    /// handed to `on_update`.
    pub async fn stream_reply<F>(
        &mut self,
        backend: &dyn ChatBackend,
        turns: &[ChatTurn],
        mut on_update: F,
    ) -> SendOutcome
    where
        F: FnMut(&str),
    {
        tracing::debug!(backend = backend.name(), turns = turns.len(), "sending conversation");

        let stream = match backend.open_stream(turns).await {
            Ok(stream) => stream,
            Err(err) => {
                self.fail(&err);
                return SendOutcome::Failed;
            }
        };

        let result = decode_stream(stream, |text: &str| {
            self.apply_update(text);
            on_update(text);
        })
        .await;

        match result {
            Ok(reply) => {
                tracing::debug!(chars = reply.chars().count(), "reply complete");
                self.finish();
                SendOutcome::Completed
            }
            Err(err) => {
                self.fail(&err);
                SendOutcome::Failed
            }
        }
    }
}
