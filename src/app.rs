use crate::chat::{decode_stream, ChatSession, ChatTurn, Language, SendOutcome};
use crate::config;
use crate::provider::{self, ChatBackend};
use anyhow::Context;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub fn build_backend(
    http: &reqwest::Client,
    cfg: &config::Config,
    backend_name: &str,
) -> anyhow::Result<Box<dyn ChatBackend>> {
    match backend_name {
        "http" => {
            let base_url = cfg
                .base_url
                .as_deref()
                .context("missing base URL (set TUTOR_BASE_URL, --base-url or config.toml base_url)")?;
            let key = cfg
                .publishable_key
                .as_deref()
                .context("missing publishable key (set TUTOR_PUBLISHABLE_KEY or config.toml publishable_key)")?;

            let backend = provider::http::HttpBackend::new(http.clone(), base_url, cfg.function(), key)?;
            tracing::debug!(endpoint = %backend.endpoint(), "using http backend");
            Ok(Box::new(backend))
        }
        "stub" => Ok(Box::new(
            provider::stub::StubBackend::new().with_delay(std::time::Duration::from_millis(30)),
        )),
        other => anyhow::bail!("unknown backend: {other}"),
    }
}

pub fn resolve_language(cli: Option<&str>, cfg: &config::Config) -> anyhow::Result<Language> {
    match cli.or(cfg.language.as_deref()) {
        Some(tag) => tag.parse(),
        None => Ok(Language::default()),
    }
}

/// Send a single prompt and print the reply as it streams in.
pub async fn run_once(backend: &dyn ChatBackend, language: Language, prompt: &str) -> anyhow::Result<()> {
    let turns = [ChatTurn::user(prompt)];
    let stream = match backend.open_stream(&turns).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", language.failure_reply());
            return Err(anyhow::Error::new(e).context("tutor request failed"));
        }
    };

    let mut out = std::io::stdout();
    let mut printer = SuffixPrinter::default();
    let result = decode_stream(stream, |text: &str| printer.print(&mut out, text)).await;
    println!();

    if let Err(e) = result {
        eprintln!("{}", language.failure_reply());
        return Err(anyhow::Error::new(e).context("tutor request failed"));
    }
    Ok(())
}

/// Line-mode conversation. `/quit` exits, `/clear` starts over.
pub async fn run_repl(backend: &dyn ChatBackend, language: Language) -> anyhow::Result<()> {
    let mut session = ChatSession::new(language);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = std::io::stdout();

    loop {
        write!(out, "you> ").ok();
        out.flush().ok();

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                session.clear();
                continue;
            }
            _ => {}
        }

        exchange(&mut session, backend, line, &mut out).await;
    }
    Ok(())
}

const WAITING_MARKER: &str = "tutor is thinking...";

/// One REPL turn: the reply is printed as it streams in, preceded by a
/// waiting marker until the first text arrives.
async fn exchange(
    session: &mut ChatSession,
    backend: &dyn ChatBackend,
    text: &str,
    out: &mut impl Write,
) -> SendOutcome {
    let Some(turns) = session.begin(text) else {
        return SendOutcome::Rejected;
    };
    if session.is_waiting() {
        writeln!(out, "{WAITING_MARKER}").ok();
        out.flush().ok();
    }

    let mut printer = SuffixPrinter::default();
    let outcome = session
        .stream_reply(backend, &turns, |accumulated: &str| {
            if printer.printed == 0 {
                write!(out, "tutor> ").ok();
            }
            printer.print(&mut *out, accumulated);
        })
        .await;

    if printer.printed > 0 {
        writeln!(out).ok();
    }
    if outcome == SendOutcome::Failed {
        if let Some(fallback) = session.turns().last() {
            writeln!(out, "tutor> {}", fallback.content).ok();
        }
    }
    outcome
}

/// Writes only the part of the accumulated text not yet printed.
#[derive(Debug, Default)]
struct SuffixPrinter {
    printed: usize,
}

impl SuffixPrinter {
    fn print(&mut self, out: &mut impl Write, accumulated: &str) {
        if let Some(suffix) = accumulated.get(self.printed..) {
            write!(out, "{suffix}").ok();
            out.flush().ok();
        }
        self.printed = accumulated.len();
    }
}
