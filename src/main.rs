use anyhow::Context;
use clap::Parser;
use tutor_chat::{app, cli, config, paths};
#[cfg(feature = "tui")]
use tutor_chat::tui;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the reply; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let mut cfg = config::Config::load_optional(&config_path)?
        .unwrap_or_default()
        .with_env_overrides();
    if let Some(url) = args.base_url.clone() {
        cfg.base_url = Some(url);
    }
    tracing::debug!(?config_path, ?cfg.base_url, ?cfg.backend, "resolved config");

    let language = app::resolve_language(args.language.as_deref(), &cfg)?;

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let backend_name = args
        .backend
        .clone()
        .or_else(|| cfg.backend.clone())
        .unwrap_or_else(|| "http".to_string());
    let backend = app::build_backend(&http, &cfg, &backend_name)?;

    match args.cmd {
        Some(cli::Command::Chat) => {
            return app::run_repl(backend.as_ref(), language).await;
        }
        #[cfg(feature = "tui")]
        Some(cli::Command::Tui) => {
            return tui::run_tui(backend.into(), language).await;
        }
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: tutor \"What is a variable?\" or `tutor chat`");
    }

    app::run_once(backend.as_ref(), language, prompt.trim()).await
}
