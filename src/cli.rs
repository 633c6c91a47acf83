use clap::{Parser, Subcommand};

/// Chat with the academy's AI tutor from the terminal
#[derive(Debug, Parser)]
#[command(name = "tutor")]
#[command(version)]
#[command(about = "Chat with the academy's AI tutor", long_about = None)]
pub struct Args {
    /// Backend: "http" (default) or "stub" for offline use
    #[arg(long = "backend")]
    pub backend: Option<String>,

    /// Base URL of the backend service (overrides TUTOR_BASE_URL and config)
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Language for error messages: pt, en or es
    #[arg(short = 'l', long = "language")]
    pub language: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Line-by-line conversation on stdin/stdout
    Chat,

    /// Run an interactive terminal chat UI
    #[cfg(feature = "tui")]
    Tui,
}
