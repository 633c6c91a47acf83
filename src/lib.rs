//! Terminal client for the coding academy's AI tutor.
//!
//! The tutor endpoint streams its reply as `data: <json>` frames; see
//! [`chat::StreamDecoder`] for how those are turned into a growing
//! assistant turn.

pub mod app;
pub mod chat;
pub mod cli;
pub mod config;
pub mod paths;
pub mod provider;

#[cfg(feature = "tui")]
pub mod tui;
