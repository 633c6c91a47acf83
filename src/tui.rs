#![cfg(feature = "tui")]

use crate::chat::{decode_stream, ChatSession, ChatTurn, Language, Role};
use crate::provider::{ChatBackend, TransportError};
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug)]
enum StreamMsg {
    /// Full assistant text so far.
    Update(String),
    Done,
    Error(TransportError),
}

pub async fn run_tui(backend: Arc<dyn ChatBackend>, language: Language) -> anyhow::Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let mut session = ChatSession::new(language);
    let mut input = String::new();
    let mut status = Some("Type a message and press Enter. Commands: /quit, /clear".to_string());
    let mut active_stream: Option<mpsc::UnboundedReceiver<StreamMsg>> = None;
    let mut frame: usize = 0;

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                frame = frame.wrapping_add(1);
                if let Err(e) = draw(&mut terminal, &session, &input, status.as_deref(), frame) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    match handle_key(key, &mut input, &mut session, &backend, &mut active_stream) {
                        KeyAction::Quit => break Ok(()),
                        KeyAction::Status(s) => status = Some(s),
                        KeyAction::None => {}
                    }
                }
            }
            Some(msg) = async {
                match &mut active_stream {
                    Some(rx) => rx.recv().await,
                    None => None,
                }
            } => {
                match msg {
                    StreamMsg::Update(text) => session.apply_update(&text),
                    StreamMsg::Done => {
                        session.finish();
                        active_stream = None;
                    }
                    StreamMsg::Error(e) => {
                        status = Some(e.describe(session.language()));
                        session.fail(&e);
                        active_stream = None;
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

enum KeyAction {
    None,
    Quit,
    Status(String),
}

fn handle_key(
    key: KeyEvent,
    input: &mut String,
    session: &mut ChatSession,
    backend: &Arc<dyn ChatBackend>,
    active_stream: &mut Option<mpsc::UnboundedReceiver<StreamMsg>>,
) -> KeyAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return KeyAction::Quit;
    }

    match key.code {
        KeyCode::Esc => return KeyAction::Quit,
        KeyCode::Char(c) => input.push(c),
        KeyCode::Backspace => {
            input.pop();
        }
        KeyCode::Enter => {
            let msg = input.trim().to_string();
            input.clear();
            if msg.is_empty() {
                return KeyAction::None;
            }

            if msg == "/quit" {
                return KeyAction::Quit;
            }
            if msg == "/clear" {
                session.clear();
                return KeyAction::None;
            }

            let Some(turns) = session.begin(&msg) else {
                return KeyAction::Status("(the tutor is still answering; wait for completion)".to_string());
            };

            let (tx, rx) = mpsc::unbounded_channel::<StreamMsg>();
            *active_stream = Some(rx);
            tokio::spawn(stream_reply(Arc::clone(backend), turns, tx));
        }
        _ => {}
    }

    KeyAction::None
}

async fn stream_reply(
    backend: Arc<dyn ChatBackend>,
    turns: Vec<ChatTurn>,
    tx: mpsc::UnboundedSender<StreamMsg>,
) {
    let stream = match backend.open_stream(&turns).await {
        Ok(s) => s,
        Err(e) => {
            let _ = tx.send(StreamMsg::Error(e));
            return;
        }
    };

    let result = decode_stream(stream, |text: &str| {
        let _ = tx.send(StreamMsg::Update(text.to_string()));
    })
    .await;

    let _ = tx.send(match result {
        Ok(_) => StreamMsg::Done,
        Err(e) => StreamMsg::Error(e),
    });
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &ChatSession,
    input: &str,
    status: Option<&str>,
    frame: usize,
) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1), Constraint::Length(3)])
            .split(f.area());

        let mut text = Text::default();
        for turn in session.turns() {
            let (label, style) = match turn.role {
                Role::User => ("you: ", Style::default().add_modifier(Modifier::BOLD)),
                Role::Assistant => ("tutor: ", Style::default()),
            };
            text.lines.push(Line::styled(label, style));
            text.lines.extend(Text::from(turn.content.clone()).lines);
            text.lines.push(Line::from(""));
        }
        if session.is_waiting() {
            let spin = SPINNER[(frame / 4) % SPINNER.len()];
            text.lines.push(Line::styled(format!("tutor is thinking {spin}"), Style::default().add_modifier(Modifier::ITALIC)));
        }

        let chat = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("AI tutor"))
            .wrap(Wrap { trim: false });

        let status_w = Paragraph::new(status.unwrap_or_default().to_string());

        let input_w = Paragraph::new(input.to_string())
            .block(Block::default().borders(Borders::ALL).title("message"));

        f.render_widget(chat, chunks[0]);
        f.render_widget(status_w, chunks[1]);
        f.render_widget(input_w, chunks[2]);

        f.set_cursor_position(cursor_position(chunks[2], input));
    })?;
    Ok(())
}

/// Cursor just after the input text, clamped to the inside of the box.
fn cursor_position(area: Rect, input: &str) -> (u16, u16) {
    let typed = u16::try_from(input.chars().count()).unwrap_or(u16::MAX);
    let x = area.x.saturating_add(1).saturating_add(typed);
    let max_x = area.x.saturating_add(area.width.saturating_sub(2));
    (x.min(max_x), area.y.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_follows_short_input() {
        let area = Rect::new(0, 20, 40, 3);
        assert_eq!(cursor_position(area, ""), (1, 21));
        assert_eq!(cursor_position(area, "olá"), (4, 21));
    }

    #[test]
    fn cursor_is_clamped_for_huge_input() {
        let area = Rect::new(2, 5, 40, 3);
        let input = "x".repeat(usize::from(u16::MAX) + 10);
        assert_eq!(cursor_position(area, &input), (40, 6));
    }
}
