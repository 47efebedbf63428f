//! `orbit shell` - interactive multi-session terminal
//!
//! The terminal runs in raw mode. A blocking reader task turns key events
//! into [`Input`]s; the main loop feeds them to the [`TerminalManager`] and
//! applies job events, and a [`Screen`] shows the focused session while
//! buffering the others.

use crate::{backends, workspace};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode, ClearType};
use crossterm::{cursor, execute};
use orbit_foundation::{OrbitConfig, Vfs, VfsStore};
use orbit_terminal::{CommandRouter, Palette, SessionId, TerminalEvent, TerminalManager};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Scrollback kept per background session
const SCROLLBACK_BYTES: usize = 64 * 1024;

const KEY_HINT: &str = "Ctrl+T new  Ctrl+W close  F1/F2 switch  F5 reset  Ctrl+Q quit";

pub async fn run(config: &OrbitConfig, workspace_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = match workspace_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let vfs = workspace::load(&dir).unwrap_or_else(|e| {
        warn!("starting with an empty workspace: {}", e);
        Vfs::new()
    });

    let backends = backends::build(config)?;
    let router = CommandRouter::new(VfsStore::new(vfs), backends.registry)
        .with_installer(backends.interpreter)
        .with_palette(Palette::new(config.client.color()));

    let (tx, mut events) = mpsc::unbounded_channel();
    let mut manager = TerminalManager::with_user(router, config.client.prompt(), tx);

    let _raw = RawMode::enable()?;
    let mut screen = Screen::new(io::stdout());

    let (key_tx, mut keys) = mpsc::unbounded_channel();
    read_keys(key_tx);

    loop {
        screen.drain(&mut events)?;

        tokio::select! {
            input = keys.recv() => {
                let Some(input) = input else { break };
                let focused = screen.focused();
                match input {
                    Input::Data(data) => manager.handle_input(focused, &data).await,
                    Input::NewSession => {
                        manager.open_session();
                    }
                    Input::CloseSession => {
                        manager.close_session(focused);
                        if manager.session_ids().is_empty() {
                            manager.open_session();
                        }
                    }
                    Input::Next => screen.cycle(&manager.session_ids(), 1)?,
                    Input::Previous => screen.cycle(&manager.session_ids(), -1)?,
                    Input::Reset => manager.reset(),
                    Input::Quit => break,
                }
            }
            Some(event) = manager.next_job_event() => manager.apply_job_event(event),
        }
    }

    for id in manager.session_ids() {
        manager.close_session(id);
    }
    screen.write_raw("\r\n")?;
    Ok(())
}

// ============================================================================
// Input
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    /// Raw terminal input for the focused session
    Data(String),
    NewSession,
    CloseSession,
    Next,
    Previous,
    Reset,
    Quit,
}

/// Map a key press to terminal input
fn translate(key: KeyEvent) -> Option<Input> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let input = match key.code {
        KeyCode::Char('c') if ctrl => Input::Data("\x03".to_string()),
        KeyCode::Char('q') if ctrl => Input::Quit,
        KeyCode::Char('t') if ctrl => Input::NewSession,
        KeyCode::Char('w') if ctrl => Input::CloseSession,
        KeyCode::Char(_) if ctrl => return None,
        KeyCode::Char(c) => Input::Data(c.to_string()),
        KeyCode::Enter => Input::Data("\r".to_string()),
        KeyCode::Backspace => Input::Data("\x7f".to_string()),
        KeyCode::Tab => Input::Data("    ".to_string()),
        KeyCode::F(1) => Input::Previous,
        KeyCode::F(2) => Input::Next,
        KeyCode::F(5) => Input::Reset,
        _ => return None,
    };
    Some(input)
}

/// Poll crossterm on a blocking thread until the receiver goes away
fn read_keys(tx: mpsc::UnboundedSender<Input>) {
    tokio::task::spawn_blocking(move || {
        let tick_rate = Duration::from_millis(100);
        while !tx.is_closed() {
            if !event::poll(tick_rate).unwrap_or(false) {
                continue;
            }
            let input = match event::read() {
                Ok(Event::Key(key)) => translate(key),
                Ok(Event::Paste(text)) => Some(Input::Data(text)),
                Ok(_) => None,
                Err(e) => {
                    warn!("terminal read failed: {}", e);
                    Some(Input::Quit)
                }
            };
            if let Some(input) = input {
                if tx.send(input).is_err() {
                    break;
                }
            }
        }
    });
}

// ============================================================================
// Raw mode
// ============================================================================

struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

// ============================================================================
// Screen
// ============================================================================

/// Shows the focused session; every session keeps a bounded scrollback
struct Screen<W: Write> {
    out: W,
    focused: SessionId,
    scrollback: BTreeMap<SessionId, String>,
}

impl<W: Write> Screen<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            focused: SessionId(1),
            scrollback: BTreeMap::new(),
        }
    }

    fn focused(&self) -> SessionId {
        self.focused
    }

    fn drain(&mut self, events: &mut mpsc::UnboundedReceiver<TerminalEvent>) -> io::Result<()> {
        while let Ok(event) = events.try_recv() {
            self.apply(event)?;
        }
        self.out.flush()
    }

    fn apply(&mut self, event: TerminalEvent) -> io::Result<()> {
        match event {
            TerminalEvent::Output { session, text } => {
                let buffer = self.scrollback.entry(session).or_default();
                buffer.push_str(&text);
                trim_front(buffer, SCROLLBACK_BYTES);
                if session == self.focused {
                    self.out.write_all(text.as_bytes())?;
                }
            }
            TerminalEvent::Clear { session } => {
                self.scrollback.insert(session, String::new());
                if session == self.focused {
                    self.clear()?;
                }
            }
            TerminalEvent::Opened { session } => {
                self.scrollback.entry(session).or_default();
                self.focus(session)?;
            }
            TerminalEvent::Closed { session } => {
                self.scrollback.remove(&session);
                if session == self.focused {
                    if let Some(next) = self.scrollback.keys().next().copied() {
                        self.focus(next)?;
                    }
                }
            }
            TerminalEvent::Reset => self.scrollback.clear(),
        }
        Ok(())
    }

    /// Move focus `step` places through `ids`, wrapping around
    fn cycle(&mut self, ids: &[SessionId], step: isize) -> io::Result<()> {
        let Some(pos) = ids.iter().position(|id| *id == self.focused) else {
            return match ids.first() {
                Some(first) => self.focus(*first),
                None => Ok(()),
            };
        };
        let len = ids.len() as isize;
        let next = (pos as isize + step).rem_euclid(len) as usize;
        self.focus(ids[next])
    }

    fn focus(&mut self, session: SessionId) -> io::Result<()> {
        self.focused = session;
        self.clear()?;
        write!(self.out, "-- orbit {} -- {}\r\n", session, KEY_HINT)?;
        if let Some(buffer) = self.scrollback.get(&session) {
            self.out.write_all(buffer.as_bytes())?;
        }
        self.out.flush()
    }

    fn clear(&mut self) -> io::Result<()> {
        execute!(self.out, terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))
    }

    fn write_raw(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }
}

/// Drop leading text until `buffer` fits in `max` bytes
fn trim_front(buffer: &mut String, max: usize) {
    if buffer.len() <= max {
        return;
    }
    let mut cut = buffer.len() - max;
    while !buffer.is_char_boundary(cut) {
        cut += 1;
    }
    buffer.drain(..cut);
}
