use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers, MouseEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{info, warn};

use tmuxcc::cc::DriverStatus;
use tmuxcc::collab::{IdleQueue, KeyEvent as TmuxKeyEvent, KeySym, LayoutHost, Modifiers, ScrollEvent, TerminalView};
use tmuxcc::layout::{grammar, model};
use tmuxcc::{config, logging, SessionDriver};

#[derive(Parser)]
#[command(name = "tmuxcc", about = "A client driving tmux over its control-mode protocol")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to an existing tmux session
    Attach { session: String },
    /// Create a new tmux session
    New { session: String },
}

/// Writes pane output straight through to this process's own stdout. Actual
/// cell rendering is the out-of-scope terminal-view collaborator (§6); this
/// is a passthrough stand-in for demonstration purposes only.
struct PassthroughTerminalView {
    pane_id: String,
}

impl TerminalView for PassthroughTerminalView {
    fn write(&mut self, bytes: &[u8]) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    }

    fn close(&mut self) {
        info!(pane_id = self.pane_id.as_str(), "pane closed");
    }

    fn cwd(&self) -> Option<&str> {
        None
    }

    fn pane_id(&self) -> &str {
        &self.pane_id
    }

    fn set_pane_id(&mut self, pane_id: &str) {
        self.pane_id = pane_id.to_string();
    }
}

/// Logs split/close requests instead of manipulating a real widget tree —
/// structural UI manipulation is the out-of-scope layout-host collaborator (§6).
struct LoggingLayoutHost;

impl LayoutHost for LoggingLayoutHost {
    fn split_axis(&mut self, existing_pane_id: &str, vertical: bool, sibling_pane_id: &str, widget_first: bool) {
        info!(
            existing_pane_id,
            vertical, sibling_pane_id, widget_first, "split_axis requested"
        );
    }
}

/// Runs posted work immediately on the calling (dispatcher) thread. A real
/// host would hop to its UI thread instead (§6).
struct ImmediateIdleQueue;

impl IdleQueue for ImmediateIdleQueue {
    fn post(&self, mut task: Box<dyn FnMut() -> bool + Send>) {
        task();
    }
}

fn crossterm_key_to_normalized(key: crossterm::event::KeyEvent) -> Option<TmuxKeyEvent> {
    let mut modifiers = Modifiers::empty();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        modifiers |= Modifiers::CTRL;
    }
    if key.modifiers.contains(KeyModifiers::SHIFT) {
        modifiers |= Modifiers::SHIFT;
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        modifiers |= Modifiers::ALT;
    }

    let (keysym, text) = match key.code {
        KeyCode::Backspace => (KeySym::Backspace, String::new()),
        KeyCode::Tab => (KeySym::Tab, String::new()),
        KeyCode::Insert => (KeySym::Insert, String::new()),
        KeyCode::Delete => (KeySym::Delete, String::new()),
        KeyCode::PageUp => (KeySym::PageUp, String::new()),
        KeyCode::PageDown => (KeySym::PageDown, String::new()),
        KeyCode::Home => (KeySym::Home, String::new()),
        KeyCode::End => (KeySym::End, String::new()),
        KeyCode::Up => (KeySym::Up, String::new()),
        KeyCode::Down => (KeySym::Down, String::new()),
        KeyCode::Right => (KeySym::Right, String::new()),
        KeyCode::Left => (KeySym::Left, String::new()),
        KeyCode::Enter => (KeySym::Other, "\r".to_string()),
        KeyCode::Char(c) => (KeySym::Other, c.to_string()),
        _ => return None,
    };

    Some(TmuxKeyEvent { keysym, modifiers, text })
}

fn run_session(session: String, new: bool) -> Result<()> {
    let config_path = config::default_config_path().ok();
    let config = config_path
        .as_deref()
        .map(config::load)
        .transpose()?
        .unwrap_or_default();

    let _log_guard = logging::init(config.log_file.as_deref());

    let args = if new {
        vec!["-CC".to_string(), "new".to_string(), "-s".to_string(), session.clone()]
    } else {
        vec!["-CC".to_string(), "attach".to_string(), "-t".to_string(), session.clone()]
    };
    let mut full_args = config.multiplexer_args.clone();
    full_args.extend(args);

    let (driver, status_rx) = SessionDriver::new(
        config.multiplexer_binary.to_string_lossy().into_owned(),
        full_args,
        Box::new(LoggingLayoutHost),
        Arc::new(ImmediateIdleQueue),
    );
    let driver = Arc::new(driver);

    let active_pane: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    {
        // A `Weak` avoids a reference cycle: this handler is owned (via the
        // dispatcher) by `driver` itself, so capturing a strong `Arc<SessionDriver>`
        // here would mean `driver` never reaches a refcount of zero and its
        // `Drop` (which kills the child process) would never run.
        let driver_weak = Arc::downgrade(&driver);
        let active_pane = Arc::clone(&active_pane);
        driver.add_handler(
            "layout-change",
            Box::new(move |notification| {
                let Some(driver) = driver_weak.upgrade() else { return };
                let tmuxcc::Notification::LayoutChange { window_layout, .. } = notification else { return };
                let Ok(parsed) = grammar::parse(window_layout) else { return };
                let Some(first) = parsed.first() else { return };
                let tree = model::from_parse_node(first);
                for pane_id in model::all_panes(&tree) {
                    let mut active = active_pane.lock().expect("active pane mutex poisoned");
                    if active.is_none() {
                        *active = Some(pane_id.as_str().to_string());
                    }
                    driver.add_terminal(
                        pane_id.clone(),
                        Box::new(PassthroughTerminalView { pane_id: pane_id.as_str().to_string() }),
                    );
                }
            }),
        );
    }

    driver.start().context("failed to start tmux control-mode session")?;
    println!("attached to session `{session}` — press Ctrl+Q to detach");

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            while let Ok(status) = status_rx.recv() {
                match status {
                    DriverStatus::Exited { reason } => {
                        warn!(?reason, "session exited");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    DriverStatus::AttachFailed => {
                        warn!("attach failed, session not found");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    DriverStatus::InitialLayout(layout) => {
                        info!(window_count = layout.len(), "initial layout published");
                    }
                }
            }
        });
    }

    enable_raw_mode().context("failed to enable terminal raw mode")?;
    let _ = execute!(std::io::stdout(), EnableMouseCapture);
    let result = input_loop(&driver, &active_pane, &running);
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    let _ = disable_raw_mode();
    result
}

fn input_loop(driver: &SessionDriver, active_pane: &Mutex<Option<String>>, running: &AtomicBool) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        if !event::poll(std::time::Duration::from_millis(200))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    break;
                }
                let Some(pane_id) = active_pane.lock().expect("active pane mutex poisoned").clone() else {
                    continue;
                };
                if let Some(normalized) = crossterm_key_to_normalized(key) {
                    driver.send_keypress(&normalized, &pane_id);
                }
            }
            Event::Mouse(mouse) => {
                let Some(pane_id) = active_pane.lock().expect("active pane mutex poisoned").clone() else {
                    continue;
                };
                let scroll = match mouse.kind {
                    MouseEventKind::ScrollUp => Some(ScrollEvent::Up),
                    MouseEventKind::ScrollDown => Some(ScrollEvent::Down),
                    _ => None,
                };
                if let Some(scroll) = scroll {
                    driver.send_mousewheel(scroll, &pane_id);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Attach { session } => run_session(session, false),
        Commands::New { session } => run_session(session, true),
    }
}
