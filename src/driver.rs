//! Component G — Session Driver (§4.G).
//!
//! Owns components A–F for one multiplexer session and exposes the command
//! surface a host application drives: starting the session, registering
//! terminal views and handlers, and sending input. Grounded on
//! `original_source/terminatorlib/tmuxcontrolmode/__init__.py::TmuxControl`
//! and `original_source/terminatorlib/tmux/control.py::TerminatorTmuxControl`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::info;

use crate::cc::dispatcher::{Dispatcher, DriverStatus, Handler};
use crate::cc::line_source::{LineEvent, LineSource};
use crate::cc::pipeline::{Callback, CommandPipeline};
use crate::cc::decoder;
use crate::collab::{IdleQueue, KeyEvent, KeySym, LayoutHost, Modifiers, ScrollEvent, TerminalView};
use crate::ids::PaneId;
use crate::notification::CommandResult;

const ESCAPE_CODE: u8 = 0x1b;

/// Wire sequence for a symbolic key, ignoring modifiers (§4.G key mapping
/// table).
fn base_sequence(keysym: KeySym) -> Option<&'static str> {
    match keysym {
        KeySym::Backspace => Some("\u{08}"),
        KeySym::Tab => Some("\u{09}"),
        KeySym::Insert => Some("\u{1b}[2~"),
        KeySym::Delete => Some("\u{1b}[3~"),
        KeySym::PageUp => Some("\u{1b}[5~"),
        KeySym::PageDown => Some("\u{1b}[6~"),
        KeySym::Home => Some("\u{1b}[1~"),
        KeySym::End => Some("\u{1b}[4~"),
        KeySym::Up => Some("\u{1b}[A"),
        KeySym::Down => Some("\u{1b}[B"),
        KeySym::Right => Some("\u{1b}[C"),
        KeySym::Left => Some("\u{1b}[D"),
        KeySym::Other => None,
    }
}

fn is_arrow(keysym: KeySym) -> bool {
    matches!(keysym, KeySym::Up | KeySym::Down | KeySym::Right | KeySym::Left)
}

/// Translate a normalized key event to the bytes `send_content` should write
/// (§4.G). Returns `None` when the combination has no wire representation
/// (e.g. Alt held together with Ctrl or Shift on a mapped key).
fn key_to_wire_sequence(event: &KeyEvent) -> Option<String> {
    let mut key = match base_sequence(event.keysym) {
        Some(mapped) => {
            if is_arrow(event.keysym) && event.modifiers.contains(Modifiers::CTRL) {
                let (prefix, letter) = mapped.split_at(mapped.len() - 1);
                format!("{prefix}1;5{letter}")
            } else {
                mapped.to_string()
            }
        }
        None => event.text.clone(),
    };

    if event.modifiers.contains(Modifiers::ALT) {
        if event.modifiers.intersects(Modifiers::CTRL | Modifiers::SHIFT) {
            return None;
        }
        key = format!("\u{1b}{key}");
    }

    if key == ";" {
        key = "\\;".to_string();
    }

    Some(key)
}

/// Quote `content` for `send-keys`: single quotes unless it contains one,
/// then double quotes; `-l` is added whenever the escape byte is present
/// (§4.G).
fn quote_send_keys(content: &str) -> (bool, char) {
    let needs_literal_flag = content.as_bytes().contains(&ESCAPE_CODE);
    let quote = if content.contains('\'') { '"' } else { '\'' };
    (needs_literal_flag, quote)
}

pub struct SessionDriver {
    program: String,
    args: Vec<String>,
    line_source: Mutex<Option<Arc<LineSource>>>,
    pipeline: Arc<CommandPipeline>,
    dispatcher: Arc<Dispatcher>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl SessionDriver {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        layout_host: Box<dyn LayoutHost + Send>,
        idle_queue: Arc<dyn IdleQueue + Send + Sync>,
    ) -> (Self, Receiver<DriverStatus>) {
        let pipeline = Arc::new(CommandPipeline::new());
        let (status_tx, status_rx) = std::sync::mpsc::channel();
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&pipeline), layout_host, idle_queue, status_tx));
        (
            Self {
                program: program.into(),
                args,
                line_source: Mutex::new(None),
                pipeline,
                dispatcher,
                reader_handle: Mutex::new(None),
                dispatcher_handle: Mutex::new(None),
                running: AtomicBool::new(false),
            },
            status_rx,
        )
    }

    /// Spawn the multiplexer, start the Decoder and Dispatcher threads, then
    /// request the initial window list (§4.G `start()`).
    pub fn start(&self) -> anyhow::Result<()> {
        let line_source = Arc::new(LineSource::spawn(&self.program, &self.args)?);
        *self.line_source.lock().expect("line source mutex poisoned") = Some(Arc::clone(&line_source));

        let (decoder_rx, decoder_handle) = decoder::spawn(Arc::clone(&line_source));
        *self.reader_handle.lock().expect("reader handle mutex poisoned") = Some(decoder_handle);

        let dispatcher = Arc::clone(&self.dispatcher);
        let dispatcher_handle = std::thread::spawn(move || dispatcher.run(&decoder_rx));
        *self.dispatcher_handle.lock().expect("dispatcher handle mutex poisoned") = Some(dispatcher_handle);

        self.running.store(true, Ordering::SeqCst);
        info!(program = self.program.as_str(), "session driver started");

        let dispatcher = Arc::clone(&self.dispatcher);
        self.list_session_windows(
            "",
            Some(Box::new(move |result: &CommandResult| {
                dispatcher.seed_initial_layout(&result.body_lines_lossy());
            })),
        );
        Ok(())
    }

    pub fn add_terminal(&self, pane_id: PaneId, view: Box<dyn TerminalView>) {
        self.dispatcher.add_terminal(pane_id, view);
    }

    pub fn remove_terminal(&self, pane_id: &PaneId) {
        self.dispatcher.remove_terminal(pane_id);
    }

    pub fn add_handler(&self, marker: impl Into<String>, handler: Handler) {
        self.dispatcher.add_handler(marker, handler);
    }

    fn enqueue(&self, command_text: &str, callback: Option<Callback>) {
        let guard = self.line_source.lock().expect("line source mutex poisoned");
        if let Some(line_source) = guard.as_ref() {
            self.pipeline.enqueue(line_source, command_text, callback);
        }
    }

    /// Quote `text` and emit `send-keys -t {pane_id} [-l] -- {quoted}` (§4.G).
    pub fn send_content(&self, text: &str, pane_id: &str) {
        let (literal, quote) = quote_send_keys(text);
        let flag = if literal { "-l " } else { "" };
        let command = format!("send-keys -t {pane_id} {flag}-- {quote}{text}{quote}");
        self.enqueue(&command, None);
    }

    /// Translate a normalized key event and forward it via `send_content` (§4.G).
    pub fn send_keypress(&self, event: &KeyEvent, pane_id: &str) {
        if let Some(sequence) = key_to_wire_sequence(event) {
            self.send_content(&sequence, pane_id);
        }
    }

    /// If `pane_id`'s alternate-screen flag is set, send scroll keys and
    /// return `true` (consumed); otherwise return `false` (§4.G, S5).
    pub fn send_mousewheel(&self, event: ScrollEvent, pane_id: &str) -> bool {
        if !self.dispatcher.is_alternate_screen(&PaneId::new(pane_id)) {
            return false;
        }
        let scrolling_up = matches!(event, ScrollEvent::Up) || matches!(event, ScrollEvent::Smooth { delta_y } if delta_y <= 0.0);
        let wheel = if scrolling_up { "C-y C-y C-y" } else { "C-e C-e C-e" };
        self.enqueue(&format!("send-keys -t {pane_id} {wheel}"), None);
        true
    }

    pub fn list_session_windows(&self, session: &str, callback: Option<Callback>) {
        let target = if session.is_empty() { String::new() } else { format!(" -t {session}") };
        self.enqueue(
            &format!(r#"list-windows{target} -F "#{{window_id}} #{{window_layout}}""#),
            callback,
        );
    }

    pub fn split_pane(&self, cwd: Option<&str>, horizontal: bool, pane_id: &str, command: Option<&str>, marker: &str, callback: Option<Callback>) {
        let orientation = if horizontal { "-h" } else { "-v" };
        let mut text = format!(r#"split-window {orientation} -t {pane_id} -P -F "#D {marker}""#);
        if let Some(cwd) = cwd {
            text.push_str(&format!(r#" -c "{cwd}""#));
        }
        if let Some(command) = command {
            text.push_str(&format!(r#" "{command}""#));
        }
        self.enqueue(&text, callback);
    }

    pub fn new_window(&self, cwd: Option<&str>, command: Option<&str>, marker: &str, callback: Option<Callback>) {
        let mut text = format!(r#"new-window -P -F "#D {marker}""#);
        if let Some(cwd) = cwd {
            text.push_str(&format!(r#" -c "{cwd}""#));
        }
        if let Some(command) = command {
            text.push_str(&format!(r#" "{command}""#));
        }
        self.enqueue(&text, callback);
    }

    pub fn capture_pane(&self, pane_id: &str, callback: Option<Callback>) {
        self.enqueue(&format!("capture-pane -J -p -t {pane_id} -eC -S - -E -"), callback);
    }

    pub fn refresh_client(&self, cols: u32, rows: u32) {
        self.enqueue(&format!("refresh-client -C {cols},{rows}"), None);
    }

    pub fn resize_pane(&self, pane_id: &str, rows: u32, cols: u32) {
        self.enqueue(&format!(r#"resize-pane -t "{pane_id}" -x {cols} -y {rows}"#), None);
    }

    /// Close E, kill A, and join B and F (§4.G `shutdown()`).
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(line_source) = self.line_source.lock().expect("line source mutex poisoned").take() {
            line_source.kill();
        }
        if let Some(handle) = self.reader_handle.lock().expect("reader handle mutex poisoned").take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatcher_handle.lock().expect("dispatcher handle mutex poisoned").take() {
            let _ = handle.join();
        }
        info!("session driver shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}
