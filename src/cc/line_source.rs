//! Component A — Line Source (§4.A).
//!
//! Owns the multiplexer child process. Unlike the teacher's
//! [`portable_pty`]-backed [`crate::cc`] sibling in the example this crate
//! grew out of, tmux's control mode needs no pseudo-terminal on the client
//! side: `tmux -CC` is a plain line-oriented stdin/stdout protocol, so a
//! vanilla piped [`std::process::Child`] is the right primitive — the
//! reader-thread-plus-channel shape is the same one the teacher uses for
//! draining PTY output (`pty/mod.rs::EmbeddedTerminal::spawn`).

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, Result};

/// One item read from the child's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A newline-terminated line, newline stripped.
    Line(Vec<u8>),
    /// End of stream — the reader thread observed EOF. Terminal: every
    /// `next_line` call after the first `End` keeps returning `End`.
    End,
}

/// Owns the multiplexer child process and its line-buffered stdout reader.
pub struct LineSource {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    // `mpsc::Receiver` is `Send` but not `Sync`; the decoder thread and the
    // writer threads each hold their own `Arc<LineSource>` clone, so the
    // whole struct needs to be `Sync` for that sharing to compile.
    rx: Mutex<mpsc::Receiver<LineEvent>>,
    reader_handle: Option<thread::JoinHandle<()>>,
}

impl LineSource {
    /// Spawn `program args...` with stdin/stdout piped and start the
    /// reader thread.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn multiplexer binary `{program}`"))?;

        let stdin = child
            .stdin
            .take()
            .context("child process did not expose a stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("child process did not expose a stdout pipe")?;

        let (tx, rx) = mpsc::channel();
        let reader_handle = thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut buf = Vec::new();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        let _ = tx.send(LineEvent::End);
                        break;
                    }
                    Ok(_) => {
                        if buf.last() == Some(&b'\n') {
                            buf.pop();
                            if buf.last() == Some(&b'\r') {
                                buf.pop();
                            }
                        }
                        if tx.send(LineEvent::Line(buf)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = tx.send(LineEvent::End);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            rx: Mutex::new(rx),
            reader_handle: Some(reader_handle),
        })
    }

    /// Append a newline and write `bytes` to the child's stdin.
    ///
    /// Fails silently on broken pipe (§4.A contract) — the reader thread
    /// will observe EOF shortly and the caller finds out through
    /// `next_line` returning `End`.
    pub fn write_line(&self, bytes: &[u8]) {
        let mut stdin = self.stdin.lock().expect("line source stdin mutex poisoned");
        let _ = stdin.write_all(bytes).and_then(|()| stdin.write_all(b"\n"));
        let _ = stdin.flush();
    }

    /// Block until a line is available or the stream has ended.
    pub fn next_line(&self) -> LineEvent {
        let rx = self.rx.lock().expect("line source receiver mutex poisoned");
        rx.recv().unwrap_or(LineEvent::End)
    }

    /// Forceful termination of the child process.
    pub fn kill(&self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        self.kill();
        if let Some(handle) = self.reader_handle.take() {
            let _ = handle.join();
        }
    }
}
