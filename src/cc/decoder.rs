//! Component B — Notification Decoder (§4.B).
//!
//! Consumes lines from the Line Source and produces typed notifications,
//! collapsing `%begin … %end|%error` blocks into a single [`Notification::Result`].
//! Runs on its own thread; it is the only thread that touches the
//! begin/end accumulator, so there is no shared decoder state (§5).

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::cc::line_source::LineEvent;
use crate::ids::{PaneId, WindowId};
use crate::notification::{CommandResult, Notification};

/// What the decoder pushes onto its output queue: either a decoded
/// notification, or the end-of-stream sentinel (§4.B, §5 — "cascade to
/// sentinel values the Decoder and Dispatcher use to exit").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    Notification(Notification),
    End,
}

/// Anything the decoder can pull blocking lines from. Implemented by
/// [`crate::cc::line_source::LineSource`]; abstracted here so the
/// begin/end accumulator can be exercised in tests without a child process.
pub trait LineFeed {
    fn next_line(&self) -> LineEvent;
}

impl LineFeed for crate::cc::line_source::LineSource {
    fn next_line(&self) -> LineEvent {
        crate::cc::line_source::LineSource::next_line(self)
    }
}

/// Spawn the decoder thread. Returns the receiving end of its output queue
/// and the thread handle.
pub fn spawn<L: LineFeed + Send + Sync + 'static>(
    line_source: Arc<L>,
) -> (mpsc::Receiver<DecoderEvent>, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || run(line_source.as_ref(), &tx));
    (rx, handle)
}

fn run(line_source: &dyn LineFeed, tx: &mpsc::Sender<DecoderEvent>) {
    loop {
        match line_source.next_line() {
            LineEvent::End => {
                let _ = tx.send(DecoderEvent::End);
                return;
            }
            LineEvent::Line(line) => {
                if let Some(notification) = decode_line(&line, line_source) {
                    if tx.send(DecoderEvent::Notification(notification)).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Decode one line. Returns `None` for pre-welcome noise (empty or
/// unprefixed lines) — those are silently discarded (§4.B step 1).
///
/// When the line opens a `%begin` block, reads the rest of the block
/// directly off `line_source` (the server guarantees no other notification
/// interleaves inside a begin/end block — §4.B).
fn decode_line(line: &[u8], line_source: &dyn LineFeed) -> Option<Notification> {
    if line.is_empty() || line[0] != b'%' {
        return None;
    }

    let rest = &line[1..];
    let mut parts = rest.splitn(2, |&b| b == b' ');
    let marker = parts.next().unwrap_or(b"");
    let payload = parts.next().unwrap_or(b"");
    let marker_str = String::from_utf8_lossy(marker).into_owned();

    if marker_str == "begin" {
        return Some(decode_result_block(payload, line_source));
    }

    Some(decode_other(&marker_str, payload))
}

/// Read a `%begin ts code flags` header plus body lines up to `%end`/`%error`.
fn decode_result_block(begin_payload: &[u8], line_source: &dyn LineFeed) -> Notification {
    let mut begin_fields = split_fields(begin_payload, 3);
    let begin_timestamp = begin_fields.next().unwrap_or_default();
    let code = begin_fields.next().unwrap_or_default();

    let mut body = Vec::new();
    loop {
        match line_source.next_line() {
            LineEvent::End => {
                // Stream ended mid-block; surface what we have as an error result.
                return Notification::Result(CommandResult {
                    begin_timestamp,
                    code,
                    body,
                    end_timestamp: String::new(),
                    error: true,
                });
            }
            LineEvent::Line(line) => {
                if line.starts_with(b"%end") || line.starts_with(b"%error") {
                    let is_error = line.starts_with(b"%error");
                    let skip = if is_error { b"%error".len() } else { b"%end".len() };
                    let terminator_rest = &line[skip..];
                    let terminator_rest = terminator_rest.strip_prefix(b" ").unwrap_or(terminator_rest);
                    let mut end_fields = split_fields(terminator_rest, 2);
                    let end_timestamp = end_fields.next().unwrap_or_default();
                    return Notification::Result(CommandResult {
                        begin_timestamp,
                        code,
                        body,
                        end_timestamp,
                        error: is_error,
                    });
                }
                body.push(line);
            }
        }
    }
}

/// Split `payload` on single spaces into at most `max_fields` owned UTF-8
/// strings; the last field absorbs any remaining spaces (mirrors how tmux
/// names carry through fixed-arity attribute lines).
fn split_fields(payload: &[u8], max_fields: usize) -> impl Iterator<Item = String> {
    let text = String::from_utf8_lossy(payload).into_owned();
    let mut fields: Vec<String> = if max_fields == 0 {
        Vec::new()
    } else {
        text.splitn(max_fields, ' ').map(str::to_string).collect()
    };
    if fields.len() == 1 && fields[0].is_empty() {
        fields.clear();
    }
    fields.into_iter()
}

fn decode_other(marker: &str, payload: &[u8]) -> Notification {
    match marker {
        "exit" => {
            let mut fields = split_fields(payload, 1);
            Notification::Exit {
                reason: fields.next().filter(|s| !s.is_empty()),
            }
        }
        "layout-change" => {
            let mut fields = split_fields(payload, 4);
            let window_id = fields.next().unwrap_or_default();
            let window_layout = fields.next().unwrap_or_default();
            let window_visible_layout = fields.next();
            let window_flags = fields.next();
            Notification::LayoutChange {
                window_id: WindowId::new(window_id),
                window_layout,
                window_visible_layout,
                window_flags,
            }
        }
        "output" => {
            let mut parts = payload.splitn(2, |&b| b == b' ');
            let pane_id = String::from_utf8_lossy(parts.next().unwrap_or(b"")).into_owned();
            let bytes = parts.next().unwrap_or(b"").to_vec();
            Notification::Output {
                pane_id: PaneId::new(pane_id),
                bytes,
            }
        }
        "session-changed" => {
            let mut fields = split_fields(payload, 2);
            Notification::SessionChanged {
                session_id: fields.next().unwrap_or_default(),
                session_name: fields.next().unwrap_or_default(),
            }
        }
        "session-renamed" => {
            let mut fields = split_fields(payload, 2);
            Notification::SessionRenamed {
                session_id: fields.next().unwrap_or_default(),
                session_name: fields.next().unwrap_or_default(),
            }
        }
        "sessions-changed" => Notification::SessionsChanged,
        "window-add" => {
            let mut fields = split_fields(payload, 1);
            Notification::WindowAdd {
                window_id: WindowId::new(fields.next().unwrap_or_default()),
            }
        }
        "window-close" => {
            let mut fields = split_fields(payload, 1);
            Notification::WindowClose {
                window_id: WindowId::new(fields.next().unwrap_or_default()),
            }
        }
        "window-renamed" => {
            let mut fields = split_fields(payload, 2);
            Notification::WindowRenamed {
                window_id: WindowId::new(fields.next().unwrap_or_default()),
                window_name: fields.next().unwrap_or_default(),
            }
        }
        "unlinked-window-add" => {
            let mut fields = split_fields(payload, 1);
            Notification::UnlinkedWindowAdd {
                window_id: WindowId::new(fields.next().unwrap_or_default()),
            }
        }
        "unlinked-window-close" => {
            let mut fields = split_fields(payload, 1);
            Notification::UnlinkedWindowClose {
                window_id: WindowId::new(fields.next().unwrap_or_default()),
            }
        }
        "unlinked-window-renamed" => {
            let mut fields = split_fields(payload, 2);
            Notification::UnlinkedWindowRenamed {
                window_id: WindowId::new(fields.next().unwrap_or_default()),
                window_name: fields.next().unwrap_or_default(),
            }
        }
        other => Notification::Unknown {
            marker: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::collections::VecDeque;

    struct FakeFeed(Mutex<VecDeque<LineEvent>>);

    impl FakeFeed {
        fn new(lines: &[&str]) -> Self {
            let queue = lines
                .iter()
                .map(|l| LineEvent::Line(l.as_bytes().to_vec()))
                .chain(std::iter::once(LineEvent::End))
                .collect();
            Self(Mutex::new(queue))
        }
    }

    impl LineFeed for FakeFeed {
        fn next_line(&self) -> LineEvent {
            self.0.lock().unwrap().pop_front().unwrap_or(LineEvent::End)
        }
    }

    fn decode_all(lines: &[&str]) -> Vec<Notification> {
        let feed = FakeFeed::new(lines);
        let mut out = Vec::new();
        loop {
            match feed.next_line() {
                LineEvent::End => break,
                LineEvent::Line(line) => {
                    if let Some(n) = decode_line(&line, &feed) {
                        out.push(n);
                    }
                }
            }
        }
        out
    }

    #[test]
    fn discards_pre_welcome_noise() {
        let notifications = decode_all(&["", "some banner text", "%sessions-changed"]);
        assert_eq!(notifications, vec![Notification::SessionsChanged]);
    }

    #[test]
    fn decodes_output() {
        let notifications = decode_all(&["%output %3 hello world"]);
        assert_eq!(
            notifications,
            vec![Notification::Output {
                pane_id: PaneId::new("%3"),
                bytes: b"hello world".to_vec(),
            }]
        );
    }

    #[test]
    fn decodes_layout_change_with_optional_fields_absent() {
        let notifications = decode_all(&["%layout-change @1 1234,80x24,0,0,5"]);
        assert_eq!(
            notifications,
            vec![Notification::LayoutChange {
                window_id: WindowId::new("@1"),
                window_layout: "1234,80x24,0,0,5".to_string(),
                window_visible_layout: None,
                window_flags: None,
            }]
        );
    }

    #[test]
    fn unknown_marker_is_decoded_for_dispatcher_to_drop() {
        let notifications = decode_all(&["%frobnicate something"]);
        assert_eq!(
            notifications,
            vec![Notification::Unknown {
                marker: "frobnicate".to_string()
            }]
        );
    }

    #[test]
    fn result_block_collapses_to_single_notification() {
        let notifications = decode_all(&[
            "%begin 1000 1 0",
            "line one",
            "line two",
            "%end 1000 1 0",
        ]);
        assert_eq!(
            notifications,
            vec![Notification::Result(CommandResult {
                begin_timestamp: "1000".to_string(),
                code: "1".to_string(),
                body: vec![b"line one".to_vec(), b"line two".to_vec()],
                end_timestamp: "1000".to_string(),
                error: false,
            })]
        );
    }

    #[test]
    fn error_terminator_sets_error_flag() {
        let notifications = decode_all(&["%begin 1 1 0", "%error 1 1 0"]);
        match &notifications[0] {
            Notification::Result(r) => assert!(r.error),
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[test]
    fn s2_result_pairing_body_and_error_sequence() {
        // §8 S2: three commands, three results, one with a body, one erroring.
        let notifications = decode_all(&[
            "%begin t1 0 ",
            "%end t1 0 ",
            "%begin t2 0 ",
            "foo",
            "%end t2 0 ",
            "%begin t3 0 ",
            "%error t3 0 ",
        ]);
        assert_eq!(notifications.len(), 3);
        match &notifications[1] {
            Notification::Result(r) => assert_eq!(r.body, vec![b"foo".to_vec()]),
            other => panic!("expected Result, got {other:?}"),
        }
        match &notifications[2] {
            Notification::Result(r) => assert!(r.error),
            other => panic!("expected Result, got {other:?}"),
        }
    }
}
