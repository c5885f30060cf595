//! Component E — Command Pipeline (§4.E).
//!
//! Pairs outgoing commands with the callback that should receive their
//! eventual `%begin/%end` result. Enqueueing the callback and writing the
//! command text happen under the same lock so a Result can never race ahead
//! of the callback meant to consume it — grounded on
//! `original_source/terminatorlib/tmuxcontrolmode/__init__.py::TmuxControl.send_command`,
//! which holds `self._command_lock` across `self._command_queue.put(callback)`
//! and `self.tmux.send_input(command)`.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::debug;

use crate::cc::line_source::LineSource;
use crate::notification::CommandResult;

/// Invoked with the `Result` paired to the command that requested it.
pub type Callback = Box<dyn FnOnce(&CommandResult) + Send>;

/// FIFO of pending callbacks, one per in-flight command, plus the write
/// lock that keeps enqueue-and-write atomic.
pub struct CommandPipeline {
    queue: Mutex<VecDeque<Option<Callback>>>,
}

impl CommandPipeline {
    /// A fresh pipeline, pre-loaded with the no-callback sentinel that
    /// absorbs the server's unsolicited handshake Result (§4.E: "On start,
    /// the pipeline pre-enqueues one pending entry with no callback").
    pub fn new() -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(None);
        Self { queue: Mutex::new(queue) }
    }

    /// Append `callback` to the FIFO and write `command_text` (plus a
    /// trailing newline, added by [`LineSource::write_line`]) to the child's
    /// stdin, both under the same lock.
    pub fn enqueue(&self, line_source: &LineSource, command_text: &str, callback: Option<Callback>) {
        let mut queue = self.queue.lock().expect("command pipeline mutex poisoned");
        queue.push_back(callback);
        debug!(command = command_text, "enqueuing command");
        line_source.write_line(command_text.as_bytes());
    }

    /// Pop the callback paired to the next Result in arrival order, used by
    /// the Dispatcher (§4.F). Returns `None` if a Result arrives with no
    /// matching pending entry (should not happen in a well-formed session,
    /// but the pipeline stays inert rather than panicking).
    pub fn take_next_callback(&self) -> Option<Callback> {
        let mut queue = self.queue.lock().expect("command pipeline mutex poisoned");
        queue.pop_front().flatten()
    }
}

impl Default for CommandPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fake_line_source() -> LineSource {
        LineSource::spawn("cat", &[]).expect("spawning `cat` for a pipeline test")
    }

    #[test]
    fn starts_with_one_sentinel_entry() {
        let pipeline = CommandPipeline::new();
        assert!(pipeline.take_next_callback().is_none());
        assert!(pipeline.take_next_callback().is_none());
    }

    #[test]
    fn callbacks_pop_in_fifo_order() {
        let pipeline = CommandPipeline::new();
        let line_source = fake_line_source();
        let calls: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        for tag in [1u32, 2, 3] {
            let calls = Arc::clone(&calls);
            pipeline.enqueue(
                &line_source,
                "list-windows",
                Some(Box::new(move |_result| calls.lock().unwrap().push(tag))),
            );
        }

        // Drain the pre-enqueued sentinel first.
        assert!(pipeline.take_next_callback().is_none());

        let sample = CommandResult {
            begin_timestamp: "0".to_string(),
            code: "0".to_string(),
            body: Vec::new(),
            end_timestamp: "0".to_string(),
            error: false,
        };
        for _ in 0..3 {
            let callback = pipeline.take_next_callback().expect("callback should be present");
            callback(&sample);
        }
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn take_next_callback_on_empty_queue_is_none() {
        let pipeline = CommandPipeline::new();
        assert!(pipeline.take_next_callback().is_none());
        assert!(pipeline.take_next_callback().is_none());
    }

    #[test]
    fn enqueue_without_callback_still_advances_queue() {
        let pipeline = CommandPipeline::new();
        let line_source = fake_line_source();
        let called = Arc::new(AtomicUsize::new(0));
        pipeline.enqueue(&line_source, "refresh-client", None);
        let called2 = Arc::clone(&called);
        pipeline.enqueue(
            &line_source,
            "list-windows",
            Some(Box::new(move |_| {
                called2.fetch_add(1, Ordering::SeqCst);
            })),
        );

        assert!(pipeline.take_next_callback().is_none()); // startup sentinel
        assert!(pipeline.take_next_callback().is_none()); // refresh-client, no callback
        let sample = CommandResult {
            begin_timestamp: "0".to_string(),
            code: "0".to_string(),
            body: Vec::new(),
            end_timestamp: "0".to_string(),
            error: false,
        };
        pipeline.take_next_callback().unwrap()(&sample);
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }
}
