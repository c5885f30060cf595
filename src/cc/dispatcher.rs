//! Component F — Dispatcher (§4.F).
//!
//! Consumes decoded notifications on its own thread. Results are paired back
//! to their command's callback via the [`CommandPipeline`]; every other
//! notification first reaches the built-in handler (layout-change bookkeeping,
//! output forwarding) and then every user-registered handler for that marker,
//! in registration order. Grounded on
//! `original_source/terminatorlib/tmuxcontrolmode/__init__.py::TmuxControl.process_notifications`
//! and `original_source/terminatorlib/tmux/handlers.py::NotificationsHandler`.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use crate::cc::decoder::DecoderEvent;
use crate::cc::pipeline::CommandPipeline;
use crate::collab::{IdleQueue, LayoutHost, TerminalView};
use crate::ids::{PaneId, WindowId};
use crate::layout::{grammar, model, LayoutNode, UiNode};
use crate::notification::Notification;

/// Bodies that mean "no such session" rather than a real command error
/// (§7: "the specific attach-not-found body strings").
const ATTACH_NOT_FOUND_MARKERS: &[&str] = &["can't find session", "no current session", "no sessions"];

const ALTERNATE_SCREEN_ENTER: &[u8] = b"\x1b[?1049h";
const ALTERNATE_SCREEN_EXIT: &[u8] = b"\x1b[?1049l";

/// A user-registered notification handler (§4.G `add_handler`).
pub type Handler = Box<dyn Fn(&Notification) + Send + Sync>;

/// Reports session-level state the caller cannot learn any other way (§7:
/// "session-level errors ... must be observable via a driver status channel").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStatus {
    Exited { reason: Option<String> },
    AttachFailed,
    /// The per-window layout trees seen at session attach, lowered to the
    /// host's widget-description map (§4.F "Initial layout").
    InitialLayout(BTreeMap<String, UiNode>),
}

/// Owns the pane registry, the per-window layout cache, and the alternate-
/// screen flags — every piece of state §5 restricts to the Dispatcher thread
/// (plus host-mutation under a single mutex, satisfied here by `Mutex`).
pub struct Dispatcher {
    pipeline: Arc<CommandPipeline>,
    panes: Mutex<HashMap<PaneId, Box<dyn TerminalView>>>,
    alternate_on: Mutex<HashMap<PaneId, bool>>,
    layouts: Mutex<HashMap<WindowId, LayoutNode>>,
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
    layout_host: Mutex<Box<dyn LayoutHost + Send>>,
    idle_queue: Arc<dyn IdleQueue + Send + Sync>,
    // `mpsc::Sender` is `Send` but not `Sync`; `Dispatcher` is shared via
    // `Arc` between the dispatch loop's thread and the host thread calling
    // `add_terminal`/`add_handler`, so every field needs to be `Sync`.
    status_tx: Mutex<std::sync::mpsc::Sender<DriverStatus>>,
    reinit: std::sync::atomic::AtomicBool,
}

impl Dispatcher {
    pub fn new(
        pipeline: Arc<CommandPipeline>,
        layout_host: Box<dyn LayoutHost + Send>,
        idle_queue: Arc<dyn IdleQueue + Send + Sync>,
        status_tx: std::sync::mpsc::Sender<DriverStatus>,
    ) -> Self {
        Self {
            pipeline,
            panes: Mutex::new(HashMap::new()),
            alternate_on: Mutex::new(HashMap::new()),
            layouts: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            layout_host: Mutex::new(layout_host),
            idle_queue,
            status_tx: Mutex::new(status_tx),
            reinit: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn add_terminal(&self, pane_id: PaneId, view: Box<dyn TerminalView>) {
        self.panes.lock().expect("pane registry mutex poisoned").insert(pane_id, view);
    }

    pub fn remove_terminal(&self, pane_id: &PaneId) {
        self.panes.lock().expect("pane registry mutex poisoned").remove(pane_id);
    }

    pub fn add_handler(&self, marker: impl Into<String>, handler: Handler) {
        self.handlers
            .lock()
            .expect("handler map mutex poisoned")
            .entry(marker.into())
            .or_default()
            .push(handler);
    }

    pub fn needs_reinit(&self) -> bool {
        self.reinit.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn clear_reinit(&self) {
        self.reinit.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn cached_layout(&self, window_id: &WindowId) -> Option<LayoutNode> {
        self.layouts.lock().expect("layouts cache mutex poisoned").get(window_id).cloned()
    }

    pub fn set_cached_layout(&self, window_id: WindowId, tree: LayoutNode) {
        self.layouts.lock().expect("layouts cache mutex poisoned").insert(window_id, tree);
    }

    /// The `list-windows` Result callback issued at session attach: parse each
    /// `"#{window_id} #{window_layout}"` body line, cache its tree, and
    /// publish the combined UI layout over the status channel (§4.F "Initial
    /// layout"). Lines that fail to parse are logged and skipped; a line with
    /// no window id is skipped outright.
    pub fn seed_initial_layout(&self, body_lines: &[String]) {
        let mut trees = Vec::new();
        for line in body_lines {
            let Some((window_id, window_layout)) = line.split_once(' ') else { continue };
            let parsed = match grammar::parse(window_layout) {
                Ok(nodes) => nodes,
                Err(err) => {
                    warn!(window_id, error = %err, "failed to parse initial layout");
                    continue;
                }
            };
            let Some(first) = parsed.first() else { continue };
            let tree = model::from_parse_node(first);
            self.set_cached_layout(WindowId::new(window_id), tree.clone());
            trees.push(tree);
        }

        if trees.is_empty() {
            return;
        }
        let ui_layout = model::convert_to_ui_layout(&trees, None, None);
        let _ = self
            .status_tx
            .lock()
            .expect("status sender mutex poisoned")
            .send(DriverStatus::InitialLayout(ui_layout));
    }

    /// Run the dispatch loop until `rx` yields [`DecoderEvent::End`] or an
    /// `exit` notification is observed (§4.F, §5).
    pub fn run(&self, rx: &Receiver<DecoderEvent>) {
        for event in rx {
            match event {
                DecoderEvent::End => {
                    debug!("decoder stream ended, dispatcher exiting");
                    return;
                }
                DecoderEvent::Notification(notification) => {
                    if self.dispatch_one(&notification) {
                        return;
                    }
                }
            }
        }
    }

    /// Returns `true` if the dispatcher should stop after this notification.
    fn dispatch_one(&self, notification: &Notification) -> bool {
        match notification {
            Notification::Result(result) => {
                if result.error && is_attach_not_found(&result.body_lines_lossy()) {
                    warn!("attach failed: session not found");
                    self.layouts.lock().expect("layouts cache mutex poisoned").clear();
                    self.reinit.store(true, std::sync::atomic::Ordering::SeqCst);
                    let _ = self.status_tx.lock().expect("status sender mutex poisoned").send(DriverStatus::AttachFailed);
                    return false;
                }
                if let Some(callback) = self.pipeline.take_next_callback() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| callback(result)));
                    if outcome.is_err() {
                        error!("command callback panicked");
                    }
                }
                false
            }
            Notification::Exit { reason } => {
                let _ = self
                    .status_tx
                    .lock()
                    .expect("status sender mutex poisoned")
                    .send(DriverStatus::Exited { reason: reason.clone() });
                true
            }
            Notification::LayoutChange { window_id, window_layout, .. } => {
                self.handle_layout_change(window_id, window_layout);
                self.run_user_handlers(notification);
                false
            }
            Notification::Output { pane_id, bytes } => {
                self.handle_output(pane_id, bytes);
                self.run_user_handlers(notification);
                false
            }
            Notification::Unknown { marker } => {
                debug!(marker = marker.as_str(), "dropping notification with no registered decoder");
                false
            }
            _ => {
                self.run_user_handlers(notification);
                false
            }
        }
    }

    fn run_user_handlers(&self, notification: &Notification) {
        let marker = notification.marker();
        let handlers = self.handlers.lock().expect("handler map mutex poisoned");
        let Some(list) = handlers.get(marker) else { return };
        for handler in list {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(notification)));
            if outcome.is_err() {
                error!(marker, "notification handler panicked");
            }
        }
    }

    /// §4.F layout-change algorithm, steps 1-5.
    fn handle_layout_change(&self, window_id: &WindowId, window_layout: &str) {
        let parsed = match grammar::parse(window_layout) {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(window_id = %window_id, error = %err, "failed to parse layout-change");
                return;
            }
        };
        let Some(first) = parsed.first() else {
            warn!(window_id = %window_id, "layout-change produced an empty element list");
            return;
        };
        let new_tree = model::from_parse_node(first);

        let old_tree = self.cached_layout(window_id);
        self.set_cached_layout(window_id.clone(), new_tree.clone());

        let Some(old_tree) = old_tree else {
            // First layout seen for this window; nothing to diff against.
            return;
        };

        let (added, removed) = model::diff(&old_tree, &new_tree);

        if !removed.is_empty() {
            for pane_id in removed {
                self.schedule_close(&pane_id);
            }
            return;
        }

        if added.is_empty() {
            return;
        }
        if added.len() > 1 {
            warn!(window_id = %window_id, count = added.len(), "rejecting layout-change with more than one added pane");
            return;
        }
        let new_pane_id = added.into_iter().next().expect("checked non-empty above");

        let Some(parent) = model::parent_of(&new_pane_id, &new_tree) else {
            warn!(window_id = %window_id, pane_id = %new_pane_id, "added pane has no parent in new tree");
            return;
        };
        let Some(index) = model::index_of(&new_pane_id, parent) else {
            return;
        };
        if index == 0 {
            warn!(window_id = %window_id, pane_id = %new_pane_id, "added pane has no previous sibling");
            return;
        }
        let Some(sibling) = sibling_pane_id(parent, index - 1) else {
            return;
        };

        let vertical = matches!(parent, LayoutNode::Vertical { .. });

        let panes = self.panes.lock().expect("pane registry mutex poisoned");
        if !panes.contains_key(&sibling) {
            warn!(pane_id = %sibling, "split sibling has no registered terminal view");
            return;
        }
        drop(panes);

        let mut host = self.layout_host.lock().expect("layout host mutex poisoned");
        host.split_axis(sibling.as_str(), vertical, new_pane_id.as_str(), true);
    }

    fn schedule_close(&self, pane_id: &PaneId) {
        let Some(mut view) = self.panes.lock().expect("pane registry mutex poisoned").remove(pane_id) else {
            return;
        };
        let pane_id = pane_id.clone();
        self.idle_queue.post(Box::new(move || {
            tracing::trace!(pane_id = %pane_id, "closing terminal view");
            view.close();
            false
        }));
    }

    pub(crate) fn handle_output(&self, pane_id: &PaneId, bytes: &[u8]) {
        if contains(bytes, ALTERNATE_SCREEN_ENTER) {
            self.alternate_on.lock().expect("alternate-screen map mutex poisoned").insert(pane_id.clone(), true);
        }
        if contains(bytes, ALTERNATE_SCREEN_EXIT) {
            self.alternate_on.lock().expect("alternate-screen map mutex poisoned").insert(pane_id.clone(), false);
        }
        let mut panes = self.panes.lock().expect("pane registry mutex poisoned");
        if let Some(view) = panes.get_mut(pane_id) {
            view.write(bytes);
        }
    }

    pub fn is_alternate_screen(&self, pane_id: &PaneId) -> bool {
        self.alternate_on
            .lock()
            .expect("alternate-screen map mutex poisoned")
            .get(pane_id)
            .copied()
            .unwrap_or(false)
    }
}

fn sibling_pane_id(parent: &LayoutNode, index: usize) -> Option<PaneId> {
    let children = match parent {
        LayoutNode::Horizontal { children, .. } | LayoutNode::Vertical { children, .. } => children,
        LayoutNode::Pane { .. } => return None,
    };
    match children.get(index)? {
        LayoutNode::Pane { pane_id, .. } => Some(pane_id.clone()),
        _ => None,
    }
}

fn is_attach_not_found(body_lines: &[String]) -> bool {
    body_lines
        .iter()
        .any(|line| ATTACH_NOT_FOUND_MARKERS.iter().any(|marker| line.contains(marker)))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::CommandResult;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    struct NullLayoutHost {
        calls: Arc<Mutex<Vec<(String, bool, String, bool)>>>,
    }
    impl LayoutHost for NullLayoutHost {
        fn split_axis(&mut self, existing_pane_id: &str, vertical: bool, sibling_pane_id: &str, widget_first: bool) {
            self.calls.lock().unwrap().push((
                existing_pane_id.to_string(),
                vertical,
                sibling_pane_id.to_string(),
                widget_first,
            ));
        }
    }

    struct NullIdleQueue;
    impl IdleQueue for NullIdleQueue {
        fn post(&self, mut task: Box<dyn FnMut() -> bool + Send>) {
            task();
        }
    }

    struct FakeView {
        pane_id: String,
        closed: Arc<AtomicBool>,
        written: Vec<u8>,
    }
    impl TerminalView for FakeView {
        fn write(&mut self, bytes: &[u8]) {
            self.written.extend_from_slice(bytes);
        }
        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
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

    fn dispatcher_with(calls: Arc<Mutex<Vec<(String, bool, String, bool)>>>) -> (Dispatcher, mpsc::Receiver<DriverStatus>) {
        let (status_tx, status_rx) = mpsc::channel();
        let dispatcher = Dispatcher::new(
            Arc::new(CommandPipeline::new()),
            Box::new(NullLayoutHost { calls }),
            Arc::new(NullIdleQueue),
            status_tx,
        );
        (dispatcher, status_rx)
    }

    #[test]
    fn result_pops_fifo_callback() {
        let pipeline = CommandPipeline::new();
        let line_source = crate::cc::line_source::LineSource::spawn("cat", &[]).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        pipeline.enqueue(
            &line_source,
            "noop",
            Some(Box::new(move |r: &CommandResult| seen2.lock().unwrap().push(r.code.clone()))),
        );

        let (status_tx, _status_rx) = mpsc::channel();
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline),
            Box::new(NullLayoutHost { calls: Arc::new(Mutex::new(Vec::new())) }),
            Arc::new(NullIdleQueue),
            status_tx,
        );

        // The startup sentinel consumes the first callback slot and produces
        // no observable effect.
        let welcome = CommandResult {
            begin_timestamp: "0".to_string(),
            code: "0".to_string(),
            body: Vec::new(),
            end_timestamp: "0".to_string(),
            error: false,
        };
        assert!(!dispatcher.dispatch_one(&Notification::Result(welcome)));

        let result = CommandResult {
            begin_timestamp: "1".to_string(),
            code: "42".to_string(),
            body: Vec::new(),
            end_timestamp: "1".to_string(),
            error: false,
        };
        assert!(!dispatcher.dispatch_one(&Notification::Result(result)));
        assert_eq!(*seen.lock().unwrap(), vec!["42".to_string()]);
    }

    #[test]
    fn s3_split_detection_calls_split_axis_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (dispatcher, _status) = dispatcher_with(Arc::clone(&calls));
        dispatcher.add_terminal(
            PaneId::new("%2"),
            Box::new(FakeView { pane_id: "%2".to_string(), closed: Arc::new(AtomicBool::new(false)), written: Vec::new() }),
        );

        dispatcher.handle_layout_change(&WindowId::new("@0"), "0000,80x24,0,0[40x24,0,0,1,39x24,41,0,2]");
        dispatcher.handle_layout_change(
            &WindowId::new("@0"),
            "0000,80x24,0,0[40x24,0,0,1,39x24,41,0{19x24,41,0,2,19x24,61,0,7}]",
        );

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("%2".to_string(), false, "%7".to_string(), true));
    }

    #[test]
    fn s4_close_detection_removes_view_without_split() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (dispatcher, _status) = dispatcher_with(Arc::clone(&calls));
        dispatcher.add_terminal(
            PaneId::new("%2"),
            Box::new(FakeView { pane_id: "%2".to_string(), closed: Arc::new(AtomicBool::new(false)), written: Vec::new() }),
        );

        dispatcher.handle_layout_change(&WindowId::new("@0"), "0000,80x24,0,0[40x24,0,0,1,39x24,41,0,2]");
        dispatcher.handle_layout_change(&WindowId::new("@0"), "0000,80x24,0,0,1");

        assert!(calls.lock().unwrap().is_empty());
        assert!(!dispatcher.panes.lock().unwrap().contains_key(&PaneId::new("%2")));
    }

    #[test]
    fn s5_mousewheel_alternate_screen_tracking() {
        let (dispatcher, _status) = dispatcher_with(Arc::new(Mutex::new(Vec::new())));
        assert!(!dispatcher.is_alternate_screen(&PaneId::new("%3")));
        dispatcher.handle_output(&PaneId::new("%3"), ALTERNATE_SCREEN_ENTER);
        assert!(dispatcher.is_alternate_screen(&PaneId::new("%3")));
        dispatcher.handle_output(&PaneId::new("%3"), ALTERNATE_SCREEN_EXIT);
        assert!(!dispatcher.is_alternate_screen(&PaneId::new("%3")));
    }

    #[test]
    fn s6_attach_failure_resets_layouts_and_sets_reinit() {
        let (dispatcher, status_rx) = dispatcher_with(Arc::new(Mutex::new(Vec::new())));
        dispatcher.set_cached_layout(WindowId::new("@0"), model::from_parse_node(&grammar::parse("0000,80x24,0,0,1").unwrap()[0]));

        let stop = dispatcher.dispatch_one(&Notification::Result(CommandResult {
            begin_timestamp: "1".to_string(),
            code: "1".to_string(),
            body: vec![b"can't find session terminator".to_vec()],
            end_timestamp: "1".to_string(),
            error: true,
        }));

        assert!(!stop);
        assert!(dispatcher.needs_reinit());
        assert!(dispatcher.cached_layout(&WindowId::new("@0")).is_none());
        assert_eq!(status_rx.try_recv().unwrap(), DriverStatus::AttachFailed);
    }

    #[test]
    fn seed_initial_layout_caches_trees_and_publishes_ui_layout() {
        let (dispatcher, status_rx) = dispatcher_with(Arc::new(Mutex::new(Vec::new())));

        dispatcher.seed_initial_layout(&["@0 0000,80x24,0,0,1".to_string(), "@1 0000,80x24,0,0,2".to_string()]);

        assert!(dispatcher.cached_layout(&WindowId::new("@0")).is_some());
        assert!(dispatcher.cached_layout(&WindowId::new("@1")).is_some());
        match status_rx.try_recv().unwrap() {
            DriverStatus::InitialLayout(ui) => {
                assert!(matches!(ui.get("window0"), Some(UiNode::Window { .. })));
                assert!(ui.contains_key("terminal1"));
                assert!(ui.contains_key("terminal2"));
            }
            other => panic!("expected InitialLayout, got {other:?}"),
        }
    }

    #[test]
    fn seed_initial_layout_with_no_windows_publishes_nothing() {
        let (dispatcher, status_rx) = dispatcher_with(Arc::new(Mutex::new(Vec::new())));
        dispatcher.seed_initial_layout(&[]);
        assert!(status_rx.try_recv().is_err());
    }

    #[test]
    fn exit_notification_stops_dispatch_loop() {
        let (dispatcher, status_rx) = dispatcher_with(Arc::new(Mutex::new(Vec::new())));
        let stop = dispatcher.dispatch_one(&Notification::Exit { reason: Some("server exited".to_string()) });
        assert!(stop);
        assert_eq!(status_rx.try_recv().unwrap(), DriverStatus::Exited { reason: Some("server exited".to_string()) });
    }
}
