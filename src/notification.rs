//! The notification data model (§3) — one tagged variant per control-mode
//! marker, plus the collapsed `%begin/%end|%error` block (`CommandResult`).
//!
//! Attributes are decoded into owned, typed fields by [`crate::cc::decoder`];
//! this module only defines the shapes. `Output` bytes and `CommandResult`
//! body lines are kept as raw bytes — no escape-sequence interpretation
//! happens at this layer (§4.B).

use crate::ids::{PaneId, WindowId};

/// A collapsed `%begin … %end|%error` block (§3 Result).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub begin_timestamp: String,
    pub code: String,
    /// Raw body lines, newline excluded, escape sequences undecoded.
    pub body: Vec<Vec<u8>>,
    pub end_timestamp: String,
    pub error: bool,
}

impl CommandResult {
    /// Body lines decoded as UTF-8 (lossily) — a convenience for callers
    /// that don't need to deal with raw bytes.
    pub fn body_lines_lossy(&self) -> Vec<String> {
        self.body
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }
}

/// One parsed control-mode line (§3 Notification).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A collapsed command-result block.
    Result(CommandResult),
    /// The server (or the child itself) exited.
    Exit { reason: Option<String> },
    /// A window's layout changed — the window_layout string still needs
    /// parsing by [`crate::layout::grammar`] before it is usable.
    LayoutChange {
        window_id: WindowId,
        window_layout: String,
        window_visible_layout: Option<String>,
        window_flags: Option<String>,
    },
    /// Raw output bytes for a pane.
    Output { pane_id: PaneId, bytes: Vec<u8> },
    SessionChanged {
        session_id: String,
        session_name: String,
    },
    SessionRenamed {
        session_id: String,
        session_name: String,
    },
    SessionsChanged,
    WindowAdd {
        window_id: WindowId,
    },
    WindowClose {
        window_id: WindowId,
    },
    WindowRenamed {
        window_id: WindowId,
        window_name: String,
    },
    UnlinkedWindowAdd {
        window_id: WindowId,
    },
    UnlinkedWindowClose {
        window_id: WindowId,
    },
    UnlinkedWindowRenamed {
        window_id: WindowId,
        window_name: String,
    },
    /// A recognized `%marker` line with no decoder registered, or a line
    /// that failed attribute parsing. Silently dropped by the dispatcher.
    Unknown { marker: String },
}

impl Notification {
    /// The marker string this notification was decoded from, used as the
    /// key into the dispatcher's handler registry (§4.F).
    pub fn marker(&self) -> &str {
        match self {
            Self::Result(_) => "begin",
            Self::Exit { .. } => "exit",
            Self::LayoutChange { .. } => "layout-change",
            Self::Output { .. } => "output",
            Self::SessionChanged { .. } => "session-changed",
            Self::SessionRenamed { .. } => "session-renamed",
            Self::SessionsChanged => "sessions-changed",
            Self::WindowAdd { .. } => "window-add",
            Self::WindowClose { .. } => "window-close",
            Self::WindowRenamed { .. } => "window-renamed",
            Self::UnlinkedWindowAdd { .. } => "unlinked-window-add",
            Self::UnlinkedWindowClose { .. } => "unlinked-window-close",
            Self::UnlinkedWindowRenamed { .. } => "unlinked-window-renamed",
            Self::Unknown { marker } => marker,
        }
    }
}
