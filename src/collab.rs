//! External collaborator interfaces (§6) and normalized input events.
//!
//! This crate does not render anything or own a widget tree; it calls out to
//! a host application through these traits, exactly as the driver calls back
//! into the UI via collaborator objects in `original_source/terminatorlib/tmux/control.py`.

/// A pane's rendering surface, owned by the host application.
///
/// Required methods: `write`, `close`, `cwd`, `pane_id` (settable), and a
/// way back up to the layout host that contains it (§6).
pub trait TerminalView: Send {
    /// Forward raw output bytes for this pane to the view.
    fn write(&mut self, bytes: &[u8]);

    /// The view has been closed and should tear itself down.
    fn close(&mut self);

    /// Working directory inherited by panes split off from this view.
    fn cwd(&self) -> Option<&str>;

    fn pane_id(&self) -> &str;

    fn set_pane_id(&mut self, pane_id: &str);
}

/// The widget-tree manipulator the Dispatcher calls into when a layout-change
/// reveals a new pane (§6, §4.F).
pub trait LayoutHost {
    /// Replace `existing_pane_id`'s view in its parent with a paned
    /// container holding both `existing_pane_id` and `sibling_pane_id`.
    /// `widget_first` places `existing_pane_id` first in the new container.
    fn split_axis(&mut self, existing_pane_id: &str, vertical: bool, sibling_pane_id: &str, widget_first: bool);
}

/// Schedules work onto the UI thread without blocking the caller (§6, §5 —
/// "handlers MUST delegate UI work to the UI collaborator's idle queue").
pub trait IdleQueue {
    /// Schedule `task` to run on the UI thread. `task` returns `true` to be
    /// rescheduled, `false` to run once.
    fn post(&self, task: Box<dyn FnMut() -> bool + Send>);
}

bitflags::bitflags! {
    /// Modifier bits carried by a [`KeyEvent`] (§6: "at least Ctrl, Shift, Alt").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Modifiers: u8 {
        const CTRL  = 0b001;
        const SHIFT = 0b010;
        const ALT   = 0b100;
    }
}

/// A symbolic, non-printable key recognized by the key-mapping table (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySym {
    Backspace,
    Tab,
    Insert,
    Delete,
    PageUp,
    PageDown,
    Home,
    End,
    Up,
    Down,
    Right,
    Left,
    /// Any other key; `KeyEvent::text` carries its printable representation.
    Other,
}

/// A normalized key event, decoupled from any specific input backend (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub keysym: KeySym,
    pub modifiers: Modifiers,
    /// Verbatim text for printable keys; empty for pure control keys.
    pub text: String,
}

/// Scroll direction, including the smooth/precision variant crossterm has no
/// native equivalent for (§6: "direction ∈ {Up, Down, Smooth}").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollEvent {
    Up,
    Down,
    Smooth { delta_y: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_combine_as_bitflags() {
        let both = Modifiers::CTRL | Modifiers::ALT;
        assert!(both.contains(Modifiers::CTRL));
        assert!(both.contains(Modifiers::ALT));
        assert!(!both.contains(Modifiers::SHIFT));
    }
}
