//! Typed errors for the one component that benefits from matching on
//! failure kind (the layout grammar — see §4.C, §11). Everything else in
//! this crate returns `anyhow::Result`, matching the rest of the codebase.

use thiserror::Error;

/// A malformed tmux layout string (§4.C).
///
/// Parsing never leaves partial state: a `LayoutParseError` means the whole
/// `parse` call produced nothing, not a half-built tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutParseError {
    #[error("unexpected end of layout string")]
    UnexpectedEnd,

    #[error("expected '{expected}' at byte {at}, found {found:?}")]
    ExpectedChar {
        expected: char,
        at: usize,
        found: Option<char>,
    },

    #[error("expected one or more digits at byte {at}")]
    ExpectedDigits { at: usize },

    #[error("trailing input after a complete layout at byte {at}")]
    TrailingInput { at: usize },
}
