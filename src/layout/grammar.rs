//! Component C — Layout Grammar (§4.C).
//!
//! A hand-rolled recursive-descent parser for tmux's layout string grammar:
//!
//! ```text
//! layout     = checksum "," element ("," element)*
//! checksum   = 4 hex digits
//! element    = container | pane
//! container  = preamble ("{" | "[") element ("," element)* ("}" | "]")
//! pane       = preamble "," decimal
//! preamble   = decimal "x" decimal "," decimal "," decimal
//! ```
//!
//! The teacher's example pack has no nested-grammar precedent, so this
//! module is grounded directly on the Python `pyparsing` grammar in
//! `original_source/terminatorlib/tmux/layout.py::LayoutParser` — reimplemented
//! as a plain byte-position scanner rather than pulling in a parser-combinator
//! dependency the rest of the crate has no other use for.

use crate::error::LayoutParseError;

/// The parse tree before it is lowered to [`crate::layout::model::LayoutNode`]
/// (§4.C: "Decoder output is the nested parse tree of the top-level `element`
/// sequence").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseNode {
    Pane {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        pane_id: u32,
    },
    Horizontal {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        children: Vec<ParseNode>,
    },
    Vertical {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        children: Vec<ParseNode>,
    },
}

/// Parse a full layout string (checksum plus one or more top-level elements).
///
/// Fails atomically: on error nothing is returned but an owned
/// [`LayoutParseError`], never a partially built tree (§4.C, §7, §11).
pub fn parse(input: &str) -> Result<Vec<ParseNode>, LayoutParseError> {
    let bytes = input.as_bytes();
    let mut cursor = Cursor { bytes, pos: 0 };

    cursor.expect_hex_digits(4)?;
    cursor.expect_char(',')?;

    let mut elements = vec![cursor.parse_element()?];
    while cursor.peek() == Some(b',') {
        cursor.pos += 1;
        elements.push(cursor.parse_element()?);
    }

    if cursor.pos != cursor.bytes.len() {
        return Err(LayoutParseError::TrailingInput { at: cursor.pos });
    }

    Ok(elements)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect_char(&mut self, expected: char) -> Result<(), LayoutParseError> {
        match self.peek() {
            Some(b) if b == expected as u8 => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(LayoutParseError::ExpectedChar {
                expected,
                at: self.pos,
                found: Some(b as char),
            }),
            None => Err(LayoutParseError::UnexpectedEnd),
        }
    }

    fn expect_hex_digits(&mut self, count: usize) -> Result<&'a str, LayoutParseError> {
        let start = self.pos;
        let mut taken = 0;
        while taken < count {
            match self.peek() {
                Some(b) if b.is_ascii_hexdigit() => {
                    self.pos += 1;
                    taken += 1;
                }
                Some(b) => {
                    return Err(LayoutParseError::ExpectedChar {
                        expected: 'x',
                        at: self.pos,
                        found: Some(b as char),
                    })
                }
                None => return Err(LayoutParseError::UnexpectedEnd),
            }
        }
        Ok(std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or_default())
    }

    fn parse_decimal(&mut self) -> Result<u32, LayoutParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(LayoutParseError::ExpectedDigits { at: start });
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or_default();
        text.parse()
            .map_err(|_| LayoutParseError::ExpectedDigits { at: start })
    }

    /// `preamble = decimal "x" decimal "," decimal "," decimal`
    fn parse_preamble(&mut self) -> Result<(u32, u32, u32, u32), LayoutParseError> {
        let width = self.parse_decimal()?;
        self.expect_char('x')?;
        let height = self.parse_decimal()?;
        self.expect_char(',')?;
        let x = self.parse_decimal()?;
        self.expect_char(',')?;
        let y = self.parse_decimal()?;
        Ok((width, height, x, y))
    }

    /// `element = container | pane`
    fn parse_element(&mut self) -> Result<ParseNode, LayoutParseError> {
        let (width, height, x, y) = self.parse_preamble()?;

        match self.peek() {
            Some(b'{') | Some(b'[') => {
                let vertical = self.peek() == Some(b'[');
                self.pos += 1;
                let mut children = vec![self.parse_element()?];
                while self.peek() == Some(b',') {
                    self.pos += 1;
                    children.push(self.parse_element()?);
                }
                if vertical {
                    self.expect_char(']')?;
                    Ok(ParseNode::Vertical { width, height, x, y, children })
                } else {
                    self.expect_char('}')?;
                    Ok(ParseNode::Horizontal { width, height, x, y, children })
                }
            }
            Some(b',') => {
                self.pos += 1;
                let pane_id = self.parse_decimal()?;
                Ok(ParseNode::Pane { width, height, x, y, pane_id })
            }
            Some(b) => Err(LayoutParseError::ExpectedChar {
                expected: '{',
                at: self.pos,
                found: Some(b as char),
            }),
            None => Err(LayoutParseError::UnexpectedEnd),
        }
    }
}
