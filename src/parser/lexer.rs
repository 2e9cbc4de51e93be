//! Byte scanner for the word grammar.
//!
//! Works directly on the line's bytes without allocating.

/// What the scanner found at the next non-blank position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// An upper-cased word letter
    Letter(char),
    /// A byte that cannot start a word
    Illegal,
    /// End of line or start of a `;` comment
    End,
}

pub struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    /// Skip blanks and comments, then consume the next word letter
    pub fn next_letter(&mut self) -> Next {
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b if b.is_ascii_whitespace() => self.pos += 1,
                b';' => {
                    self.pos = self.bytes.len();
                    return Next::End;
                }
                b'(' => self.skip_paren_comment(),
                b if b.is_ascii_alphabetic() => {
                    self.pos += 1;
                    return Next::Letter(b.to_ascii_uppercase() as char);
                }
                _ => return Next::Illegal,
            }
        }
        Next::End
    }

    fn skip_paren_comment(&mut self) {
        match self.bytes[self.pos..].iter().position(|&b| b == b')') {
            Some(close) => self.pos += close + 1,
            None => self.pos = self.bytes.len(),
        }
    }

    /// Command number `digits[.digits]`, as (code, subcode)
    ///
    /// Returns `None`, consuming nothing, unless at least one digit follows.
    pub fn code(&mut self) -> Option<(u16, u16)> {
        let start = self.pos;
        let code = self.integer()?;
        let subcode = if self.peek() == Some(b'.') {
            self.pos += 1;
            if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.integer()
            } else {
                Some(0)
            }
        } else {
            Some(0)
        };
        match subcode {
            Some(subcode) => Some((code, subcode)),
            None => {
                self.pos = start;
                None
            }
        }
    }

    fn integer(&mut self) -> Option<u16> {
        let start = self.pos;
        let mut value: u16 = 0;
        while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
            value = value.checked_mul(10)?.checked_add(u16::from(b - b'0'))?;
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    /// Parameter value `[-+]?[0-9.]+`
    pub fn number(&mut self) -> Option<f32> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'.') {
            self.pos += 1;
        }
        if self.pos == digits_start {
            self.pos = start;
            return None;
        }
        // the slice is ASCII by construction
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        text.parse().ok()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }
}
