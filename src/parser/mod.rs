//! GCode line parser
//!
//! Turns one host line into the commands it contains, enforcing the
//! `N<line> ... *<checksum>` protocol and the G0-G3 modal group.

pub mod error;
pub mod framing;
pub mod lexer;

pub use error::ParseError;
pub use framing::{checksum, Frame};

use crate::gcode::GCode;
use lexer::{Next, Scanner};

/// Code and subcode of the remembered motion command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModalGroup {
    code: u16,
    subcode: u16,
}

/// Line parser holding the state that persists between lines
#[derive(Debug, Clone)]
pub struct GCodeProcessor {
    group1: Option<ModalGroup>,
    line_no: i64,
}

impl Default for GCodeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl GCodeProcessor {
    pub fn new() -> Self {
        Self {
            group1: None,
            line_no: -1,
        }
    }

    /// Last accepted line number, -1 before any
    pub fn line_number(&self) -> i64 {
        self.line_no
    }

    /// Line number the next numbered line must carry
    pub fn next_line_number(&self) -> i64 {
        self.line_no.saturating_add(1)
    }

    /// Code of the remembered G0-G3 command, if one was seen
    pub fn group1_modal_code(&self) -> Option<u16> {
        self.group1.map(|g| g.code)
    }

    /// Parse one line, appending its commands to `out`
    ///
    /// On a transport error nothing is appended. On a syntax error the
    /// command being built is appended with the error attached and the
    /// rest of the line is ignored; callers should only report it.
    pub fn parse(&mut self, line: &str, out: &mut Vec<GCode>) -> Result<(), ParseError> {
        let frame = Frame::split(line);
        let expected = self.next_line_number();

        if frame.is_set_line_number() {
            let ln = frame
                .line_number
                .ok_or(ParseError::LineNumberRange { expected })?;
            log::debug!("line number set to {}", ln);
            self.line_no = ln;
            return Ok(());
        }

        if !frame.checksum_ok() {
            return Err(ParseError::Checksum {
                line: frame.line_number.unwrap_or(expected),
                computed: frame.computed,
                received: frame.received,
            });
        }
        let ln = if frame.numbered {
            frame
                .line_number
                .ok_or(ParseError::LineNumberRange { expected })?
        } else {
            expected
        };
        if ln != expected {
            return Err(ParseError::LineNumber {
                expected,
                received: ln,
            });
        }
        self.line_no = ln;

        log::trace!("parsing line {}: {}", ln, frame.body);
        let mut gc = GCode::new();
        match self.scan(frame.body, &mut gc, out) {
            Ok(()) => {
                out.push(gc);
                Ok(())
            }
            Err(e) => {
                gc.set_error(e.command_message());
                out.push(gc);
                Err(e)
            }
        }
    }

    fn scan(&mut self, body: &str, gc: &mut GCode, out: &mut Vec<GCode>) -> Result<(), ParseError> {
        let mut scanner = Scanner::new(body);
        let mut start = true;

        loop {
            let letter = match scanner.next_letter() {
                Next::End => return Ok(()),
                Next::Illegal => return Err(ParseError::IllegalWord),
                Next::Letter(c) => c,
            };

            // another command word on the same line ends the current command
            if matches!(letter, 'G' | 'M') && !start {
                out.push(std::mem::take(gc));
                start = true;
            }

            if start {
                start = false;
                match letter {
                    'G' | 'M' => {
                        let (code, subcode) = scanner.code().ok_or(ParseError::IllegalCommandWord)?;
                        gc.set_command(letter, code, subcode);
                        if letter == 'G' && code <= 3 {
                            self.group1 = Some(ModalGroup { code, subcode });
                        }
                        continue;
                    }
                    'T' => {
                        let (tool, _) = scanner.code().ok_or(ParseError::IllegalCommandWord)?;
                        gc.set_command('M', 6, 0).add_arg('T', f32::from(tool));
                        gc.mark_tool_change();
                        continue;
                    }
                    _ => {
                        let modal = self.group1.ok_or(ParseError::NoModalCommand)?;
                        gc.set_command('G', modal.code, modal.subcode);
                    }
                }
            }

            let value = scanner.number().ok_or(ParseError::IllegalParameterWord)?;
            gc.add_arg(letter, value);
        }
    }
}
