//! The parsed command value object.
//!
//! A [`GCode`] is one command word (`G1`, `M104`, ...) with its arguments.
//! The parser builds it incrementally while scanning a line; handlers read
//! it and may attach an error to it.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::output::OutputStream;

/// Argument map, iterated in letter order
pub type Args = BTreeMap<char, f32>;

/// The command class of a [`GCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    G,
    M,
}

impl CommandClass {
    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'G' => Some(CommandClass::G),
            'M' => Some(CommandClass::M),
            _ => None,
        }
    }

    fn letter(self) -> char {
        match self {
            CommandClass::G => 'G',
            CommandClass::M => 'M',
        }
    }
}

/// One parsed command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GCode {
    class: Option<CommandClass>,
    code: u16,
    subcode: u16,
    tool_change: bool,
    args: Args,
    // one bit per letter, bit 0 is 'A'
    arg_bits: u32,
    error: Option<Cow<'static, str>>,
}

impl GCode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a command from a letter/value list
    ///
    /// This is the typed replacement for a C-style variadic
    /// `('X', 1.0, 'Y', 2.0, 0)` argument list.
    pub fn with_args(letter: char, code: u16, subcode: u16, args: &[(char, f32)]) -> Self {
        let mut gc = Self::new();
        gc.set_command(letter, code, subcode);
        for &(c, v) in args {
            gc.add_arg(c, v);
        }
        gc
    }

    /// Reset to the empty state, keeping the allocation of the argument map
    pub fn clear(&mut self) {
        self.class = None;
        self.code = 0;
        self.subcode = 0;
        self.tool_change = false;
        self.args.clear();
        self.arg_bits = 0;
        self.error = None;
    }

    /// Set the command class and code, dropping any previous args and error
    ///
    /// `letter` other than `G` or `M` leaves the command without a class.
    pub fn set_command(&mut self, letter: char, code: u16, subcode: u16) -> &mut Self {
        self.args.clear();
        self.arg_bits = 0;
        self.error = None;
        self.tool_change = false;
        self.class = CommandClass::from_letter(letter);
        self.code = code;
        self.subcode = subcode;
        self
    }

    /// Insert or overwrite an argument
    pub fn add_arg(&mut self, letter: char, value: f32) -> &mut Self {
        let letter = letter.to_ascii_uppercase();
        debug_assert!(letter.is_ascii_uppercase(), "argument letter {letter:?}");
        if let Some(bit) = letter_bit(letter) {
            self.args.insert(letter, value);
            self.arg_bits |= bit;
        }
        self
    }

    pub(crate) fn mark_tool_change(&mut self) {
        self.tool_change = true;
    }

    pub fn has_arg(&self, letter: char) -> bool {
        letter_bit(letter.to_ascii_uppercase()).is_some_and(|bit| self.arg_bits & bit != 0)
    }

    pub fn has_no_args(&self) -> bool {
        self.arg_bits == 0
    }

    pub fn arg(&self, letter: char) -> Option<f32> {
        if !self.has_arg(letter) {
            return None;
        }
        self.args.get(&letter.to_ascii_uppercase()).copied()
    }

    /// Value of an argument
    ///
    /// # Panics
    ///
    /// Panics if the argument is absent. Check with [`GCode::has_arg`] first,
    /// or use [`GCode::arg`].
    pub fn get_arg(&self, letter: char) -> f32 {
        match self.arg(letter) {
            Some(value) => value,
            None => panic!("missing argument {letter} on {self}"),
        }
    }

    /// Value of an argument truncated toward zero
    ///
    /// # Panics
    ///
    /// Same precondition as [`GCode::get_arg`].
    pub fn get_int_arg(&self, letter: char) -> i32 {
        self.get_arg(letter) as i32
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    pub fn class(&self) -> Option<CommandClass> {
        self.class
    }

    pub fn has_g(&self) -> bool {
        self.class == Some(CommandClass::G)
    }

    pub fn has_m(&self) -> bool {
        self.class == Some(CommandClass::M)
    }

    /// True when this M6 was produced from a `T<n>` word
    pub fn is_tool_change(&self) -> bool {
        self.tool_change
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn subcode(&self) -> u16 {
        self.subcode
    }

    pub fn set_error(&mut self, message: impl Into<Cow<'static, str>>) {
        self.error = Some(message.into());
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Write the diagnostic form, e.g. `G32.2 X:1.20000 Y:2.30000 `
    pub fn dump(&self, os: &mut OutputStream) -> usize {
        let mut n = os.printf(format_args!("{}{}", self.class_prefix(), self.code));
        if self.subcode != 0 {
            n += os.printf(format_args!(".{}", self.subcode));
        }
        n += os.puts(" ");
        for (letter, value) in &self.args {
            n += os.printf(format_args!("{letter}:{value:.5} "));
        }
        n + os.puts("\n")
    }

    fn class_prefix(&self) -> &'static str {
        match self.class {
            Some(CommandClass::G) => "G",
            Some(CommandClass::M) => "M",
            None => "",
        }
    }
}

/// Canonical G-code text, e.g. `G1 X10 Y-2.5`
impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class) = self.class {
            write!(f, "{}{}", class.letter(), self.code)?;
            if self.subcode != 0 {
                write!(f, ".{}", self.subcode)?;
            }
        }
        let mut first = self.class.is_none();
        for (letter, value) in &self.args {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{letter}{value}")?;
        }
        Ok(())
    }
}

fn letter_bit(letter: char) -> Option<u32> {
    letter
        .is_ascii_uppercase()
        .then(|| 1u32 << (letter as u32 - 'A' as u32))
}
