//! Parse failures.

/// Why a line was rejected
///
/// Transport errors (`Checksum`, `LineNumber`, `LineNumberRange`) reject the whole line and
/// produce no commands. The remaining variants are syntax errors; their
/// message is also attached to the command that was being built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("checksum mismatch on line {line}: computed {computed}, received {received}")]
    Checksum {
        line: i64,
        computed: u8,
        received: u32,
    },

    #[error("line number out of sequence: expected {expected}, received {received}")]
    LineNumber { expected: i64, received: i64 },

    #[error("line number out of range, expected {expected}")]
    LineNumberRange { expected: i64 },

    #[error("Illegal word")]
    IllegalWord,

    #[error("Illegal command word")]
    IllegalCommandWord,

    #[error("Illegal parameter word")]
    IllegalParameterWord,

    #[error("No modal command set")]
    NoModalCommand,
}

impl ParseError {
    /// True for failures the host should answer with a resend
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ParseError::Checksum { .. }
                | ParseError::LineNumber { .. }
                | ParseError::LineNumberRange { .. }
        )
    }

    /// Message attached to the command for syntax errors
    pub(crate) fn command_message(&self) -> &'static str {
        match self {
            ParseError::IllegalWord => "Illegal word",
            ParseError::IllegalCommandWord => "Illegal command word",
            ParseError::IllegalParameterWord => "Illegal parameter word",
            ParseError::NoModalCommand => "No modal command set",
            ParseError::Checksum { .. } => "checksum mismatch",
            ParseError::LineNumber { .. } => "line number out of sequence",
            ParseError::LineNumberRange { .. } => "line number out of range",
        }
    }
}
