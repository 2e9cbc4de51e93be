//! GCode Dispatch
//!
//! The command-protocol core of a motion controller: host lines in,
//! handler calls and protocol replies out.
//!
//! This library provides:
//! - Line parsing with the `N<line> ... *<checksum>` protocol
//! - Fan-out dispatch of G/M codes and text commands
//! - Halt/alarm gating and `ok`/error response framing
//! - A line front end tying them together, with `M28`/`M29` uploads

pub mod config;
pub mod console;
pub mod dispatch;
pub mod gcode;
pub mod halt;
pub mod output;
pub mod parser;
pub mod storage;

// Re-exports for clean public API
pub use config::Config;
pub use console::Console;
pub use dispatch::{Dispatcher, HandlerId, HandlerKind};
pub use gcode::{CommandClass, GCode};
pub use halt::{HaltFlag, HaltState};
pub use output::OutputStream;
pub use parser::{GCodeProcessor, ParseError};
pub use storage::SdCard;
