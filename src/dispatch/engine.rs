//! Dispatch Engine
//!
//! Routes parsed commands to their handlers, gates execution on the halted
//! state and frames the `ok` / error response.

use std::sync::Arc;

use super::registry::{HandlerId, HandlerRegistry};
use crate::gcode::{CommandClass, GCode};
use crate::halt::{HaltFlag, HaltState};
use crate::output::OutputStream;

/// M-codes that may run while halted: status queries and safe switches
pub const ALLOWED_WHEN_HALTED: [u16; 13] = [2, 5, 9, 30, 80, 81, 105, 106, 107, 114, 119, 503, 911];

/// Clears the halted state
pub const UNLOCK_MCODE: u16 = 999;

/// Handler for G and M codes; returns whether it processed the command
pub type Handler = Box<dyn Fn(&mut GCode, &mut OutputStream) -> bool + Send + Sync>;

/// Handler for a named text command; gets the text after the name
pub type CommandHandler = Box<dyn Fn(&mut String, &mut OutputStream) -> bool + Send + Sync>;

/// Which numeric registry a handler belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    GCode,
    MCode,
}

pub struct Dispatcher {
    gcode_handlers: HandlerRegistry<u16, Handler>,
    mcode_handlers: HandlerRegistry<u16, Handler>,
    command_handlers: HandlerRegistry<String, CommandHandler>,
    halt: Arc<dyn HaltState>,
    grbl_mode: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(HaltFlag::new()))
    }
}

impl Dispatcher {
    pub fn new(halt: Arc<dyn HaltState>) -> Self {
        Self {
            gcode_handlers: HandlerRegistry::new(),
            mcode_handlers: HandlerRegistry::new(),
            command_handlers: HandlerRegistry::new(),
            halt,
            grbl_mode: false,
        }
    }

    /// Shared halted state this dispatcher consults
    pub fn halt_state(&self) -> &Arc<dyn HaltState> {
        &self.halt
    }

    pub fn is_grbl_mode(&self) -> bool {
        self.grbl_mode
    }

    pub fn set_grbl_mode(&mut self, flag: bool) {
        self.grbl_mode = flag;
    }

    /// Register a handler for one G or M code
    ///
    /// Existing handlers for the same code are kept; all of them run.
    pub fn add_handler(
        &mut self,
        kind: HandlerKind,
        code: u16,
        handler: impl Fn(&mut GCode, &mut OutputStream) -> bool + Send + Sync + 'static,
    ) -> HandlerId {
        self.registry_mut(kind).insert(code, Box::new(handler))
    }

    /// Register a handler for a named text command
    pub fn add_command_handler(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&mut String, &mut OutputStream) -> bool + Send + Sync + 'static,
    ) -> HandlerId {
        self.command_handlers.insert(name.into(), Box::new(handler))
    }

    pub fn remove_handler(&mut self, kind: HandlerKind, id: HandlerId) -> bool {
        self.registry_mut(kind).remove(id)
    }

    pub fn remove_command_handler(&mut self, id: HandlerId) -> bool {
        self.command_handlers.remove(id)
    }

    pub fn clear_handlers(&mut self) {
        self.gcode_handlers.clear();
        self.mcode_handlers.clear();
        self.command_handlers.clear();
    }

    /// Registered text command names, sorted
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.command_handlers.keys().map(String::as_str)
    }

    fn registry_mut(&mut self, kind: HandlerKind) -> &mut HandlerRegistry<u16, Handler> {
        match kind {
            HandlerKind::GCode => &mut self.gcode_handlers,
            HandlerKind::MCode => &mut self.mcode_handlers,
        }
    }

    /// Dispatch a command and send `ok` on success
    pub fn dispatch(&self, gc: &mut GCode, os: &mut OutputStream) -> bool {
        self.dispatch_with_ok(gc, os, true)
    }

    /// Dispatch a command
    ///
    /// Returns false when no handler claimed the command; nothing is
    /// written in that case. `need_ok` controls the trailing `ok\n` of a
    /// successful command, so a line with several commands gets one `ok`.
    /// Must be called from the command thread.
    pub fn dispatch_with_ok(&self, gc: &mut GCode, os: &mut OutputStream, need_ok: bool) -> bool {
        os.reset_flags();

        if self.halt.is_halted() {
            if gc.has_m() && gc.code() == UNLOCK_MCODE {
                self.halt.broadcast_halt(false);
                os.puts("WARNING: After HALT you should HOME as position is currently unknown\nok\n");
                return true;
            }

            if !gc.has_m() || !ALLOWED_WHEN_HALTED.contains(&gc.code()) {
                os.puts(if self.grbl_mode { "error:Alarm lock\n" } else { "!!\n" });
                return true;
            }
        }

        if gc.has_error() {
            log::debug!("not dispatching malformed command {}", gc);
            return false;
        }

        let registry = match gc.class() {
            Some(CommandClass::G) => &self.gcode_handlers,
            Some(CommandClass::M) => &self.mcode_handlers,
            None => return false,
        };

        let code = gc.code();
        let mut handled = false;
        for handler in registry.get(&code) {
            if handler(gc, os) {
                handled = true;
            } else {
                // many handlers only act when certain arguments are present
                log::debug!("handler did not handle {}", gc);
            }
        }

        if !handled {
            return false;
        }

        if gc.has_error() {
            os.puts(if self.grbl_mode { "error: " } else { "Error: " });
            let message = gc.error_message().unwrap_or("unknown");
            os.printf(format_args!("{message}\n"));
            // an error leaves the machine in an unknown state
            os.puts("Entering Alarm/Halt state\n");
            self.halt.broadcast_halt(true);
            return true;
        }

        self.finish_ok(os, need_ok);
        true
    }

    fn finish_ok(&self, os: &mut OutputStream, need_ok: bool) {
        let mut send_ok = need_ok;

        if os.is_prepend_ok() {
            if os.is_no_response() {
                os.release_prepend();
            } else {
                os.flush_prepend();
            }
            send_ok = false;
        }

        if os.is_append_nl() {
            os.set_append_nl(false);
            os.puts("\n");
        }

        if send_ok && !os.is_no_response() {
            os.puts("ok\n");
        }
    }

    /// Dispatch a one-off command built from a letter/value list
    ///
    /// `dispatcher.dispatch_one(os, 'G', 92, 0, &[('Z', 0.0)])` is `G92 Z0`.
    pub fn dispatch_one(
        &self,
        os: &mut OutputStream,
        letter: char,
        code: u16,
        subcode: u16,
        args: &[(char, f32)],
    ) -> bool {
        let mut gc = GCode::with_args(letter, code, subcode, args);
        self.dispatch(&mut gc, os)
    }

    /// Dispatch a text command line such as `version` or `ls /sd`
    ///
    /// Every handler registered under the first word gets the remainder of
    /// the line. No halt gating and no `ok` framing is done here.
    pub fn dispatch_command(&self, line: &str, os: &mut OutputStream) -> bool {
        let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
        let mut params = rest.to_string();
        let mut handled = false;
        for handler in self.command_handlers.get(name) {
            if handler(&mut params, os) {
                handled = true;
            } else {
                log::debug!("command handler did not handle {}", line);
            }
        }
        handled
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("gcode_handlers", &self.gcode_handlers.len())
            .field("mcode_handlers", &self.mcode_handlers.len())
            .field("command_handlers", &self.command_handlers.len())
            .field("halted", &self.halt.is_halted())
            .field("grbl_mode", &self.grbl_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn halted_dispatcher() -> Dispatcher {
        let dispatcher = Dispatcher::default();
        dispatcher.halt_state().broadcast_halt(true);
        dispatcher
    }

    #[test]
    fn unclaimed_command_writes_nothing() {
        let dispatcher = Dispatcher::default();
        let mut os = OutputStream::buffered();
        let mut gc = GCode::with_args('G', 4, 0, &[('S', 10.0)]);
        assert!(!dispatcher.dispatch(&mut gc, &mut os));
        assert_eq!(os.contents(), "");
    }

    #[test]
    fn need_ok_false_omits_ok() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_handler(HandlerKind::GCode, 1, |_, _| true);
        let mut os = OutputStream::buffered();
        let mut gc = GCode::with_args('G', 1, 0, &[]);
        assert!(dispatcher.dispatch_with_ok(&mut gc, &mut os, false));
        assert_eq!(os.contents(), "");
    }

    #[test]
    fn append_nl_adds_newline_before_ok() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_handler(HandlerKind::MCode, 115, |_, os| {
            os.puts("FIRMWARE_NAME:test");
            os.set_append_nl(true);
            true
        });
        let mut os = OutputStream::buffered();
        assert!(dispatcher.dispatch_one(&mut os, 'M', 115, 0, &[]));
        assert_eq!(os.contents(), "FIRMWARE_NAME:test\nok\n");
    }

    #[test]
    fn prepend_ok_puts_ok_first() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_handler(HandlerKind::MCode, 114, |_, os| {
            os.set_prepend_ok(true);
            os.puts("C: X:0.0000 Y:0.0000 Z:0.0000\n");
            true
        });
        let mut os = OutputStream::buffered();
        assert!(dispatcher.dispatch_one(&mut os, 'M', 114, 0, &[]));
        assert_eq!(os.contents(), "ok C: X:0.0000 Y:0.0000 Z:0.0000\n");
    }

    #[test]
    fn no_response_suppresses_ok() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_handler(HandlerKind::MCode, 503, |_, os| {
            os.puts("; settings\n");
            os.set_no_response(true);
            true
        });
        let mut os = OutputStream::buffered();
        assert!(dispatcher.dispatch_one(&mut os, 'M', 503, 0, &[]));
        assert_eq!(os.contents(), "; settings\n");
    }

    #[test]
    fn handler_error_with_empty_message_still_halts() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_handler(HandlerKind::GCode, 1, |gc, _| {
            gc.set_error("");
            true
        });
        let mut os = OutputStream::buffered();
        assert!(dispatcher.dispatch_one(&mut os, 'G', 1, 0, &[]));
        assert_eq!(os.contents(), "Error: \nEntering Alarm/Halt state\n");
        assert!(dispatcher.halt_state().is_halted());
    }

    #[test]
    fn grbl_mode_error_framing() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.set_grbl_mode(true);
        dispatcher.add_handler(HandlerKind::GCode, 1, |gc, _| {
            gc.set_error("out of range");
            true
        });
        let mut os = OutputStream::buffered();
        dispatcher.dispatch_one(&mut os, 'G', 1, 0, &[]);
        assert_eq!(os.contents(), "error: out of range\nEntering Alarm/Halt state\n");

        os.clear();
        dispatcher.dispatch_one(&mut os, 'G', 1, 0, &[]);
        assert_eq!(os.contents(), "error:Alarm lock\n");
    }

    #[test]
    fn halted_allows_listed_mcodes_only() {
        let mut dispatcher = halted_dispatcher();
        dispatcher.add_handler(HandlerKind::MCode, 105, |_, os| {
            os.puts("T:20.0\n");
            true
        });
        let mut os = OutputStream::buffered();

        assert!(dispatcher.dispatch_one(&mut os, 'M', 105, 0, &[]));
        assert_eq!(os.take_contents(), "T:20.0\nok\n");

        assert!(dispatcher.dispatch_one(&mut os, 'M', 104, 0, &[('S', 200.0)]));
        assert_eq!(os.take_contents(), "!!\n");

        assert!(dispatcher.dispatch_one(&mut os, 'G', 105, 0, &[]));
        assert_eq!(os.take_contents(), "!!\n");
    }

    #[test]
    fn m999_unlocks() {
        let dispatcher = halted_dispatcher();
        let mut os = OutputStream::buffered();
        assert!(dispatcher.dispatch_one(&mut os, 'M', 999, 0, &[]));
        assert_eq!(
            os.contents(),
            "WARNING: After HALT you should HOME as position is currently unknown\nok\n"
        );
        assert!(!dispatcher.halt_state().is_halted());
    }

    #[test]
    fn malformed_command_is_not_dispatched() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_handler(HandlerKind::GCode, 1, |_, _| panic!("must not run"));
        let mut gc = GCode::with_args('G', 1, 0, &[]);
        gc.set_error("Illegal parameter word");
        let mut os = OutputStream::buffered();
        assert!(!dispatcher.dispatch(&mut gc, &mut os));
        assert!(!dispatcher.halt_state().is_halted());
    }

    #[test]
    fn classless_command_is_not_dispatched() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_handler(HandlerKind::MCode, 0, |_, _| true);
        let mut os = OutputStream::buffered();
        assert!(!dispatcher.dispatch(&mut GCode::new(), &mut os));
    }

    #[test]
    fn text_commands_get_the_remainder() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_command_handler("echo", |params, os| {
            os.printf(format_args!("echo: {params}\n"));
            true
        });
        dispatcher.add_command_handler("echo", |params, _| {
            params.clear();
            false
        });
        let mut os = OutputStream::buffered();
        assert!(dispatcher.dispatch_command("echo hello world", &mut os));
        assert_eq!(os.contents(), "echo: hello world\n");
        assert!(!dispatcher.dispatch_command("missing", &mut os));
        assert_eq!(dispatcher.commands().collect::<Vec<_>>(), ["echo"]);
    }
}
