//! Host line front end.
//!
//! A [`Console`] takes each line the host sends and decides whether it is
//! a text command or G-code. It parses the G-code and dispatches every
//! command, then writes the per-line reply: `ok`, `rs N<n>` for a resend,
//! or an error.
//!
//! Between `M28 <file>` and `M29` the G-code of every line is saved to the
//! card instead of being dispatched.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::dispatch::Dispatcher;
use crate::gcode::GCode;
use crate::halt::HaltState;
use crate::output::OutputStream;
use crate::parser::GCodeProcessor;
use crate::storage::{SD_PREFIX, SdCard};

/// M-codes that take a string argument and are handled as text commands
const STRING_MCODES: [&str; 3] = ["M23 ", "M32 ", "M117 "];

/// File being written by `M28`
struct Upload {
    path: String,
    file: BufWriter<File>,
}

pub struct Console {
    processor: GCodeProcessor,
    dispatcher: Dispatcher,
    gcodes: Vec<GCode>,
    echo: bool,
    sd_card: Option<SdCard>,
    upload: Option<Upload>,
}

impl Console {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            processor: GCodeProcessor::new(),
            dispatcher,
            gcodes: Vec::new(),
            echo: false,
            sd_card: None,
            upload: None,
        }
    }

    /// Card that `M28` uploads are written to
    pub fn set_sd_card(&mut self, card: SdCard) {
        self.sd_card = Some(card);
    }

    /// True between `M28` and `M29`
    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    /// Log every parsed command at debug level
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn processor(&self) -> &GCodeProcessor {
        &self.processor
    }

    /// Handle one host line, writing the reply to `os`
    pub fn process_line(&mut self, line: &str, os: &mut OutputStream) {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = rewrite_string_mcode(line);

        if let Some(name) = line.strip_prefix("M28 ") {
            self.start_upload(name.trim(), os);
            return;
        }

        if line.starts_with(|c: char| c.is_ascii_lowercase() || c == '$') {
            self.process_text_command(&line, os);
            return;
        }

        self.gcodes.clear();
        if let Err(e) = self.processor.parse(&line, &mut self.gcodes) {
            if e.is_transport() {
                log::debug!("requesting resend: {}", e);
                os.printf(format_args!("rs N{}\n", self.processor.next_line_number()));
            } else {
                let message = self
                    .gcodes
                    .last()
                    .and_then(GCode::error_message)
                    .unwrap_or("unknown");
                log::debug!("rejected line {:?}: {}", line, message);
                let prefix = if self.dispatcher.is_grbl_mode() { "error: " } else { "Error: " };
                os.printf(format_args!("{prefix}{message}\n"));
            }
            return;
        }

        if self.gcodes.is_empty() {
            // N<n> M110
            os.puts("ok\n");
            return;
        }

        if self.upload.is_some() {
            self.save_upload_line(os);
            return;
        }

        let mut remaining = self.gcodes.len();
        for gc in self.gcodes.iter_mut() {
            if self.echo {
                log::debug!("> {}", gc);
            }
            if gc.class().is_some() {
                // only the last command of the line sends the ok
                let last = remaining == 1;
                if !self.dispatcher.dispatch_with_ok(gc, os, last) && last {
                    os.puts("ok - ignored\n");
                }
            } else {
                // blank line or comment
                os.puts("ok\n");
            }
            remaining -= 1;
        }
    }

    fn start_upload(&mut self, name: &str, os: &mut OutputStream) {
        let path = if name.starts_with(SD_PREFIX) {
            name.to_string()
        } else {
            format!("{SD_PREFIX}{name}")
        };
        self.finish_upload();

        let opened = match &self.sd_card {
            Some(card) => card.create(&path),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no card configured")),
        };
        match opened {
            Ok(file) => {
                log::info!("saving upload to {}", path);
                os.printf(format_args!("Writing to file: {path}\nok\n"));
                self.upload = Some(Upload { path, file });
            }
            Err(e) => {
                log::warn!("cannot open {} for upload: {}", path, e);
                os.printf(format_args!("open failed, File: {path}.\nok\n"));
            }
        }
    }

    // one ok per saved line; M29 closes the file
    fn save_upload_line(&mut self, os: &mut OutputStream) {
        if self.gcodes.first().is_some_and(|gc| gc.has_m() && gc.code() == 29) {
            self.finish_upload();
            os.puts("Done saving file.\nok\n");
            return;
        }

        if let Some(upload) = &mut self.upload {
            for gc in self.gcodes.iter().filter(|gc| gc.class().is_some()) {
                if let Err(e) = writeln!(upload.file, "{gc}") {
                    log::warn!("writing {} failed: {}", upload.path, e);
                    break;
                }
            }
        }
        os.puts("ok\n");
    }

    fn finish_upload(&mut self) {
        if let Some(mut upload) = self.upload.take() {
            match upload.file.flush() {
                Ok(()) => log::info!("saved {}", upload.path),
                Err(e) => log::warn!("saving {} failed: {}", upload.path, e),
            }
        }
    }

    fn process_text_command(&mut self, line: &str, os: &mut OutputStream) {
        if line.starts_with("$X") {
            let halt = self.dispatcher.halt_state();
            if halt.is_halted() {
                halt.broadcast_halt(false);
                os.puts("[Caution: Unlocked]\nok\n");
            } else {
                os.puts("ok\n");
            }
            return;
        }

        if !self.dispatcher.dispatch_command(line, os) {
            if line.starts_with('$') {
                os.puts("error:Invalid statement\n");
            } else {
                os.printf(format_args!("error:Unsupported command - {line}\n"));
            }
        }
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("processor", &self.processor)
            .field("dispatcher", &self.dispatcher)
            .field("echo", &self.echo)
            .field("sd_card", &self.sd_card)
            .field("upload", &self.upload.as_ref().map(|u| &u.path))
            .finish()
    }
}

/// Map M23/M32/M117 to lowercase text commands and M30 to `rm`
fn rewrite_string_mcode(line: &str) -> std::borrow::Cow<'_, str> {
    use std::borrow::Cow;

    if let Some(file) = line.strip_prefix("M30 ") {
        return Cow::Owned(format!("rm /sd/{file}"));
    }
    if STRING_MCODES.iter().any(|prefix| line.starts_with(prefix)) {
        return Cow::Owned(format!("m{}", &line[1..]));
    }
    Cow::Borrowed(line)
}
