//! Response sink for command handlers.
//!
//! Handlers write their replies to an [`OutputStream`]. The stream also
//! carries the flags the dispatcher consults when it frames the final
//! `ok`: deferred ok (`prepend_ok`), trailing newline (`append_nl`) and
//! suppressed ok (`no_response`).

use std::borrow::Cow;
use std::fmt;
use std::io;

/// Longest formatted write before truncation
pub const MAX_PRINTF_LEN: usize = 132;

enum Sink {
    Null,
    Writer(Box<dyn io::Write + Send>),
    Buffer(Vec<u8>),
}

pub struct OutputStream {
    sink: Sink,
    prepending: Vec<u8>,
    append_nl: bool,
    prepend_ok: bool,
    no_response: bool,
}

impl OutputStream {
    /// Stream over any writer, flushed after every write
    pub fn new(writer: impl io::Write + Send + 'static) -> Self {
        Self::with_sink(Sink::Writer(Box::new(writer)))
    }

    /// Stream that discards everything
    pub fn null() -> Self {
        Self::with_sink(Sink::Null)
    }

    /// Stream that collects output in memory
    pub fn buffered() -> Self {
        Self::with_sink(Sink::Buffer(Vec::new()))
    }

    fn with_sink(sink: Sink) -> Self {
        Self {
            sink,
            prepending: Vec::new(),
            append_nl: false,
            prepend_ok: false,
            no_response: false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.sink, Sink::Null)
    }

    /// Write raw bytes, returning how many were accepted
    ///
    /// While `prepend_ok` is set the bytes are held back until
    /// [`OutputStream::flush_prepend`].
    pub fn write(&mut self, buf: &[u8]) -> usize {
        if self.is_null() {
            return 0;
        }
        if self.prepend_ok {
            self.prepending.extend_from_slice(buf);
            return buf.len();
        }
        self.emit(buf)
    }

    pub fn puts(&mut self, s: &str) -> usize {
        self.write(s.as_bytes())
    }

    /// Formatted write, truncated to [`MAX_PRINTF_LEN`] bytes plus `...`
    pub fn printf(&mut self, args: fmt::Arguments<'_>) -> usize {
        if self.is_null() {
            return 0;
        }
        let mut text = fmt::format(args);
        if text.len() >= MAX_PRINTF_LEN {
            let mut cut = MAX_PRINTF_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...");
        }
        self.puts(&text)
    }

    fn emit(&mut self, buf: &[u8]) -> usize {
        match &mut self.sink {
            Sink::Null => 0,
            Sink::Buffer(bytes) => {
                bytes.extend_from_slice(buf);
                buf.len()
            }
            Sink::Writer(writer) => match writer.write_all(buf).and_then(|()| writer.flush()) {
                Ok(()) => buf.len(),
                Err(e) => {
                    log::warn!("output stream write failed: {}", e);
                    0
                }
            },
        }
    }

    /// Emit `ok ` followed by the held-back text and leave prepend mode
    ///
    /// Returns the number of held-back bytes. With nothing held back a
    /// bare `ok\n` is written.
    pub fn flush_prepend(&mut self) -> usize {
        self.prepend_ok = false;
        let text = std::mem::take(&mut self.prepending);
        if text.is_empty() {
            self.emit(b"ok\n");
        } else {
            self.emit(b"ok ");
            self.emit(&text);
        }
        text.len()
    }

    /// Emit held-back text without an `ok` and leave prepend mode
    pub(crate) fn release_prepend(&mut self) -> usize {
        self.prepend_ok = false;
        let text = std::mem::take(&mut self.prepending);
        self.emit(&text)
    }

    pub fn set_append_nl(&mut self, flag: bool) {
        self.append_nl = flag;
    }

    pub fn is_append_nl(&self) -> bool {
        self.append_nl
    }

    pub fn set_prepend_ok(&mut self, flag: bool) {
        self.prepend_ok = flag;
    }

    pub fn is_prepend_ok(&self) -> bool {
        self.prepend_ok
    }

    /// Ask the dispatcher not to send the implicit `ok`
    pub fn set_no_response(&mut self, flag: bool) {
        self.no_response = flag;
    }

    pub fn is_no_response(&self) -> bool {
        self.no_response
    }

    /// Clear the response flags and any held-back text
    pub fn reset_flags(&mut self) {
        self.append_nl = false;
        self.prepend_ok = false;
        self.no_response = false;
        self.prepending.clear();
    }

    /// Reset flags and drop everything collected so far
    pub fn clear(&mut self) {
        self.reset_flags();
        if let Sink::Buffer(bytes) = &mut self.sink {
            bytes.clear();
        }
    }

    /// Collected output of a buffered stream, empty for other kinds
    ///
    /// Invalid UTF-8 is replaced; use [`OutputStream::bytes`] for the raw
    /// output.
    pub fn contents(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.bytes())
    }

    /// Collected bytes of a buffered stream, empty for other kinds
    pub fn bytes(&self) -> &[u8] {
        match &self.sink {
            Sink::Buffer(bytes) => bytes,
            _ => &[],
        }
    }

    /// Take the collected output of a buffered stream
    pub fn take_contents(&mut self) -> String {
        match &mut self.sink {
            Sink::Buffer(bytes) => String::from_utf8_lossy(&std::mem::take(bytes)).into_owned(),
            _ => String::new(),
        }
    }
}

impl fmt::Write for OutputStream {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.sink {
            Sink::Null => "null",
            Sink::Writer(_) => "writer",
            Sink::Buffer(_) => "buffer",
        };
        f.debug_struct("OutputStream")
            .field("sink", &kind)
            .field("append_nl", &self.append_nl)
            .field("prepend_ok", &self.prepend_ok)
            .field("no_response", &self.no_response)
            .finish()
    }
}
