//! `N<line> ... *<checksum>` framing.

/// The line-number/checksum envelope of one host line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// True when the line carried an `N` prefix
    pub numbered: bool,
    /// Value of the `N` prefix, `None` when absent or too large for `i64`
    pub line_number: Option<i64>,
    /// Checksum sent by the host, 0 when absent
    pub received: u32,
    /// Checksum computed over the bytes before `*`
    pub computed: u8,
    /// Text after the line number, cut at `*`
    pub body: &'a str,
}

impl<'a> Frame<'a> {
    /// Split `line` into its envelope and body
    ///
    /// Lines without `N` are returned unchanged as the body.
    pub fn split(line: &'a str) -> Self {
        let Some(after_n) = line.strip_prefix('N') else {
            return Frame {
                numbered: false,
                line_number: None,
                received: 0,
                computed: 0,
                body: line,
            };
        };

        let digits = leading_digits(after_n);
        let line_number = parse_number(&after_n[..digits]);
        let rest = &after_n[digits..];
        let number_end = line.len() - rest.len();

        let (body, received, framed) = match rest.find('*') {
            Some(star) => {
                let claimed = &rest[star + 1..];
                let claimed_digits = leading_digits(claimed);
                let received = parse_number(&claimed[..claimed_digits]).unwrap_or(u32::MAX);
                (&rest[..star], received, &line[..number_end + star])
            }
            None => (rest, 0, line),
        };

        Frame {
            numbered: true,
            line_number,
            received,
            computed: checksum(framed.as_bytes()),
            body,
        }
    }

    /// True for a bare `N<n> M110` (set line number)
    pub fn is_set_line_number(&self) -> bool {
        self.numbered && self.body.trim().eq_ignore_ascii_case("M110")
    }

    pub fn checksum_ok(&self) -> bool {
        !self.numbered || u32::from(self.computed) == self.received
    }
}

/// XOR of all bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

// empty is 0; overflow is `None`
fn parse_number<T: std::str::FromStr + Default>(digits: &str) -> Option<T> {
    if digits.is_empty() {
        return Some(T::default());
    }
    digits.parse().ok()
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}
