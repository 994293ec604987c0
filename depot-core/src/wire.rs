//! Framing: newline-terminated text lines, fields separated by `:`.

use std::io::{self, BufRead, Write};

/// Field delimiter inside a line.
pub const DELIMITER: char = ':';

const TERMINATOR: u8 = b'\n';

/// Read one line from `reader`, stripped of its terminator. Lines have no length limit.
/// Returns `Ok(None)` at end of stream; a final line without a terminator is dropped.
pub fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    reader.read_until(TERMINATOR, &mut buf)?;
    if buf.last() != Some(&TERMINATOR) {
        return Ok(None);
    }
    buf.pop();
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Write `line` followed by the terminator, then flush.
pub fn write_line<W: Write + ?Sized>(writer: &mut W, line: &str) -> io::Result<()> {
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(TERMINATOR);
    writer.write_all(&frame)?;
    writer.flush()
}

/// Cursor over the fields of one line.
///
/// Runs of delimiters count as one and leading or trailing delimiters are
/// ignored, so `"::Deliver::3:x:"` yields `Deliver`, `3`, `x`.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    pub fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    /// Everything after the delimiter that ended the previous field, verbatim.
    /// `None` when nothing is left. Consumes the cursor's remaining text.
    pub fn remainder(&mut self) -> Option<&'a str> {
        let rest = std::mem::take(&mut self.rest);
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.rest.trim_start_matches(DELIMITER);
        if start.is_empty() {
            self.rest = start;
            return None;
        }
        match start.find(DELIMITER) {
            Some(end) => {
                self.rest = &start[end + DELIMITER.len_utf8()..];
                Some(&start[..end])
            }
            None => {
                self.rest = &start[start.len()..];
                Some(start)
            }
        }
    }
}
