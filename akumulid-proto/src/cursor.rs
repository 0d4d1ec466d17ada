//! Zero-copy cursor over a datagram/line buffer, in the spirit of the
//! teacher's `RawRequest` token scanner: a position into a borrowed slice,
//! with small helpers for the scans each parser needs.

use crate::error::ParseError;

/// A read-only cursor over a byte slice, tracking how far parsing has
/// progressed without copying.
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Wraps `buf` for scanning from the start.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Bytes remaining after the cursor's current position.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Reads up to (and past) the next `\r\n`, returning the slice before it
    /// with the terminator excluded. Accepts a bare `\n` as well, so the
    /// OpenTSDB telnet framing (which is newline-only) shares this scanner.
    pub fn read_line(&mut self) -> Result<&'a [u8], ParseError> {
        let rest = self.remaining();
        let newline = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(ParseError::Truncated)?;

        let end = if newline > 0 && rest[newline - 1] == b'\r' {
            newline - 1
        } else {
            newline
        };

        let line = &rest[..end];
        self.pos += newline + 1;
        Ok(line)
    }

    /// Consumes and returns exactly one byte, the RESP type prefix.
    pub fn read_prefix(&mut self) -> Result<u8, ParseError> {
        let rest = self.remaining();
        let b = *rest.first().ok_or(ParseError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    /// Consumes exactly `n` bytes, returning them as a slice.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let rest = self.remaining();
        if rest.len() < n {
            return Err(ParseError::Truncated);
        }
        let out = &rest[..n];
        self.pos += n;
        Ok(out)
    }

    /// Consumes the trailing `\r\n` (or bare `\n`) after a length-prefixed
    /// value such as a RESP bulk string body.
    pub fn expect_newline(&mut self) -> Result<(), ParseError> {
        let rest = self.remaining();
        if rest.first() == Some(&b'\r') {
            if rest.get(1) != Some(&b'\n') {
                return Err(ParseError::Malformed("expected CRLF"));
            }
            self.pos += 2;
        } else if rest.first() == Some(&b'\n') {
            self.pos += 1;
        } else {
            return Err(ParseError::Malformed("expected line terminator"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_line_strips_crlf() {
        let mut c = ByteCursor::new(b"hello\r\nworld\n");
        assert_eq!(c.read_line().unwrap(), b"hello");
        assert_eq!(c.read_line().unwrap(), b"world");
        assert!(c.is_empty());
    }

    #[test]
    fn read_line_without_terminator_is_truncated() {
        let mut c = ByteCursor::new(b"no newline here");
        assert!(matches!(c.read_line(), Err(ParseError::Truncated)));
    }

    #[test]
    fn take_respects_remaining_length() {
        let mut c = ByteCursor::new(b"abcdef");
        assert_eq!(c.take(3).unwrap(), b"abc");
        assert!(matches!(c.take(10), Err(ParseError::Truncated)));
    }
}
