//! OpenTSDB telnet ingestion framing, used by the optional secondary TCP
//! listener. Only the `put` command carries a sample; every other telnet
//! command (`version`, `stats`, ...) is reported as
//! [`ParseError::UnsupportedCommand`] so the caller can log and skip it
//! without treating it as a batch-ending failure.
//!
//! ```text
//! put sys.cpu.user 1577836800 42.5 host=web01 cpu=0
//! ```

use akumulid_engine::{DbSession, Payload, Sample};

use crate::cursor::ByteCursor;
use crate::error::ParseError;
use crate::Parser;

/// Parses OpenTSDB telnet `put` lines into [`Sample`]s written through a
/// [`DbSession`].
#[derive(Debug, Default)]
pub struct OpenTsdbParser {
    buf: Vec<u8>,
}

impl OpenTsdbParser {
    /// Creates a parser with no buffered state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Parser for OpenTsdbParser {
    fn start(&mut self) {}

    fn next_buffer(&mut self, len: usize) -> &mut [u8] {
        self.buf.resize(len, 0);
        &mut self.buf
    }

    fn parse_next(&mut self, len: usize, session: &mut DbSession) -> Result<(), ParseError> {
        let mut cursor = ByteCursor::new(&self.buf[..len]);
        while !cursor.is_empty() {
            let line = cursor.read_line()?;
            if line.is_empty() {
                continue;
            }
            parse_line(line, session)?;
        }
        Ok(())
    }

    fn close(&mut self) {}
}

fn parse_line(line: &[u8], session: &mut DbSession) -> Result<(), ParseError> {
    let text =
        std::str::from_utf8(line).map_err(|_| ParseError::Malformed("line is not valid utf-8"))?;
    let mut fields = text.split_whitespace();

    match fields.next() {
        Some("put") => {}
        Some(other) => return Err(ParseError::UnsupportedCommand(other.to_string())),
        None => return Err(ParseError::Malformed("empty command")),
    }

    let metric = fields
        .next()
        .ok_or(ParseError::Malformed("missing metric name"))?;
    let timestamp = fields
        .next()
        .ok_or(ParseError::Malformed("missing timestamp"))?;
    let value = fields
        .next()
        .ok_or(ParseError::Malformed("missing value"))?;

    let timestamp: u64 = timestamp
        .parse()
        .map_err(|_| ParseError::InvalidTimestamp(timestamp.to_string()))?;
    let value: f64 = value
        .parse()
        .map_err(|_| ParseError::InvalidNumber(value.to_string()))?;

    // Remaining fields are `tag=value` pairs, folded into the series name the
    // same way the RESP front-end embeds tags, so both parsers resolve to
    // the same kind of series identity.
    let tags: Vec<&str> = fields.collect();
    let series = if tags.is_empty() {
        metric.to_string()
    } else {
        format!("{metric} {}", tags.join(" "))
    };

    let param_id = session.resolve(&series)?;

    session
        .write(Sample::new(param_id, timestamp, Payload::Float(value)))
        .map_err(ParseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use akumulid_engine::{CursorPoll, DbConnection, MemoryEngine};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn session() -> DbSession {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        let conn = DbConnection::open(
            std::env::temp_dir().join(format!("akumulid-opentsdb-test-{id}")),
            Box::new(MemoryEngine::new()),
        )
        .unwrap();
        conn.session().unwrap()
    }

    #[test]
    fn parses_put_line_with_tags() {
        let mut session = session();
        let mut parser = OpenTsdbParser::new();
        let line = b"put sys.cpu.user 1577836800 42.5 host=web01 cpu=0\n";
        let buf = parser.next_buffer(line.len());
        buf.copy_from_slice(line);
        parser.parse_next(line.len(), &mut session).unwrap();

        let mut cursor = session.query("sys.cpu.user host=web01 cpu=0").unwrap();
        match cursor.poll().unwrap() {
            CursorPoll::Sample(sample) => {
                assert_eq!(sample.timestamp, 1_577_836_800);
                assert_eq!(sample.payload, Payload::Float(42.5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_put_command_is_unsupported_not_fatal() {
        let mut session = session();
        let mut parser = OpenTsdbParser::new();
        let line = b"version\n";
        let buf = parser.next_buffer(line.len());
        buf.copy_from_slice(line);
        match parser.parse_next(line.len(), &mut session) {
            Err(ParseError::UnsupportedCommand(cmd)) => assert_eq!(cmd, "version"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_fields_are_malformed() {
        let mut session = session();
        let mut parser = OpenTsdbParser::new();
        let line = b"put sys.cpu.user\n";
        let buf = parser.next_buffer(line.len());
        buf.copy_from_slice(line);
        assert!(parser.parse_next(line.len(), &mut session).is_err());
    }
}
