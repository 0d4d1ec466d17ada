//! RESP ingestion framing, used by both the TCP and UDP front-ends.
//!
//! A sample is three consecutive RESP values: a simple string naming the
//! series (with tags), a timestamp (simple string, either a bare integer or
//! compact ISO-8601 `YYYYMMDDTHHMMSS[.ffffff]`), and a value — a simple
//! string float, a bulk string blob, or an array of simple-string floats for
//! a tuple. A single frame may contain several samples back to back, which
//! is how one UDP datagram carries a batch.
//!
//! ```text
//! +series1 tag=a\r\n+20200101T000000\r\n+3.14\r\n
//! ```

use akumulid_engine::{DbSession, Payload, Sample};
use chrono::NaiveDateTime;

use crate::cursor::ByteCursor;
use crate::error::ParseError;
use crate::Parser;

/// Parses RESP-framed ingestion frames into [`Sample`]s written through a
/// [`DbSession`].
#[derive(Debug, Default)]
pub struct RespParser {
    buf: Vec<u8>,
}

impl RespParser {
    /// Creates a parser with no buffered state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Parser for RespParser {
    fn start(&mut self) {}

    fn next_buffer(&mut self, len: usize) -> &mut [u8] {
        self.buf.resize(len, 0);
        &mut self.buf
    }

    fn parse_next(&mut self, len: usize, session: &mut DbSession) -> Result<(), ParseError> {
        let mut cursor = ByteCursor::new(&self.buf[..len]);
        while !cursor.is_empty() {
            parse_sample(&mut cursor, session)?;
        }
        Ok(())
    }

    fn close(&mut self) {}
}

fn parse_sample(cursor: &mut ByteCursor<'_>, session: &mut DbSession) -> Result<(), ParseError> {
    let series = read_simple_string(cursor)?;
    let series = std::str::from_utf8(series)
        .map_err(|_| ParseError::Malformed("series name is not valid utf-8"))?;

    let timestamp = read_timestamp(cursor)?;
    let payload = read_payload(cursor)?;

    let param_id = session.resolve(series)?;

    session
        .write(Sample::new(param_id, timestamp, payload))
        .map_err(ParseError::from)
}

fn read_simple_string<'a>(cursor: &mut ByteCursor<'a>) -> Result<&'a [u8], ParseError> {
    let prefix = cursor.read_prefix()?;
    if prefix != b'+' {
        return Err(ParseError::Malformed("expected simple string prefix '+'"));
    }
    cursor.read_line()
}

fn read_timestamp(cursor: &mut ByteCursor<'_>) -> Result<u64, ParseError> {
    let prefix = cursor.read_prefix()?;
    let line = cursor.read_line()?;
    let text = std::str::from_utf8(line)
        .map_err(|_| ParseError::Malformed("timestamp is not valid utf-8"))?;

    match prefix {
        b':' => text
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidTimestamp(text.to_string())),
        b'+' => parse_timestamp_text(text),
        _ => Err(ParseError::Malformed(
            "expected integer ':' or simple string '+' timestamp",
        )),
    }
}

fn parse_timestamp_text(text: &str) -> Result<u64, ParseError> {
    if let Ok(n) = text.parse::<u64>() {
        return Ok(n);
    }

    for fmt in ["%Y%m%dT%H%M%S%.f", "%Y%m%dT%H%M%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            let nanos = dt.and_utc().timestamp_nanos_opt();
            if let Some(nanos) = nanos {
                if nanos >= 0 {
                    return Ok(nanos as u64);
                }
            }
        }
    }

    Err(ParseError::InvalidTimestamp(text.to_string()))
}

fn read_payload(cursor: &mut ByteCursor<'_>) -> Result<Payload, ParseError> {
    let prefix = cursor.read_prefix()?;
    match prefix {
        b'+' => {
            let line = cursor.read_line()?;
            let text = std::str::from_utf8(line)
                .map_err(|_| ParseError::Malformed("value is not valid utf-8"))?;
            let value = text
                .parse::<f64>()
                .map_err(|_| ParseError::InvalidNumber(text.to_string()))?;
            Ok(Payload::Float(value))
        }
        b'$' => {
            let line = cursor.read_line()?;
            let len = parse_len(line)?;
            let bytes = cursor.take(len)?;
            cursor.expect_newline()?;
            Ok(Payload::Blob(bytes.to_vec()))
        }
        b'*' => {
            let line = cursor.read_line()?;
            let count = parse_len(line)?;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let elem_prefix = cursor.read_prefix()?;
                if elem_prefix != b'+' {
                    return Err(ParseError::Malformed(
                        "tuple elements must be simple string floats",
                    ));
                }
                let line = cursor.read_line()?;
                let text = std::str::from_utf8(line)
                    .map_err(|_| ParseError::Malformed("tuple element is not valid utf-8"))?;
                values.push(
                    text.parse::<f64>()
                        .map_err(|_| ParseError::InvalidNumber(text.to_string()))?,
                );
            }
            Ok(Payload::Tuple(values))
        }
        _ => Err(ParseError::Malformed(
            "expected value prefix '+', '$' or '*'",
        )),
    }
}

fn parse_len(line: &[u8]) -> Result<usize, ParseError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ParseError::Malformed("length is not valid utf-8"))?;
    text.parse::<usize>()
        .map_err(|_| ParseError::InvalidNumber(text.to_string()))
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
            std::env::temp_dir().join(format!("akumulid-resp-test-{id}")),
            Box::new(MemoryEngine::new()),
        )
        .unwrap();
        conn.session().unwrap()
    }

    #[test]
    fn parses_scalar_float_sample() {
        let mut session = session();
        let mut parser = RespParser::new();
        let frame = b"+series1 tag=a\r\n+20200101T000000\r\n+3.14\r\n";
        let buf = parser.next_buffer(frame.len());
        buf.copy_from_slice(frame);
        parser.parse_next(frame.len(), &mut session).unwrap();

        let mut cursor = session.query("series1 tag=a").unwrap();
        match cursor.poll().unwrap() {
            CursorPoll::Sample(sample) => assert_eq!(sample.payload, Payload::Float(3.14)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_integer_timestamp() {
        let mut session = session();
        let mut parser = RespParser::new();
        let frame = b"+series1\r\n:1577836800000000000\r\n+1.0\r\n";
        let buf = parser.next_buffer(frame.len());
        buf.copy_from_slice(frame);
        parser.parse_next(frame.len(), &mut session).unwrap();

        let mut cursor = session.query("series1").unwrap();
        match cursor.poll().unwrap() {
            CursorPoll::Sample(sample) => assert_eq!(sample.timestamp, 1_577_836_800_000_000_000),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_multiple_samples_in_one_frame() {
        let mut session = session();
        let mut parser = RespParser::new();
        let frame =
            b"+series1\r\n+20200101T000000\r\n+1.0\r\n+series1\r\n+20200101T000001\r\n+2.0\r\n";
        let buf = parser.next_buffer(frame.len());
        buf.copy_from_slice(frame);
        parser.parse_next(frame.len(), &mut session).unwrap();

        let mut cursor = session.query("series1").unwrap();
        let mut count = 0;
        loop {
            match cursor.poll().unwrap() {
                CursorPoll::Sample(_) => count += 1,
                CursorPoll::EndOfStream => break,
            }
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn parses_blob_payload() {
        let mut session = session();
        let mut parser = RespParser::new();
        let frame = b"+series1\r\n+20200101T000000\r\n$3\r\nabc\r\n";
        let buf = parser.next_buffer(frame.len());
        buf.copy_from_slice(frame);
        parser.parse_next(frame.len(), &mut session).unwrap();

        let mut cursor = session.query("series1").unwrap();
        match cursor.poll().unwrap() {
            CursorPoll::Sample(sample) => {
                assert_eq!(sample.payload, Payload::Blob(b"abc".to_vec()))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_tuple_payload() {
        let mut session = session();
        let mut parser = RespParser::new();
        let frame = b"+series1\r\n+20200101T000000\r\n*2\r\n+1.0\r\n+2.0\r\n";
        let buf = parser.next_buffer(frame.len());
        buf.copy_from_slice(frame);
        parser.parse_next(frame.len(), &mut session).unwrap();

        let mut cursor = session.query("series1").unwrap();
        match cursor.poll().unwrap() {
            CursorPoll::Sample(sample) => {
                assert_eq!(sample.payload, Payload::Tuple(vec![1.0, 2.0]))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_prefix_is_rejected() {
        let mut session = session();
        let mut parser = RespParser::new();
        let frame = b"garbage\r\n";
        let buf = parser.next_buffer(frame.len());
        buf.copy_from_slice(frame);
        assert!(parser.parse_next(frame.len(), &mut session).is_err());
    }
}
