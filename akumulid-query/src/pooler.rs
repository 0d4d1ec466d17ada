//! `QueryResultsPooler`: adapts a `DbCursor` to the bounded-buffer
//! `read_some` contract the HTTP response writer pulls from.

use std::collections::VecDeque;

use akumulid_engine::{CursorPoll, DbCursor, DbSession, EngineError};

use crate::endpoint::ApiEndpoint;
use crate::error::QueryError;
use crate::formatter::{make_formatter, Formatter};

/// Default item capacity for a pooler's internal buffer, matching the
/// spec's "1024 items of sample-sized records".
pub const DEFAULT_ITEM_CAPACITY: usize = 1024;

/// A conservative per-record size estimate used to size the internal
/// buffer in bytes from an item count.
const ESTIMATED_RECORD_BYTES: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Started,
    Draining,
    Closed,
    Errored,
}

fn push_record(queue: &mut VecDeque<Vec<u8>>, total_bytes: &mut usize, record: Vec<u8>) {
    if record.is_empty() {
        return;
    }
    *total_bytes += record.len();
    queue.push_back(record);
}

/// Renders `sample` through `formatter`, growing a scratch buffer until the
/// whole record fits. Mirrors the `format(begin, end, sample) -> new_begin`
/// contract, but as an owned `Vec` rather than a raw pointer span.
fn render(formatter: &mut dyn Formatter, sample: &akumulid_engine::Sample) -> Vec<u8> {
    let mut cap = 256usize;
    loop {
        let mut scratch = vec![0u8; cap];
        let written = formatter.format(&mut scratch, sample);
        if written > 0 {
            scratch.truncate(written);
            return scratch;
        }
        cap *= 4;
    }
}

/// The streaming read operation backing one HTTP query/suggest/search
/// request. Stateful: see the module docs for the state machine.
pub struct QueryResultsPooler {
    session: Option<DbSession>,
    endpoint: ApiEndpoint,
    state: State,
    query_buf: Vec<u8>,
    cursor: Option<DbCursor>,
    formatter: Option<Box<dyn Formatter>>,
    // A queue of whole, already-formatted records (never split across a
    // `read_some` call) plus a running byte total, so capacity comparisons
    // don't have to re-sum the queue.
    rdbuf: VecDeque<Vec<u8>>,
    rdbuf_bytes: usize,
    rdbuf_capacity: usize,
    preamble_written: bool,
    cursor_exhausted: bool,
    error: Option<EngineError>,
    error_produced: bool,
}

impl QueryResultsPooler {
    /// Creates a pooler bound to `session`, formatting for `endpoint`, with
    /// room for `item_capacity` sample-sized records before `read_some`
    /// must drain it.
    pub fn new(session: DbSession, endpoint: ApiEndpoint, item_capacity: usize) -> Self {
        Self {
            session: Some(session),
            endpoint,
            state: State::Created,
            query_buf: Vec::new(),
            cursor: None,
            formatter: None,
            rdbuf: VecDeque::new(),
            rdbuf_bytes: 0,
            rdbuf_capacity: item_capacity * ESTIMATED_RECORD_BYTES,
            preamble_written: false,
            cursor_exhausted: false,
            error: None,
            error_produced: false,
        }
    }

    /// Accumulates query text. Legal only before `start`.
    pub fn append(&mut self, data: &[u8]) -> Result<(), QueryError> {
        if self.state != State::Created {
            return Err(QueryError::AlreadyStarted);
        }
        self.query_buf.extend_from_slice(data);
        Ok(())
    }

    /// Parses the accumulated query text, opens a cursor, and initializes
    /// the formatter for this pooler's endpoint. Legal only once.
    pub fn start(&mut self) -> Result<(), QueryError> {
        if self.state != State::Created {
            return Err(QueryError::AlreadyStarted);
        }

        self.formatter = Some(make_formatter(self.endpoint));
        let query_text = String::from_utf8_lossy(&self.query_buf).into_owned();

        let session = self
            .session
            .as_ref()
            .expect("session present until close()");

        match session.query(&query_text) {
            Ok(cursor) => {
                self.cursor = Some(cursor);
                self.state = State::Started;
            }
            Err(e) => {
                self.error = Some(e);
                self.state = State::Errored;
            }
        }

        Ok(())
    }

    /// Pulls and formats more samples into `rdbuf` until it reaches
    /// capacity, the cursor is exhausted, or the cursor errors.
    fn fill_rdbuf(&mut self) {
        if self.cursor_exhausted || self.state == State::Errored {
            return;
        }

        let formatter = self
            .formatter
            .as_mut()
            .expect("formatter present once Started");
        let cursor = self.cursor.as_mut().expect("cursor present once Started");

        if !self.preamble_written {
            push_record(
                &mut self.rdbuf,
                &mut self.rdbuf_bytes,
                formatter.preamble().to_vec(),
            );
            self.preamble_written = true;
        }

        while self.rdbuf_bytes < self.rdbuf_capacity {
            match cursor.poll() {
                Ok(CursorPoll::Sample(sample)) => {
                    let rendered = render(formatter.as_mut(), &sample);
                    push_record(&mut self.rdbuf, &mut self.rdbuf_bytes, rendered);
                }
                Ok(CursorPoll::EndOfStream) => {
                    push_record(
                        &mut self.rdbuf,
                        &mut self.rdbuf_bytes,
                        formatter.epilogue().to_vec(),
                    );
                    self.cursor_exhausted = true;
                    break;
                }
                Err(e) => {
                    self.error = Some(e);
                    self.state = State::Errored;
                    break;
                }
            }
        }
    }

    /// Writes as many whole formatted samples as fit into `buf`. Partial
    /// samples are never split across calls. `complete == true` means the
    /// cursor is exhausted and the internal buffer has drained, or the
    /// pooler has just delivered its terminal error.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<(usize, bool), QueryError> {
        match self.state {
            State::Created => return Err(QueryError::NotStarted),
            State::Closed => return Ok((0, true)),
            _ => {}
        }

        self.fill_rdbuf();

        let mut written = 0usize;
        while let Some(front) = self.rdbuf.front() {
            if front.len() > buf.len() - written {
                break;
            }
            let record = self.rdbuf.pop_front().expect("front just peeked");
            self.rdbuf_bytes -= record.len();
            buf[written..written + record.len()].copy_from_slice(&record);
            written += record.len();
        }

        if written > 0 && self.state == State::Started {
            self.state = State::Draining;
        }

        let rdbuf_empty = self.rdbuf.is_empty();
        let complete = match self.state {
            State::Errored => {
                if rdbuf_empty {
                    self.error_produced = true;
                    true
                } else {
                    false
                }
            }
            _ => rdbuf_empty && self.cursor_exhausted,
        };

        if complete && self.state != State::Errored {
            self.close();
        }

        Ok((written, complete))
    }

    /// Releases the cursor and session. Idempotent.
    pub fn close(&mut self) {
        self.cursor = None;
        self.session = None;
        if self.state != State::Errored {
            self.state = State::Closed;
        }
    }

    /// The first non-success status the cursor surfaced, if any.
    pub fn get_error(&self) -> Option<&EngineError> {
        self.error.as_ref()
    }

    /// Human-readable form of [`Self::get_error`].
    pub fn get_error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// `true` once a `read_some` call has delivered the terminal error.
    pub fn error_produced(&self) -> bool {
        self.error_produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::QueryFormat;
    use akumulid_engine::{DbConnection, MemoryEngine, Sample};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn session() -> DbSession {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        let conn = DbConnection::open(
            std::env::temp_dir().join(format!("akumulid-pooler-test-{id}")),
            Box::new(MemoryEngine::new()),
        )
        .unwrap();
        conn.session().unwrap()
    }

    fn seeded_session(series: &str, count: u64) -> DbSession {
        let mut s = session();
        let id = s.resolve(series).unwrap();
        for ts in 0..count {
            s.write(Sample::scalar(id, ts, ts as f64)).unwrap();
        }
        s
    }

    #[test]
    fn read_some_before_start_fails_with_not_started() {
        let mut pooler =
            QueryResultsPooler::new(session(), ApiEndpoint::Query(QueryFormat::Csv), 16);
        let mut buf = [0u8; 16];
        assert!(matches!(
            pooler.read_some(&mut buf),
            Err(QueryError::NotStarted)
        ));
    }

    #[test]
    fn append_after_start_fails_with_already_started() {
        let mut pooler = QueryResultsPooler::new(
            seeded_session("series1", 1),
            ApiEndpoint::Query(QueryFormat::Csv),
            16,
        );
        pooler.append(b"series1").unwrap();
        pooler.start().unwrap();
        assert!(matches!(
            pooler.append(b"more"),
            Err(QueryError::AlreadyStarted)
        ));
    }

    #[test]
    fn double_start_fails_with_already_started() {
        let mut pooler = QueryResultsPooler::new(
            seeded_session("series1", 1),
            ApiEndpoint::Query(QueryFormat::Csv),
            16,
        );
        pooler.append(b"series1").unwrap();
        pooler.start().unwrap();
        assert!(matches!(pooler.start(), Err(QueryError::AlreadyStarted)));
    }

    #[test]
    fn read_some_drains_csv_rows_then_completes() {
        let mut pooler = QueryResultsPooler::new(
            seeded_session("series1", 3),
            ApiEndpoint::Query(QueryFormat::Csv),
            16,
        );
        pooler.append(b"series1").unwrap();
        pooler.start().unwrap();

        let mut out = Vec::new();
        loop {
            let mut buf = [0u8; 8];
            let (n, complete) = pooler.read_some(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if complete {
                break;
            }
        }

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "0,0,0\n1,1,1\n2,2,2\n");
    }

    #[test]
    fn never_splits_a_partial_record_across_calls() {
        let mut pooler = QueryResultsPooler::new(
            seeded_session("series1", 2),
            ApiEndpoint::Query(QueryFormat::Csv),
            16,
        );
        pooler.append(b"series1").unwrap();
        pooler.start().unwrap();

        // "0,0,0\n" is 6 bytes; a 5-byte buffer can't fit it, so read_some
        // must report 0 bytes written rather than a truncated record.
        let mut buf = [0u8; 5];
        let (n, complete) = pooler.read_some(&mut buf).unwrap();
        assert_eq!(n, 0);
        assert!(!complete);
    }

    #[test]
    fn query_for_unknown_series_surfaces_error_exactly_once() {
        let mut pooler = QueryResultsPooler::new(
            session(),
            ApiEndpoint::Query(QueryFormat::Csv),
            16,
        );
        pooler.append(b"does-not-exist").unwrap();
        pooler.start().unwrap();

        let mut buf = [0u8; 16];
        let (n, complete) = pooler.read_some(&mut buf).unwrap();
        assert_eq!(n, 0);
        assert!(complete);
        assert!(pooler.get_error().is_some());
        assert!(pooler.error_produced());

        // Subsequent calls keep reporting complete without re-deriving
        // anything.
        let (n2, complete2) = pooler.read_some(&mut buf).unwrap();
        assert_eq!(n2, 0);
        assert!(complete2);
    }

    #[test]
    fn json_query_wraps_samples_in_an_array() {
        let mut pooler = QueryResultsPooler::new(
            seeded_session("series1", 2),
            ApiEndpoint::Query(QueryFormat::Json),
            16,
        );
        pooler.append(b"series1").unwrap();
        pooler.start().unwrap();

        let mut out = Vec::new();
        loop {
            let mut buf = [0u8; 256];
            let (n, complete) = pooler.read_some(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if complete {
                break;
            }
        }

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with('['));
        assert!(text.ends_with(']'));
        assert!(text.contains("},{"));
    }

    #[test]
    fn close_is_idempotent() {
        let mut pooler = QueryResultsPooler::new(
            seeded_session("series1", 1),
            ApiEndpoint::Query(QueryFormat::Csv),
            16,
        );
        pooler.close();
        pooler.close();
    }
}
