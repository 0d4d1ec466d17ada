//! End-to-end exercises of the engine façade and query pipeline against
//! the in-process `MemoryEngine`, standing in for a UDP-ingest-then-HTTP-
//! query round trip (spec scenario: "UDP ingest and query").

use akumulid_engine::{DbConnection, MemoryEngine, Sample};
use akumulid_proto::{Parser, RespParser};
use akumulid_query::{ApiEndpoint, QueryFormat, QueryProcessor};
use std::sync::atomic::{AtomicU64, Ordering};

fn unique_path(label: &str) -> std::path::PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let id = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("akumulid-it-{label}-{id}"))
}

#[test]
fn resp_datagram_ingest_then_http_style_query_round_trips() {
    let connection =
        DbConnection::open(unique_path("resp-roundtrip"), Box::new(MemoryEngine::new())).unwrap();

    // One simulated UDP datagram containing one RESP-framed sample.
    let datagram = b"+series1 tag=a\r\n+20200101T000000\r\n+3.14\r\n";
    let mut session = connection.session().unwrap();
    let mut parser = RespParser::default();
    let dest = parser.next_buffer(datagram.len());
    dest.copy_from_slice(datagram);
    parser.parse_next(datagram.len(), &mut session).unwrap();
    parser.close();
    drop(session);

    let processor = QueryProcessor::new(connection.downgrade());
    let mut pooler = processor
        .create(ApiEndpoint::Query(QueryFormat::Csv))
        .unwrap();
    pooler.append(b"series1 tag=a").unwrap();
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
    assert!(text.contains(",3.14\n"), "unexpected query output: {text:?}");
}

#[test]
fn malformed_datagram_does_not_poison_the_next_batch() {
    let connection = DbConnection::open(
        unique_path("malformed-isolation"),
        Box::new(MemoryEngine::new()),
    )
    .unwrap();
    let mut session = connection.session().unwrap();

    // A malformed batch: truncated mid-sample.
    {
        let mut parser = RespParser::default();
        let bad = b"+series1\r\n";
        let dest = parser.next_buffer(bad.len());
        dest.copy_from_slice(bad);
        assert!(parser.parse_next(bad.len(), &mut session).is_err());
        parser.close();
    }

    // A fresh parser for the next batch succeeds, per "malformed datagram
    // isolation": a corrupted parser state never persists across batches.
    {
        let mut parser = RespParser::default();
        let good = b"+series1\r\n+1\r\n+2.0\r\n";
        let dest = parser.next_buffer(good.len());
        dest.copy_from_slice(good);
        parser.parse_next(good.len(), &mut session).unwrap();
        parser.close();
    }

    let id = session.resolve("series1").unwrap();
    let mut cursor = session.query("series1").unwrap();
    use akumulid_engine::CursorPoll;
    match cursor.poll().unwrap() {
        CursorPoll::Sample(sample) => assert_eq!(sample.param_id, id),
        CursorPoll::EndOfStream => panic!("expected the valid batch's sample to be ingested"),
    }
}

#[test]
fn connection_open_refuses_a_second_open_on_the_same_path() {
    let path = unique_path("single-open");
    let _first = DbConnection::open(&path, Box::new(MemoryEngine::new())).unwrap();
    let second = DbConnection::open(&path, Box::new(MemoryEngine::new()));
    assert!(second.is_err());
}

#[test]
fn query_fails_once_connection_is_dropped() {
    let connection = DbConnection::open(
        unique_path("weak-after-drop"),
        Box::new(MemoryEngine::new()),
    )
    .unwrap();
    let processor = QueryProcessor::new(connection.downgrade());
    drop(connection);

    assert!(processor.create(ApiEndpoint::Search).is_err());
}
