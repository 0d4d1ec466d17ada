//! An in-process [`Engine`] implementation. Stands in for the real embedded
//! storage engine (vendored separately, out of scope for this repository —
//! see spec non-goals) so the rest of the daemon has something concrete to
//! run and be tested against. Query text for this backend is just a bare
//! series name; the real query grammar is not implemented here.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::EngineError;
use crate::sample::Sample;
use crate::traits::{CursorPoll, Cursor, Engine, Session};

#[derive(Default)]
struct State {
    names: Mutex<HashMap<String, u64>>,
    next_id: AtomicU64,
    series: Mutex<HashMap<u64, Vec<Sample>>>,
}

/// In-memory stand-in for the embedded storage engine.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<State>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for MemoryEngine {
    fn open_session(&self) -> Result<Box<dyn Session>, EngineError> {
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
        }))
    }

    fn stats(&self) -> String {
        let series = self.state.series.lock().expect("series lock poisoned");
        let samples: usize = series.values().map(Vec::len).sum();
        format!("series={} samples={}", series.len(), samples)
    }

    fn resource(&self, name: &str) -> Result<String, EngineError> {
        match name {
            "series" | "names" => {
                let names = self.state.names.lock().expect("names lock poisoned");
                let mut list: Vec<&str> = names.keys().map(String::as_str).collect();
                list.sort_unstable();
                Ok(list.join("\n"))
            }
            other => Err(EngineError::UnknownResource(other.to_string())),
        }
    }

    fn debug_report(&self) -> String {
        format!("akumulid memory engine debug report: {}", self.stats())
    }

    fn debug_report_after_recovery(&self) -> String {
        format!(
            "akumulid memory engine post-recovery debug report: {}",
            self.stats()
        )
    }
}

struct MemorySession {
    state: Arc<State>,
}

impl Session for MemorySession {
    fn resolve(&mut self, series: &str) -> Result<u64, EngineError> {
        let mut names = self.state.names.lock().expect("names lock poisoned");
        if let Some(id) = names.get(series) {
            return Ok(*id);
        }
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        names.insert(series.to_string(), id);
        Ok(id)
    }

    fn write(&mut self, sample: Sample) -> Result<(), EngineError> {
        let mut series = self.state.series.lock().expect("series lock poisoned");
        let entries = series.entry(sample.param_id).or_default();

        if let Some(last) = entries.last() {
            if sample.timestamp < last.timestamp {
                return Err(EngineError::LateWrite(sample.param_id));
            }
            if sample.timestamp == last.timestamp {
                return Err(EngineError::DuplicateTimestamp(
                    sample.param_id,
                    sample.timestamp,
                ));
            }
        }

        entries.push(sample);
        Ok(())
    }

    fn query(&self, query: &str) -> Result<Box<dyn Cursor>, EngineError> {
        let series_name = query.trim();
        let param_id = {
            let names = self.state.names.lock().expect("names lock poisoned");
            *names
                .get(series_name)
                .ok_or_else(|| EngineError::UnknownSeries(series_name.to_string()))?
        };

        let series = self.state.series.lock().expect("series lock poisoned");
        let samples = series.get(&param_id).cloned().unwrap_or_default();
        Ok(Box::new(MemoryCursor {
            samples: samples.into(),
        }))
    }
}

struct MemoryCursor {
    samples: VecDeque<Sample>,
}

impl Cursor for MemoryCursor {
    fn poll(&mut self) -> Result<CursorPoll, EngineError> {
        match self.samples.pop_front() {
            Some(sample) => Ok(CursorPoll::Sample(sample)),
            None => Ok(CursorPoll::EndOfStream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Payload;

    #[test]
    fn write_then_query_round_trips_a_sample() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().unwrap();
        let id = session.resolve("series1 tag=a").unwrap();
        session
            .write(Sample::scalar(id, 1, 3.14))
            .unwrap();

        let mut cursor = session.query("series1 tag=a").unwrap();
        assert_eq!(
            cursor.poll().unwrap(),
            CursorPoll::Sample(Sample::scalar(id, 1, 3.14))
        );
        assert_eq!(cursor.poll().unwrap(), CursorPoll::EndOfStream);
    }

    #[test]
    fn resolve_is_stable_across_calls() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().unwrap();
        let a = session.resolve("series1").unwrap();
        let b = session.resolve("series1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn late_write_is_rejected() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().unwrap();
        let id = session.resolve("series1").unwrap();
        session.write(Sample::scalar(id, 10, 1.0)).unwrap();
        assert!(matches!(
            session.write(Sample::scalar(id, 5, 2.0)),
            Err(EngineError::LateWrite(_))
        ));
    }

    #[test]
    fn duplicate_timestamp_is_rejected() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().unwrap();
        let id = session.resolve("series1").unwrap();
        session.write(Sample::scalar(id, 10, 1.0)).unwrap();
        assert!(matches!(
            session.write(Sample::scalar(id, 10, 2.0)),
            Err(EngineError::DuplicateTimestamp(_, _))
        ));
    }

    #[test]
    fn query_for_unknown_series_fails() {
        let engine = MemoryEngine::new();
        let session = engine.open_session().unwrap();
        assert!(matches!(
            session.query("nope"),
            Err(EngineError::UnknownSeries(_))
        ));
    }

    #[test]
    fn tuple_and_blob_payloads_round_trip() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().unwrap();
        let id = session.resolve("series1").unwrap();
        session
            .write(Sample::new(id, 1, Payload::Tuple(vec![1.0, 2.0])))
            .unwrap();
        let mut cursor = session.query("series1").unwrap();
        assert_eq!(
            cursor.poll().unwrap(),
            CursorPoll::Sample(Sample::new(id, 1, Payload::Tuple(vec![1.0, 2.0])))
        );
    }
}
