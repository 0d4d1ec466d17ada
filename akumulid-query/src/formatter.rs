//! One formatter per [`crate::ApiEndpoint`] variant, chosen once at
//! `start()` and never re-dispatched per sample.
//!
//! `format` writes at most `buf.len()` bytes and returns how many it wrote;
//! `0` means the sample did not fit at all — the caller must retry with a
//! larger span, and must not assume a partial write happened.

use akumulid_engine::{Payload, Sample};

use crate::endpoint::{ApiEndpoint, QueryFormat};

/// Renders one [`Sample`] at a time into a byte buffer.
pub trait Formatter: Send {
    /// Bytes to emit once, before the first sample (e.g. a JSON `[`).
    fn preamble(&self) -> &'static [u8] {
        b""
    }

    /// Bytes to emit once, after the last sample (e.g. a JSON `]`).
    fn epilogue(&self) -> &'static [u8] {
        b""
    }

    /// Writes `sample` into `buf`, returning the number of bytes written.
    /// Returns `0`, and writes nothing, if `sample` does not fit whole.
    fn format(&mut self, buf: &mut [u8], sample: &Sample) -> usize;
}

fn write_if_fits(buf: &mut [u8], rendered: &[u8]) -> usize {
    if rendered.len() > buf.len() {
        return 0;
    }
    buf[..rendered.len()].copy_from_slice(rendered);
    rendered.len()
}

fn payload_text(payload: &Payload) -> String {
    match payload {
        Payload::Float(v) => format!("{v}"),
        Payload::Tuple(values) => values
            .iter()
            .map(|v| format!("{v}"))
            .collect::<Vec<_>>()
            .join(";"),
        Payload::Blob(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
    }
}

fn payload_json(payload: &Payload) -> String {
    match payload {
        Payload::Float(v) => format!("{v}"),
        Payload::Tuple(values) => {
            let items: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
            format!("[{}]", items.join(","))
        }
        Payload::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("{hex:?}")
        }
    }
}

/// `param_id,timestamp,value\n` rows.
#[derive(Debug, Default)]
pub struct CsvQueryFormatter;

impl Formatter for CsvQueryFormatter {
    fn format(&mut self, buf: &mut [u8], sample: &Sample) -> usize {
        let line = format!(
            "{},{},{}\n",
            sample.param_id,
            sample.timestamp,
            payload_text(&sample.payload)
        );
        write_if_fits(buf, line.as_bytes())
    }
}

/// A JSON array of `{"id":...,"ts":...,"value":...}` objects.
#[derive(Debug, Default)]
pub struct JsonQueryFormatter {
    wrote_first: bool,
}

impl Formatter for JsonQueryFormatter {
    fn preamble(&self) -> &'static [u8] {
        b"["
    }

    fn epilogue(&self) -> &'static [u8] {
        b"]"
    }

    fn format(&mut self, buf: &mut [u8], sample: &Sample) -> usize {
        let object = format!(
            "{}{{\"id\":{},\"ts\":{},\"value\":{}}}",
            if self.wrote_first { "," } else { "" },
            sample.param_id,
            sample.timestamp,
            payload_json(&sample.payload)
        );

        let written = write_if_fits(buf, object.as_bytes());
        if written > 0 {
            self.wrote_first = true;
        }
        written
    }
}

/// Newline-delimited series identifiers, for autocompletion.
///
/// The metric-name index is out of scope for this daemon (see spec
/// non-goals), so this formatter can only echo the parameter id a sample
/// resolved to, not the original series text.
#[derive(Debug, Default)]
pub struct SuggestFormatter;

impl Formatter for SuggestFormatter {
    fn format(&mut self, buf: &mut [u8], sample: &Sample) -> usize {
        let line = format!("{}\n", sample.param_id);
        write_if_fits(buf, line.as_bytes())
    }
}

/// JSON-lines `{"id":...}` records, for tag-predicate search.
#[derive(Debug, Default)]
pub struct SearchFormatter;

impl Formatter for SearchFormatter {
    fn format(&mut self, buf: &mut [u8], sample: &Sample) -> usize {
        let line = format!("{{\"id\":{}}}\n", sample.param_id);
        write_if_fits(buf, line.as_bytes())
    }
}

/// Builds the formatter named by `endpoint`.
pub fn make_formatter(endpoint: ApiEndpoint) -> Box<dyn Formatter> {
    match endpoint {
        ApiEndpoint::Query(QueryFormat::Csv) => Box::<CsvQueryFormatter>::default(),
        ApiEndpoint::Query(QueryFormat::Json) => Box::<JsonQueryFormatter>::default(),
        ApiEndpoint::Suggest => Box::<SuggestFormatter>::default(),
        ApiEndpoint::Search => Box::<SearchFormatter>::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_formatter_writes_whole_line_or_nothing() {
        let mut f = CsvQueryFormatter;
        let sample = Sample::scalar(1, 100, 3.5);
        let mut small = [0u8; 2];
        assert_eq!(f.format(&mut small, &sample), 0);

        let mut big = [0u8; 64];
        let n = f.format(&mut big, &sample);
        assert_eq!(&big[..n], b"1,100,3.5\n");
    }

    #[test]
    fn json_formatter_prefixes_comma_after_first_element() {
        let mut f = JsonQueryFormatter::default();
        let sample = Sample::scalar(1, 100, 3.5);
        let mut buf = [0u8; 64];
        let n = f.format(&mut buf, &sample);
        assert_eq!(&buf[..n], b"{\"id\":1,\"ts\":100,\"value\":3.5}");

        let n2 = f.format(&mut buf, &sample);
        assert!(buf[..n2].starts_with(b","));
    }

    #[test]
    fn json_preamble_and_epilogue_are_brackets() {
        let f = JsonQueryFormatter::default();
        assert_eq!(f.preamble(), b"[");
        assert_eq!(f.epilogue(), b"]");
    }

    #[test]
    fn non_json_formatters_have_empty_preamble() {
        assert_eq!(CsvQueryFormatter.preamble(), b"");
        assert_eq!(SuggestFormatter.preamble(), b"");
        assert_eq!(SearchFormatter.preamble(), b"");
    }
}
