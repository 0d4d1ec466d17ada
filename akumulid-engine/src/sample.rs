//! The value type that crosses every boundary between parser, session and cursor.

/// Shape of a [`Sample`]'s payload, mirrored onto the wire as a flag byte by
/// the ingestion parsers so that a reader does not need to inspect the
/// payload itself to know how many bytes follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleFlags {
    /// Single double-precision value.
    Float = 0b001,
    /// Fixed tuple of double-precision values.
    Tuple = 0b010,
    /// Opaque byte blob.
    Blob = 0b100,
}

/// The tagged payload carried by a [`Sample`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single float, the common case for scalar metrics.
    Float(f64),
    /// A fixed-width tuple of floats (e.g. percentile buckets).
    Tuple(Vec<f64>),
    /// An opaque blob, passed through without interpretation.
    Blob(Vec<u8>),
}

impl Payload {
    /// The flag a parser or formatter would see on the wire for this payload.
    pub fn flags(&self) -> SampleFlags {
        match self {
            Payload::Float(_) => SampleFlags::Float,
            Payload::Tuple(_) => SampleFlags::Tuple,
            Payload::Blob(_) => SampleFlags::Blob,
        }
    }
}

/// One `(series id, timestamp, value)` record. Copied freely; never shared
/// by reference between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Series identifier, assigned by the engine on first sight of a name.
    pub param_id: u64,
    /// Monotonic timestamp, engine-defined units.
    pub timestamp: u64,
    /// The value itself.
    pub payload: Payload,
}

impl Sample {
    /// Creates a new sample.
    pub fn new(param_id: u64, timestamp: u64, payload: Payload) -> Self {
        Self {
            param_id,
            timestamp,
            payload,
        }
    }

    /// Convenience constructor for the common scalar-float case.
    pub fn scalar(param_id: u64, timestamp: u64, value: f64) -> Self {
        Self::new(param_id, timestamp, Payload::Float(value))
    }

    /// The flags this sample would carry on the wire.
    pub fn flags(&self) -> SampleFlags {
        self.payload.flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_match_payload_shape() {
        assert_eq!(Payload::Float(1.0).flags(), SampleFlags::Float);
        assert_eq!(Payload::Tuple(vec![1.0, 2.0]).flags(), SampleFlags::Tuple);
        assert_eq!(Payload::Blob(vec![1, 2, 3]).flags(), SampleFlags::Blob);
    }

    #[test]
    fn scalar_constructor_builds_float_payload() {
        let s = Sample::scalar(42, 100, 3.14);
        assert_eq!(s.param_id, 42);
        assert_eq!(s.timestamp, 100);
        assert_eq!(s.payload, Payload::Float(3.14));
    }
}
