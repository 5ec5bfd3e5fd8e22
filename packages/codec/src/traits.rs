//! Trait seams between capture, encoders and output sinks.

use crate::CodecError;

/// A video encoder backend.
///
/// Implementations own their hardware session and push coded output to
/// the sinks registered at construction; `submit_frame` never blocks on
/// network or disk I/O.
pub trait VideoEncoder: Send {
    /// Submit one raw frame in the configured source format.
    ///
    /// Frames whose byte length does not match the negotiated format are
    /// logged and dropped without error. Returns `false` when the encoder
    /// wants the caller to begin shutdown.
    fn submit_frame(&mut self, frame: &[u8]) -> Result<bool, CodecError>;

    /// Block until every in-flight frame has been delivered to the sinks.
    fn flush(&mut self) -> Result<(), CodecError>;
}

/// A consumer of coded H.264 output.
///
/// Sinks receive every coded segment the encoder produces. A sink whose
/// target is disabled must treat `deliver` as a no-op and must not
/// allocate; delivery order across sinks carries no meaning.
pub trait CodedSink: Send {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Offer one coded segment (Annex-B bytes) to the sink.
    fn deliver(&mut self, data: &[u8], is_keyframe: bool);
}

/// The fixed fan-out list of output sinks.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn CodedSink>>,
}

impl SinkSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink. Registration order is fixed for the session.
    pub fn push(&mut self, sink: Box<dyn CodedSink>) {
        self.sinks.push(sink);
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Offer `data` to every registered sink.
    pub fn deliver(&mut self, data: &[u8], is_keyframe: bool) {
        for sink in &mut self.sinks {
            sink.deliver(data, is_keyframe);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink with an optional target, mirroring the real network sinks: a
    /// `None` target means disabled and delivery must do nothing.
    struct RecordingSink {
        target: Option<Arc<Mutex<Vec<(Vec<u8>, bool)>>>>,
    }

    impl CodedSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn deliver(&mut self, data: &[u8], is_keyframe: bool) {
            let Some(target) = &self.target else {
                return;
            };
            target.lock().unwrap().push((data.to_vec(), is_keyframe));
        }
    }

    #[test]
    fn test_disabled_sink_is_noop_and_enabled_gets_exact_bytes() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkSet::new();
        sinks.push(Box::new(RecordingSink { target: None }));
        sinks.push(Box::new(RecordingSink {
            target: Some(Arc::clone(&received)),
        }));

        let payload = vec![0x00, 0x00, 0x00, 0x01, 0x65, 0xAA, 0xBB];
        sinks.deliver(&payload, true);
        sinks.deliver(&payload[..5], false);

        let got = received.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], (payload.clone(), true));
        assert_eq!(got[1], (payload[..5].to_vec(), false));
    }

    #[test]
    fn test_every_sink_sees_every_buffer() {
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkSet::new();
        sinks.push(Box::new(RecordingSink {
            target: Some(Arc::clone(&a)),
        }));
        sinks.push(Box::new(RecordingSink {
            target: Some(Arc::clone(&b)),
        }));

        sinks.deliver(&[1, 2, 3], false);
        assert_eq!(a.lock().unwrap().len(), 1);
        assert_eq!(*a.lock().unwrap(), *b.lock().unwrap());
    }
}
