//! Diagnostics sinks.
//!
//! The collector reports every input it starts and every descriptor it
//! finds to a [`DiagnosticsSink`] supplied by the caller.

use tracing::info;

/// Receives per-input and per-descriptor scan events
pub trait DiagnosticsSink {
    /// A new input buffer is about to be scanned
    fn input_started(&mut self, name: &str, len: usize) {
        let _ = (name, len);
    }

    /// A descriptor was validated at `offset` with the given encoded length
    fn descriptor_found(&mut self, offset: usize, name: &str, byte_len: usize) {
        let _ = (offset, name, byte_len);
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {}

/// Logs every event at `info` level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn input_started(&mut self, name: &str, len: usize) {
        info!("processing {} ({} bytes)", name, len);
    }

    fn descriptor_found(&mut self, offset: usize, name: &str, byte_len: usize) {
        info!("found {} @ {:#x} size {}", name, offset, byte_len);
    }
}

/// One recorded descriptor event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundEvent {
    /// Input the descriptor was found in
    pub input: String,
    /// Offset inside that input
    pub offset: usize,
    /// Descriptor file name
    pub name: String,
    /// Encoded length in bytes
    pub byte_len: usize,
}

/// Keeps every descriptor event in order
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    current_input: String,
    /// Events in the order they were reported
    pub events: Vec<FoundEvent>,
}

impl DiagnosticsSink for RecordingSink {
    fn input_started(&mut self, name: &str, _len: usize) {
        self.current_input = name.to_string();
    }

    fn descriptor_found(&mut self, offset: usize, name: &str, byte_len: usize) {
        self.events.push(FoundEvent {
            input: self.current_input.clone(),
            offset,
            name: name.to_string(),
            byte_len,
        });
    }
}
