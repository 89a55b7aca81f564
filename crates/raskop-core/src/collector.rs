//! Accumulation of descriptors across input buffers.

use crate::diagnostics::DiagnosticsSink;
use crate::scanner::{RawDescriptor, ScanStrategy};
use tracing::debug;

/// A named, already loaded input buffer
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    /// Display name, usually the file path
    pub name: &'a str,
    /// The buffer contents
    pub data: &'a [u8],
}

impl<'a> Input<'a> {
    /// Creates a new input
    pub fn new(name: &'a str, data: &'a [u8]) -> Self {
        Self { name, data }
    }
}

/// Ordered list of every descriptor found, duplicates included.
///
/// Order is input order first, offset order within an input.
#[derive(Debug, Default, Clone)]
pub struct Collector {
    descriptors: Vec<RawDescriptor>,
}

impl Collector {
    /// Creates an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan one input and append what it contains
    pub fn collect(
        &mut self,
        input: &Input<'_>,
        scanner: &dyn ScanStrategy,
        sink: &mut dyn DiagnosticsSink,
    ) -> usize {
        sink.input_started(input.name, input.data.len());

        let found = scanner.scan(input.data);
        for raw in &found {
            sink.descriptor_found(raw.offset, &raw.name, raw.bytes.len());
        }

        debug!("{}: {} descriptor(s)", input.name, found.len());
        let count = found.len();
        self.descriptors.extend(found);
        count
    }

    /// Scan every input in order
    pub fn collect_all(
        &mut self,
        inputs: &[Input<'_>],
        scanner: &dyn ScanStrategy,
        sink: &mut dyn DiagnosticsSink,
    ) -> usize {
        inputs
            .iter()
            .map(|input| self.collect(input, scanner, sink))
            .sum()
    }

    /// Descriptors collected so far
    pub fn descriptors(&self) -> &[RawDescriptor] {
        &self.descriptors
    }

    /// Number of descriptors collected so far
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Consumes the collector, returning the descriptors
    pub fn into_descriptors(self) -> Vec<RawDescriptor> {
        self.descriptors
    }
}
