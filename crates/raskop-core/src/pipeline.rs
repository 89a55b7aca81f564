//! End-to-end extraction: scan every input, build the pool, render.
//!
//! Stages run strictly in order. All inputs are scanned before anything is
//! ingested, because first-seen-wins and import resolution both depend on
//! the complete, input-ordered list of descriptors.

use crate::collector::{Collector, Input};
use crate::diagnostics::DiagnosticsSink;
use crate::error::{Error, Result};
use crate::pool::PoolBuilder;
use crate::render::ProtoRenderer;
use crate::scanner::{ScanStrategy, Scanner, ScannerConfig};
use tracing::debug;

/// Name of the descriptor for `descriptor.proto` itself, linked into every
/// program that uses reflection
pub const WELL_KNOWN_DESCRIPTOR: &str = "google/protobuf/descriptor.proto";

/// Options for one extraction run
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Replace imports that no input provides with placeholder files
    pub allow_unknown_dependencies: bool,
    /// Also render `google/protobuf/descriptor.proto`
    pub include_well_known_descriptor: bool,
    /// Scanner limits
    pub scanner: ScannerConfig,
}

impl RunConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether missing imports are replaced by placeholders
    pub fn allow_unknown_dependencies(mut self, allow: bool) -> Self {
        self.allow_unknown_dependencies = allow;
        self
    }

    /// Sets whether `descriptor.proto` is rendered
    pub fn include_well_known_descriptor(mut self, include: bool) -> Self {
        self.include_well_known_descriptor = include;
        self
    }

    /// Sets the scanner configuration
    pub fn scanner(mut self, scanner: ScannerConfig) -> Self {
        self.scanner = scanner;
        self
    }
}

/// One rendered `.proto` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Descriptor name, usable as a relative output path
    pub name: String,
    /// Rendered `.proto` source
    pub text: String,
    /// Number of top-level message types
    pub message_types: usize,
}

/// Result of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Rendered files in collection order
    pub files: Vec<RenderedFile>,
    /// Number of files rendered
    pub files_rendered: usize,
    /// Top-level message types across all rendered files
    pub message_types_rendered: usize,
}

/// Scans inputs and renders every descriptor they contain
pub struct Pipeline<'c> {
    config: &'c RunConfig,
    scanner: Box<dyn ScanStrategy + 'c>,
    renderer: ProtoRenderer,
}

impl<'c> Pipeline<'c> {
    /// Creates a pipeline using the default scanner
    pub fn new(config: &'c RunConfig) -> Self {
        Self {
            config,
            scanner: Box::new(Scanner::with_config(config.scanner.clone())),
            renderer: ProtoRenderer::new(),
        }
    }

    /// Replace the scanning strategy
    pub fn with_scanner(mut self, scanner: impl ScanStrategy + 'c) -> Self {
        self.scanner = Box::new(scanner);
        self
    }

    /// Replace the renderer
    pub fn with_renderer(mut self, renderer: ProtoRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Scan `inputs` in order without building anything
    pub fn collect(&self, inputs: &[Input<'_>], sink: &mut dyn DiagnosticsSink) -> Collector {
        let mut collector = Collector::new();
        let total = collector.collect_all(inputs, self.scanner.as_ref(), sink);
        debug!("collected {} descriptor(s) from {} input(s)", total, inputs.len());
        collector
    }

    /// Run every stage. Any resolution failure aborts with no output.
    pub fn run(&self, inputs: &[Input<'_>], sink: &mut dyn DiagnosticsSink) -> Result<RunOutput> {
        let collector = self.collect(inputs, sink);

        let mut builder = PoolBuilder::new(self.config.allow_unknown_dependencies);
        let stats = builder.ingest_all(collector.descriptors())?;
        debug!(
            "database holds {} file(s), {} duplicate(s) ignored",
            stats.inserted, stats.duplicates
        );

        let mut output = RunOutput::default();
        for raw in collector.descriptors() {
            if raw.name == WELL_KNOWN_DESCRIPTOR && !self.config.include_well_known_descriptor {
                continue;
            }

            let file = builder.resolve(&raw.name).map_err(|e| match e {
                Error::NotCollected(name) => {
                    Error::internal(format!("collected descriptor '{}' is not in the pool", name))
                }
                other => other,
            })?;

            let message_types = file.messages().count();
            output.message_types_rendered += message_types;
            output.files_rendered += 1;
            output.files.push(RenderedFile {
                name: raw.name.clone(),
                text: self.renderer.render(&file),
                message_types,
            });
        }

        if !builder.placeholders().is_empty() {
            debug!(
                "{} placeholder(s) substituted: {}",
                builder.placeholders().len(),
                builder.placeholders().join(", ")
            );
        }

        Ok(output)
    }
}

/// Run the default pipeline over `inputs`
pub fn run(
    inputs: &[Input<'_>],
    config: &RunConfig,
    sink: &mut dyn DiagnosticsSink,
) -> Result<RunOutput> {
    Pipeline::new(config).run(inputs, sink)
}
