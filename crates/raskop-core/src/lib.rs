//! # raskop-core
//!
//! A library for digging Protocol Buffer file descriptors out of compiled
//! binaries and turning them back into `.proto` source.
//!
//! ## Architecture
//!
//! Data flows through the modules in one direction:
//!
//! - [`scanner`]: finds candidate descriptors in a byte buffer and validates them
//! - [`collector`]: gathers validated descriptors across all inputs, in order
//! - [`pool`]: deduplicates by name (first seen wins) and resolves imports
//! - [`render`]: prints resolved descriptors as `.proto` text
//! - [`pipeline`]: runs the stages above end to end
//! - [`diagnostics`]: sinks that observe the scan
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```no_run
//! use raskop_core::{run, Input, NullSink, RunConfig};
//! use std::fs;
//!
//! let data = fs::read("./target/release/my_app")?;
//! let config = RunConfig::new().allow_unknown_dependencies(true);
//!
//! let output = run(&[Input::new("my_app", &data)], &config, &mut NullSink)?;
//! for file in &output.files {
//!     println!("// {}\n{}", file.name, file.text);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod collector;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod render;
pub mod scanner;

// Re-export primary types for convenience
pub use collector::{Collector, Input};
pub use diagnostics::{DiagnosticsSink, FoundEvent, NullSink, RecordingSink, TracingSink};
pub use error::{Error, Result};
pub use pipeline::{run, Pipeline, RenderedFile, RunConfig, RunOutput, WELL_KNOWN_DESCRIPTOR};
pub use pool::{EncodedDatabase, IngestStats, PoolBuilder, PoolState};
pub use render::{ProtoRenderer, RenderConfig};
pub use scanner::{RawDescriptor, ScanStrategy, Scanner, ScannerConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
/// Used for `max` in reserved and extension ranges
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;
