//! Error types for the raskop-core library.
//!
//! Scanning never fails: a candidate that does not validate is simply skipped.
//! Everything here is raised by the pool builder or the pipeline, and every
//! variant aborts the run it occurs in.

use thiserror::Error;

/// Result type alias for raskop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all raskop-core operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Invalid field number in a wire tag
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u64,
        /// Maximum valid field number
        max: u32,
    },

    /// Failed to parse FileDescriptorProto
    #[error("failed to parse FileDescriptorProto: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// An encoded entry could not be added to the descriptor database
    #[error("cannot add descriptor '{name}' to the database: {reason}")]
    InvalidEntry {
        /// Name the entry was collected under
        name: String,
        /// Why the entry was rejected
        reason: String,
    },

    /// Failed to build file descriptor with prost-reflect
    #[error("failed to build file descriptor '{name}': {details}")]
    DescriptorBuild {
        /// File being built
        name: String,
        /// Error reported by the descriptor pool
        details: String,
    },

    /// An import is not present in the database and placeholders are disabled
    #[error("'{file}' imports '{dependency}', which was not found in any input")]
    MissingDependency {
        /// File declaring the import
        file: String,
        /// The import that could not be found
        dependency: String,
    },

    /// Imports form a cycle
    #[error("import cycle detected: {}", .chain.join(" -> "))]
    DependencyCycle {
        /// Files on the cycle, ending with the repeated one
        chain: Vec<String>,
    },

    /// A name was requested from the pool that was never ingested
    #[error("descriptor '{0}' was never collected")]
    NotCollected(String),

    /// Ingestion was attempted after resolution started
    #[error("descriptor pool is sealed: cannot ingest '{0}' after resolution has started")]
    PoolSealed(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new database entry error
    pub fn invalid_entry(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(name: impl Into<String>, details: impl ToString) -> Self {
        Self::DescriptorBuild {
            name: name.into(),
            details: details.to_string(),
        }
    }

    /// Creates a new missing dependency error
    pub fn missing_dependency(file: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependency {
            file: file.into(),
            dependency: dependency.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
