//! Descriptor database and dependency resolution.
//!
//! Collected descriptors go through two phases:
//!
//! 1. **Ingestion** into an [`EncodedDatabase`], keyed by file name. The
//!    first descriptor seen under a name wins; later ones are ignored.
//! 2. **Resolution** into a `prost_reflect::DescriptorPool`. Resolving a file
//!    resolves its imports first, so type references across files are
//!    checked. Imports that no input provided either fail the resolution or,
//!    when allowed, are replaced by placeholder files.
//!
//! Once the first resolution starts the pool is sealed; further ingestion
//! would invalidate files that were already built against the database.

mod placeholder;

use crate::error::{Error, Result};
use crate::scanner::RawDescriptor;
use placeholder::PlaceholderPlan;
use prost::Message;
use prost_reflect::{DescriptorPool, FileDescriptor};
use prost_types::FileDescriptorProto;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Encoded descriptors keyed by file name, in insertion order
#[derive(Debug, Default, Clone)]
pub struct EncodedDatabase {
    entries: HashMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl EncodedDatabase {
    /// Creates an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `bytes` under `name` unless the name is already present.
    ///
    /// Returns whether the entry was inserted. Fails with
    /// [`Error::DescriptorParse`] if the bytes do not decode, and with
    /// [`Error::InvalidEntry`] if they declare a different name.
    pub fn add(&mut self, name: &str, bytes: &[u8]) -> Result<bool> {
        if self.entries.contains_key(name) {
            return Ok(false);
        }

        let proto = FileDescriptorProto::decode(bytes)?;
        if name.is_empty() || proto.name() != name {
            return Err(Error::invalid_entry(
                name,
                format!("descriptor declares the name '{}'", proto.name()),
            ));
        }

        self.entries.insert(name.to_string(), bytes.to_vec());
        self.order.push(name.to_string());
        Ok(true)
    }

    /// Encoded bytes stored under `name`
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Whether `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the database has no entries
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Decode the entry stored under `name`
    pub fn decode(&self, name: &str) -> Result<Option<FileDescriptorProto>> {
        self.get(name)
            .map(FileDescriptorProto::decode)
            .transpose()
            .map_err(Error::from)
    }

    fn decode_all(&self) -> Result<Vec<FileDescriptorProto>> {
        self.order
            .iter()
            .map(|name| FileDescriptorProto::decode(self.entries[name].as_slice()).map_err(Error::from))
            .collect()
    }
}

/// Lifecycle of a [`PoolBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Nothing ingested yet
    Empty,
    /// Accepting descriptors
    Ingesting,
    /// Resolution has started; no more ingestion
    Built,
}

/// Counts from an ingestion pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Descriptors stored in the database
    pub inserted: usize,
    /// Descriptors ignored because their name was already present
    pub duplicates: usize,
}

/// Builds resolved file descriptors from collected descriptors
#[derive(Debug)]
pub struct PoolBuilder {
    database: EncodedDatabase,
    pool: DescriptorPool,
    allow_unknown_dependencies: bool,
    state: PoolState,
    plan: Option<PlaceholderPlan>,
    placeholders: Vec<String>,
    decoded: usize,
}

impl PoolBuilder {
    /// Creates an empty builder
    pub fn new(allow_unknown_dependencies: bool) -> Self {
        Self {
            database: EncodedDatabase::new(),
            pool: DescriptorPool::new(),
            allow_unknown_dependencies,
            state: PoolState::Empty,
            plan: None,
            placeholders: Vec::new(),
            decoded: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        self.state
    }

    /// The underlying database
    pub fn database(&self) -> &EncodedDatabase {
        &self.database
    }

    /// Names of the placeholder files substituted so far
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// How many database entries have been decoded for resolution
    pub fn decoded_count(&self) -> usize {
        self.decoded
    }

    /// Ingest one descriptor. Returns whether it was stored.
    pub fn ingest(&mut self, raw: &RawDescriptor) -> Result<bool> {
        if self.state == PoolState::Built {
            return Err(Error::PoolSealed(raw.name.clone()));
        }
        self.state = PoolState::Ingesting;

        if self.database.add(&raw.name, &raw.bytes)? {
            trace!("ingested {} ({} bytes)", raw.name, raw.bytes.len());
            return Ok(true);
        }

        if self.database.get(&raw.name) == Some(raw.as_bytes()) {
            debug!("skipping identical copy of {}", raw.name);
        } else {
            warn!(
                "{} at {:#x} differs from the first copy seen; keeping the first",
                raw.name, raw.offset
            );
        }
        Ok(false)
    }

    /// Ingest descriptors in order
    pub fn ingest_all<'a>(
        &mut self,
        descriptors: impl IntoIterator<Item = &'a RawDescriptor>,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        for raw in descriptors {
            if self.ingest(raw)? {
                stats.inserted += 1;
            } else {
                stats.duplicates += 1;
            }
        }
        Ok(stats)
    }

    /// Resolve a collected file and everything it imports.
    ///
    /// Resolving the same name again returns the cached descriptor.
    pub fn resolve(&mut self, name: &str) -> Result<FileDescriptor> {
        self.state = PoolState::Built;

        if !self.database.contains(name) {
            return Err(Error::NotCollected(name.to_string()));
        }

        let mut chain = Vec::new();
        self.resolve_file(name, &mut chain)
    }

    fn resolve_file(&mut self, name: &str, chain: &mut Vec<String>) -> Result<FileDescriptor> {
        if let Some(file) = self.pool.get_file_by_name(name) {
            return Ok(file);
        }

        if chain.iter().any(|n| n == name) {
            chain.push(name.to_string());
            return Err(Error::DependencyCycle {
                chain: std::mem::take(chain),
            });
        }

        let proto = self
            .database
            .decode(name)?
            .ok_or_else(|| Error::internal(format!("'{}' vanished from the database", name)))?;
        self.decoded += 1;

        chain.push(name.to_string());
        let mut seen = HashSet::new();
        for dependency in &proto.dependency {
            if !seen.insert(dependency.as_str()) {
                continue;
            }

            if self.database.contains(dependency) {
                self.resolve_file(dependency, chain)?;
            } else if self.allow_unknown_dependencies {
                self.add_placeholder(dependency)?;
            } else {
                return Err(Error::missing_dependency(name, dependency));
            }
        }
        chain.pop();

        self.pool
            .add_file_descriptor_proto(proto)
            .map_err(|e| Error::descriptor_build(name, e))?;
        debug!("resolved {}", name);

        self.pool
            .get_file_by_name(name)
            .ok_or_else(|| Error::internal(format!("'{}' missing from pool after build", name)))
    }

    fn add_placeholder(&mut self, missing: &str) -> Result<()> {
        if self.pool.get_file_by_name(missing).is_some() {
            return Ok(());
        }

        if self.plan.is_none() {
            let files = self.database.decode_all()?;
            let database = &self.database;
            let plan = PlaceholderPlan::new(&files, |name| database.contains(name));
            debug!("planned {} placeholder type(s)", plan.type_count());
            self.plan = Some(plan);
        }

        let files = self
            .plan
            .as_ref()
            .map(|plan| plan.files_for(missing))
            .unwrap_or_default();

        for file in files {
            let file_name = file.name().to_string();
            if self.pool.get_file_by_name(&file_name).is_some() {
                continue;
            }
            self.pool
                .add_file_descriptor_proto(file)
                .map_err(|e| Error::descriptor_build(file_name.as_str(), e))?;
        }

        warn!("{} not found, substituting a placeholder", missing);
        self.placeholders.push(missing.to_string());
        Ok(())
    }
}
