//! Binary scanning module for finding embedded protobuf descriptors.
//!
//! ## Algorithm Overview
//!
//! 1. Look for the magic byte `0x0A` (field 1, wire type LEN)
//! 2. Read the next byte as a single-byte length `sz` of the file name
//! 3. Check that the `sz` name bytes exist and end in `.proto`
//! 4. Hand the position to the validator, which walks the message fields
//!    and decodes them as a `FileDescriptorProto`
//! 5. On success skip past the descriptor, otherwise advance one byte
//!
//! Every access goes through `slice::get`, so a truncated candidate at the
//! end of a buffer is a non-match rather than an out-of-bounds read.
//!
//! ## Extensibility
//!
//! The [`ScanStrategy`] trait allows custom scanning algorithms:
//!
//! ```no_run
//! use raskop_core::scanner::{RawDescriptor, ScanStrategy};
//!
//! struct CustomScanner;
//!
//! impl ScanStrategy for CustomScanner {
//!     fn scan(&self, data: &[u8]) -> Vec<RawDescriptor> {
//!         Vec::new()
//!     }
//! }
//! ```

mod validate;
mod wire;

use std::ops::Range;
use tracing::{debug, trace};

pub use wire::{consume_field, decode_varint, read_tag, value_len, Tag, WireType, MAX_VALID_NUMBER};

/// File name suffix every descriptor name must carry
const PROTO_SUFFIX: &[u8] = b".proto";

/// Magic byte indicating start of FileDescriptorProto
/// This is field 1 (name) with wire type 2 (LEN): (1 << 3) | 2 = 0x0A
const MAGIC_BYTE: u8 = 0x0A;

/// A validated descriptor found in an input buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDescriptor {
    /// File name declared by the descriptor, e.g. `google/protobuf/any.proto`
    pub name: String,
    /// The exact encoded bytes of the `FileDescriptorProto`
    pub bytes: Vec<u8>,
    /// Offset of the first byte inside the scanned buffer
    pub offset: usize,
}

impl RawDescriptor {
    /// Creates a new raw descriptor
    pub fn new(name: String, bytes: Vec<u8>, offset: usize) -> Self {
        Self {
            name,
            bytes,
            offset,
        }
    }

    /// Returns the encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte range in the scanned buffer
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.bytes.len()
    }
}

/// A position that passed the byte heuristic but has not been validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// Offset of the magic byte
    pub offset: usize,
    /// The `.proto` file name the heuristic read
    pub name: &'a str,
}

/// Check the byte heuristic at `offset`.
///
/// Names shorter than the `.proto` suffix are rejected outright.
pub fn candidate_at(data: &[u8], offset: usize) -> Option<Candidate<'_>> {
    if *data.get(offset)? != MAGIC_BYTE {
        return None;
    }

    let sz = *data.get(offset.checked_add(1)?)?;
    if sz >= 0x80 || (sz as usize) < PROTO_SUFFIX.len() {
        return None;
    }

    let start = offset.checked_add(2)?;
    let name = data.get(start..start.checked_add(sz as usize)?)?;
    if !name.ends_with(PROTO_SUFFIX) {
        return None;
    }

    let name = std::str::from_utf8(name).ok()?;
    Some(Candidate { offset, name })
}

/// Lazy iterator over plausible descriptor starts in a buffer
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Candidates<'a> {
    /// Starts a scan at the beginning of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Continue the scan at `position` instead of the byte after the last
    /// candidate. Positions behind the cursor are ignored.
    pub fn resume_at(&mut self, position: usize) {
        self.position = self.position.max(position);
    }
}

impl<'a> Iterator for Candidates<'a> {
    type Item = Candidate<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(rest) = self.data.get(self.position..) {
            let at = self.position + rest.iter().position(|&b| b == MAGIC_BYTE)?;
            self.position = at + 1;

            if let Some(candidate) = candidate_at(self.data, at) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Maximum number of descriptors to find per buffer (0 = unlimited)
    pub max_results: usize,
    /// Maximum number of bytes the validator may read for one descriptor
    pub max_descriptor_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_results: 0,
            max_descriptor_size: Self::DEFAULT_MAX_DESCRIPTOR_SIZE,
        }
    }
}

impl ScannerConfig {
    /// Default bound on a single descriptor (10 MB)
    pub const DEFAULT_MAX_DESCRIPTOR_SIZE: usize = 10 * 1024 * 1024;

    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of results to return
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Sets the maximum descriptor size
    pub fn max_descriptor_size(mut self, size: usize) -> Self {
        self.max_descriptor_size = size;
        self
    }
}

/// Trait for implementing custom scanning strategies
///
/// Scanning is infallible: anything that does not validate is skipped.
pub trait ScanStrategy {
    /// Scan the provided data for protobuf descriptors, in offset order
    fn scan(&self, data: &[u8]) -> Vec<RawDescriptor>;
}

/// Primary scanner for finding embedded protobuf descriptors
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Creates a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }
}

impl ScanStrategy for Scanner {
    fn scan(&self, data: &[u8]) -> Vec<RawDescriptor> {
        let mut results = Vec::new();
        let mut candidates = Candidates::new(data);

        debug!("Starting scan of {} bytes", data.len());

        while let Some(candidate) = candidates.next() {
            trace!("Candidate '{}' at {:#x}", candidate.name, candidate.offset);

            let Some(raw) = validate::validate(data, &candidate, self.config.max_descriptor_size)
            else {
                continue;
            };

            debug!(
                "Found descriptor '{}' at {:#x} ({} bytes)",
                raw.name,
                raw.offset,
                raw.bytes.len()
            );

            candidates.resume_at(raw.range().end);
            results.push(raw);

            if self.config.max_results > 0 && results.len() >= self.config.max_results {
                break;
            }
        }

        debug!("Scan complete: found {} descriptors", results.len());
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use prost_types::{DescriptorProto, FileDescriptorProto};

    fn encoded(name: &str) -> Vec<u8> {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some("scan.test".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Item".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
        .encode_to_vec()
    }

    /// Deterministic filler that never contains the magic byte or a NUL
    fn filler(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                match (state >> 16) as u8 {
                    MAGIC_BYTE | 0x00 => 0x5A,
                    b => b,
                }
            })
            .collect()
    }

    #[test]
    fn test_scanner_config_builder() {
        let config = ScannerConfig::new().max_results(10).max_descriptor_size(1000);
        assert_eq!(config.max_results, 10);
        assert_eq!(config.max_descriptor_size, 1000);
    }

    #[test]
    fn test_empty_input() {
        assert!(Scanner::new().scan(&[]).is_empty());
    }

    #[test]
    fn test_no_pattern() {
        let data = b"this is just some random data without any protobuf content";
        assert!(Scanner::new().scan(data).is_empty());
        assert!(Scanner::new().scan(&filler(4096, 7)).is_empty());
    }

    #[test]
    fn test_candidate_heuristic() {
        assert_eq!(
            candidate_at(b"\x0a\x07a.proto", 0),
            Some(Candidate {
                offset: 0,
                name: "a.proto"
            })
        );
        assert_eq!(candidate_at(b"\x0a\x07a.protx", 0), None);
        assert_eq!(candidate_at(b"\x0b\x07a.proto", 0), None);
        // High bit set: multi-byte length is not handled
        assert_eq!(candidate_at(b"\x0a\x87a.proto", 0), None);
        // Invalid UTF-8 in the name
        assert_eq!(candidate_at(b"\x0a\x07\xff.proto", 0), None);
    }

    #[test]
    fn test_short_lengths_never_match() {
        // A name that is exactly the suffix is allowed
        assert!(candidate_at(b"\x0a\x06.proto", 0).is_some());
        for sz in 0u8..6 {
            let mut data = vec![MAGIC_BYTE, sz];
            data.extend_from_slice(b".proto.proto");
            assert_eq!(candidate_at(&data, 0), None, "sz = {}", sz);
        }
    }

    #[test]
    fn test_truncated_candidate_at_every_length() {
        let full = b"\x0a\x0bhello.proto";
        for cut in 0..full.len() {
            assert_eq!(candidate_at(&full[..cut], 0), None, "cut = {}", cut);
            assert!(Candidates::new(&full[..cut]).next().is_none());
        }
        assert!(candidate_at(full, 0).is_some());
        assert!(candidate_at(full, usize::MAX).is_none());
    }

    #[test]
    fn test_truncated_descriptor_at_every_length() {
        let bytes = encoded("cut/me.proto");
        let name_end = 2 + "cut/me.proto".len();
        for cut in 0..bytes.len() {
            let found = Scanner::new().scan(&bytes[..cut]);
            if cut < name_end {
                assert!(found.is_empty(), "cut = {}", cut);
            } else {
                // Cutting on a field boundary leaves a shorter, still valid
                // descriptor; cutting inside a field leaves nothing
                assert!(found.len() <= 1, "cut = {}", cut);
                if let Some(raw) = found.first() {
                    assert_eq!(raw.offset, 0);
                    assert!(bytes.starts_with(&raw.bytes));
                }
            }
        }
        assert_eq!(Scanner::new().scan(&bytes)[0].bytes, bytes);
    }

    #[test]
    fn test_recovers_embedded_descriptor_at_any_offset() {
        let bytes = encoded("deep/inside.proto");
        for (seed, prefix) in [0usize, 1, 2, 17, 255, 1000].into_iter().enumerate() {
            let mut data = filler(prefix, seed as u32);
            data.extend_from_slice(&bytes);
            data.push(0x00);
            data.extend_from_slice(&filler(64, seed as u32 + 100));

            let found = Scanner::new().scan(&data);
            assert_eq!(found.len(), 1, "prefix = {}", prefix);
            assert_eq!(found[0].name, "deep/inside.proto");
            assert_eq!(found[0].offset, prefix);
            assert_eq!(found[0].bytes, bytes);
        }
    }

    #[test]
    fn test_adjacent_and_separated_descriptors() {
        let a = encoded("a.proto");
        let b = encoded("b.proto");
        let c = encoded("c.proto");

        let mut data = a.clone();
        data.extend_from_slice(&b);
        data.extend_from_slice(&[0x00; 8]);
        data.extend_from_slice(&c);

        let found = Scanner::new().scan(&data);
        let names: Vec<_> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a.proto", "b.proto", "c.proto"]);
        assert_eq!(found[1].offset, a.len());
        assert_eq!(found[2].offset, a.len() + b.len() + 8);
    }

    #[test]
    fn test_failed_candidate_advances_single_byte() {
        // A plausible candidate whose next tag runs into the real descriptor
        // and decodes to an invalid wire type
        let real = encoded("x.proto");
        let mut data = b"\x0a\x07a.proto\xff\xff".to_vec();
        data.extend_from_slice(&real);
        data.push(0x00);

        let found = Scanner::new().scan(&data);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "x.proto");
        assert_eq!(found[0].offset, 11);
    }

    #[test]
    fn test_max_results() {
        let mut data = encoded("a.proto");
        data.extend_from_slice(&encoded("b.proto"));
        let scanner = Scanner::with_config(ScannerConfig::new().max_results(1));
        assert_eq!(scanner.scan(&data).len(), 1);
    }
}
