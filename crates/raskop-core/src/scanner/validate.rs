//! Structural validation of scanner candidates.
//!
//! A candidate only looks like the start of a `FileDescriptorProto`. This
//! module walks its top-level fields under a hard byte bound and rejects
//! anything carrying a field that `FileDescriptorProto` does not declare,
//! which filters out nearly every coincidental match.

use super::wire::{self, Tag, WireType};
use super::{Candidate, RawDescriptor};
use crate::error::{Error, Result};
use prost::Message;
use prost_types::FileDescriptorProto;
use tracing::trace;

/// Whether `tag` names a declared `FileDescriptorProto` field with a wire type
/// that field can be encoded with.
fn is_known_field(tag: Tag) -> bool {
    match tag.number {
        // name, package, dependency, message_type, enum_type, service,
        // extension, options, source_code_info, syntax
        1..=9 | 12 => tag.wire_type == WireType::Len,
        // public_dependency, weak_dependency: repeated int32, packed or not
        10 | 11 => matches!(tag.wire_type, WireType::Varint | WireType::Len),
        // edition
        14 => tag.wire_type == WireType::Varint,
        _ => false,
    }
}

/// Walk top-level fields and return the length of the message.
///
/// The message ends at a zero tag, an end-group tag, a second name field
/// (the next descriptor starts there) or the end of `window`. The
/// terminating tag itself is not part of the message.
fn message_span(window: &[u8]) -> Result<usize> {
    let mut position = 0;
    let mut seen_name = false;

    while position < window.len() {
        let (tag, tag_len) = wire::read_tag(&window[position..])?;
        let Some(tag) = tag else {
            break;
        };

        if tag.wire_type == WireType::EndGroup {
            break;
        }

        if tag.number == 1 {
            if seen_name {
                trace!("adjacent descriptor at relative offset {}", position);
                break;
            }
            seen_name = true;
        }

        if !is_known_field(tag) {
            return Err(Error::invalid_wire_format(
                position,
                format!(
                    "unrecognized field {} with wire type {:?}",
                    tag.number, tag.wire_type
                ),
            ));
        }

        let value_start = position + tag_len;
        let len = wire::value_len(&window[value_start..], tag.wire_type)
            .map_err(|_| Error::invalid_wire_format(value_start, "field value overruns buffer"))?;
        position = value_start + len;
    }

    Ok(position)
}

/// Whether the tag at the start of `rest` terminates the preceding message
fn ends_message(rest: &[u8]) -> bool {
    match wire::read_tag(rest) {
        Ok((None, _)) => true,
        Ok((Some(tag), _)) => tag.wire_type == WireType::EndGroup || tag.number == 1,
        Err(_) => false,
    }
}

/// Try to decode a descriptor at `candidate`, reading at most `max_size`
/// bytes of `data`.
pub(super) fn validate(
    data: &[u8],
    candidate: &Candidate<'_>,
    max_size: usize,
) -> Option<RawDescriptor> {
    let rest = data.get(candidate.offset..)?;
    let window = &rest[..rest.len().min(max_size)];

    let span = match message_span(window) {
        Ok(span) => span,
        Err(e) => {
            trace!(
                "candidate '{}' at {:#x} rejected: {}",
                candidate.name,
                candidate.offset,
                e
            );
            return None;
        }
    };

    // A walk that stopped only because the size bound cut it short has not
    // seen the real end of the message
    if span == window.len() && rest.len() > window.len() && !ends_message(&rest[span..]) {
        trace!(
            "candidate '{}' at {:#x} exceeds {} bytes",
            candidate.name,
            candidate.offset,
            max_size
        );
        return None;
    }

    let bytes = &window[..span];
    let proto = match FileDescriptorProto::decode(bytes) {
        Ok(proto) => proto,
        Err(e) => {
            trace!(
                "candidate '{}' at {:#x} does not decode: {}",
                candidate.name,
                candidate.offset,
                e
            );
            return None;
        }
    };

    if proto.name().is_empty() || proto.name() != candidate.name {
        return None;
    }

    Some(RawDescriptor::new(
        candidate.name.to_string(),
        bytes.to_vec(),
        candidate.offset,
    ))
}
