//! Low-level protobuf wire format reading.
//!
//! Just enough of the wire format to walk the top-level fields of a message
//! and find where it ends. Every read is checked against the slice it is
//! given; running out of bytes is an error, never a panic.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (deprecated groups)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_VALID_NUMBER: u32 = 536_870_911;

/// Varints are at most 10 bytes for a 64-bit value
const MAX_VARINT_LEN: usize = 10;

/// A decoded field tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number, 1..=MAX_VALID_NUMBER
    pub number: u32,
    /// Physical encoding of the value that follows
    pub wire_type: WireType,
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        result |= ((byte & 0x7F) as u64) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len().min(MAX_VARINT_LEN)))
}

/// Read the tag at the start of `data`.
///
/// A zero tag marks the end of a message and is returned as `None`
/// together with its encoded length.
pub fn read_tag(data: &[u8]) -> Result<(Option<Tag>, usize)> {
    let (raw, tag_len) = decode_varint(data)?;
    if raw == 0 {
        return Ok((None, tag_len));
    }

    let wire_type = WireType::try_from((raw & 0x07) as u8)?;
    let number = raw >> 3;
    if number == 0 || number > MAX_VALID_NUMBER as u64 {
        return Err(Error::InvalidFieldNumber {
            number,
            max: MAX_VALID_NUMBER,
        });
    }

    Ok((
        Some(Tag {
            number: number as u32,
            wire_type,
        }),
        tag_len,
    ))
}

/// Length of the value that follows a tag of the given wire type.
///
/// `value` starts right after the tag. Fails if the value does not fit.
pub fn value_len(value: &[u8], wire_type: WireType) -> Result<usize> {
    let fixed = |width: usize| {
        if value.len() < width {
            Err(Error::invalid_wire_format(
                0,
                format!("need {} bytes, have {}", width, value.len()),
            ))
        } else {
            Ok(width)
        }
    };

    match wire_type {
        WireType::Varint => decode_varint(value).map(|(_, len)| len),
        WireType::I64 => fixed(8),
        WireType::I32 => fixed(4),
        WireType::Len => {
            let (length, prefix_len) = decode_varint(value)?;
            let total = usize::try_from(length)
                .ok()
                .and_then(|length| length.checked_add(prefix_len))
                .filter(|&total| total <= value.len())
                .ok_or_else(|| {
                    Error::invalid_wire_format(
                        prefix_len,
                        format!(
                            "LEN field of {} bytes overruns the {} available",
                            length,
                            value.len() - prefix_len
                        ),
                    )
                })?;
            Ok(total)
        }
        WireType::EndGroup => Ok(0),
        WireType::StartGroup => Err(Error::invalid_wire_format(
            0,
            "group fields cannot be skipped without a schema",
        )),
    }
}

/// Consume a single protobuf field from the data.
///
/// Returns the tag and total bytes consumed (tag and value). A zero tag is an
/// error here; callers that treat it as a terminator use [`read_tag`] first.
pub fn consume_field(data: &[u8]) -> Result<(Tag, usize)> {
    let (tag, tag_len) = read_tag(data)?;
    let tag = tag.ok_or(Error::InvalidFieldNumber {
        number: 0,
        max: MAX_VALID_NUMBER,
    })?;
    let len = value_len(&data[tag_len..], tag.wire_type)
        .map_err(|e| shift_offset(e, tag_len))?;
    Ok((tag, tag_len + len))
}

fn shift_offset(err: Error, by: usize) -> Error {
    match err {
        Error::InvalidWireFormat { offset, details } => Error::InvalidWireFormat {
            offset: offset + by,
            details,
        },
        Error::VarintDecode { offset } => Error::VarintDecode {
            offset: offset + by,
        },
        other => other,
    }
}
