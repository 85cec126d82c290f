//! Record-level protobuf wire scanning.
//!
//! Image files are encoded as `FileDescriptorProto` records with one extra
//! field (number 8042) appended. Descriptor decoding has no slot for that
//! field, so it is split out at the wire level before the remaining bytes
//! are handed to the descriptor decoder.
//!
//! Wire types:
//! - 0: VARINT
//! - 1: I64
//! - 2: LEN (strings, bytes, embedded messages, packed repeated fields)
//! - 3/4: group markers (deprecated, carried through untouched)
//! - 5: I32

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum WireType {
    Varint = 0,
    I64 = 1,
    Len = 2,
    StartGroup = 3,
    EndGroup = 4,
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
pub(crate) const MAX_VALID_NUMBER: u32 = 536_870_911;

/// Decode a varint, returning the value and the number of bytes consumed.
pub(crate) fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// Consume a single field at the start of `data`.
///
/// Returns the field number and the total bytes of the record (tag + value).
/// `offset` is only used to report positions in errors.
pub(crate) fn consume_field(data: &[u8], offset: usize) -> Result<(u32, usize)> {
    if data.is_empty() {
        return Err(Error::invalid_wire_format(offset, "empty data"));
    }

    let (tag, tag_len) = decode_varint(data)
        .map_err(|_| Error::invalid_wire_format(offset, "failed to decode field tag"))?;

    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let field_number = (tag >> 3) as u32;

    if field_number == 0 || field_number > MAX_VALID_NUMBER {
        return Err(Error::InvalidFieldNumber {
            number: field_number,
            max: MAX_VALID_NUMBER,
        });
    }

    let value_len = match wire_type {
        WireType::Varint => {
            let (_, varint_len) = decode_varint(&data[tag_len..]).map_err(|_| {
                Error::invalid_wire_format(offset + tag_len, "failed to decode varint value")
            })?;
            varint_len
        }
        WireType::I64 => fixed_len(data, tag_len, 8, offset)?,
        WireType::Len => {
            let (length, length_varint_len) = decode_varint(&data[tag_len..]).map_err(|_| {
                Error::invalid_wire_format(offset + tag_len, "failed to decode length prefix")
            })?;

            let total_value_len = usize::try_from(length)
                .ok()
                .and_then(|length| length.checked_add(length_varint_len))
                .filter(|total| total.checked_add(tag_len).is_some())
                .ok_or_else(|| {
                    Error::invalid_wire_format(offset + tag_len, format!("LEN prefix {} out of range", length))
                })?;
            if data.len() < tag_len + total_value_len {
                return Err(Error::invalid_wire_format(
                    offset + tag_len,
                    format!(
                        "not enough bytes for LEN field (need {}, have {})",
                        length,
                        data.len() - tag_len - length_varint_len
                    ),
                ));
            }
            total_value_len
        }
        // The group markers are carried as standalone records; the fields
        // between them are walked one by one and kept in order.
        WireType::StartGroup | WireType::EndGroup => 0,
        WireType::I32 => fixed_len(data, tag_len, 4, offset)?,
    };

    Ok((field_number, tag_len + value_len))
}

fn fixed_len(data: &[u8], tag_len: usize, width: usize, offset: usize) -> Result<usize> {
    if data.len() < tag_len + width {
        return Err(Error::invalid_wire_format(
            offset + tag_len,
            format!("not enough bytes for {}-byte fixed field", width),
        ));
    }
    Ok(width)
}

/// Split every record of `field_number` out of an encoded message.
///
/// Returns `(rest, extracted)`: `rest` holds all other records in their
/// original order and `extracted` holds the matching records, tags included,
/// so it can be decoded as a message of its own.
pub(crate) fn split_field(data: &[u8], field_number: u32) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rest = Vec::with_capacity(data.len());
    let mut extracted = Vec::new();
    let mut position = 0;

    while position < data.len() {
        let (number, len) = consume_field(&data[position..], position)?;
        let record = &data[position..position + len];
        if number == field_number {
            extracted.extend_from_slice(record);
        } else {
            rest.extend_from_slice(record);
        }
        position += len;
    }

    Ok((rest, extracted))
}
