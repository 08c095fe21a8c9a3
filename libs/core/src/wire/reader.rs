use crate::error::{Error, Result};
use crate::wire::{ValueType, WireMap, WireValue};

/// Deepest map nesting accepted from a peer
pub const MAX_NESTING: usize = 16;

/// One token read from a wire-value frame
#[derive(Debug, Clone, PartialEq)]
pub enum WireField {
    Start { key: String },
    End,
    Value { key: String, value: WireValue },
}

/// Streaming field reader, the inverse of [`crate::wire::WireWriter`]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Read the next field, `None` once the input is exhausted
    pub fn next_field(&mut self) -> Result<Option<WireField>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        let value_type = ValueType::from_code(self.take_array::<1>()?[0])?;
        if value_type == ValueType::EndMarker {
            return Ok(Some(WireField::End));
        }

        let key = self.read_string()?;
        let value = match value_type {
            ValueType::StartMarker => return Ok(Some(WireField::Start { key })),
            ValueType::Bool => WireValue::Bool(self.take_array::<1>()?[0] != 0),
            ValueType::Byte => WireValue::Byte(self.take_array::<1>()?[0]),
            ValueType::Short => WireValue::Short(i16::from_le_bytes(self.take_array()?)),
            ValueType::Int => WireValue::Int(i32::from_le_bytes(self.take_array()?)),
            ValueType::Long => WireValue::Long(i64::from_le_bytes(self.take_array()?)),
            ValueType::Float => WireValue::Float(f32::from_le_bytes(self.take_array()?)),
            ValueType::Double => WireValue::Double(f64::from_le_bytes(self.take_array()?)),
            ValueType::String => WireValue::String(self.read_string()?),
            ValueType::EndMarker => return Ok(Some(WireField::End)),
        };
        Ok(Some(WireField::Value { key, value }))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Truncated {
                offset: self.pos,
                needed: n,
            });
        }
        let bytes = self.bytes;
        let slice = &bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_string(&mut self) -> Result<String> {
        let offset = self.pos;
        let len = i32::from_le_bytes(self.take_array()?);
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len >= 1)
            .ok_or(Error::Truncated { offset, needed: 1 })?;
        let raw = self.take(len)?;
        let (text, terminator) = raw.split_at(len - 1);
        if terminator != [0u8] {
            return Err(Error::custom(format!(
                "string at offset {offset} is not NUL-terminated"
            )));
        }
        String::from_utf8(text.to_vec()).map_err(|_| Error::InvalidUtf8)
    }
}

/// Decode one frame produced by [`crate::wire::encode_map`]
///
/// A small recursive-descent decoder over strings, ints, longs, booleans
/// and nested maps. Other scalar types are rejected.
pub fn decode_map(bytes: &[u8]) -> Result<WireMap> {
    let mut reader = WireReader::new(bytes);
    match reader.next_field()? {
        Some(WireField::Start { .. }) => {}
        Some(_) => {
            return Err(Error::UnbalancedMarkers(
                "frame does not open with a start marker".to_string(),
            ))
        }
        None => return Err(Error::Truncated { offset: 0, needed: 1 }),
    }

    let map = read_entries(&mut reader, 1)?;
    if reader.remaining() != 0 {
        return Err(Error::UnbalancedMarkers(format!(
            "{} trailing bytes after end marker",
            reader.remaining()
        )));
    }
    Ok(map)
}

fn read_entries(reader: &mut WireReader<'_>, depth: usize) -> Result<WireMap> {
    if depth > MAX_NESTING {
        return Err(Error::UnbalancedMarkers(format!(
            "nesting deeper than {MAX_NESTING}"
        )));
    }

    let mut map = WireMap::new();
    loop {
        let (key, value) = match reader.next_field()? {
            None => {
                return Err(Error::UnbalancedMarkers(
                    "missing end marker".to_string(),
                ))
            }
            Some(WireField::End) => return Ok(map),
            Some(WireField::Start { key }) => {
                let nested = read_entries(reader, depth + 1)?;
                (key, WireValue::Map(nested))
            }
            Some(WireField::Value { key, value }) => match value {
                WireValue::String(_)
                | WireValue::Int(_)
                | WireValue::Long(_)
                | WireValue::Bool(_) => (key, value),
                other => {
                    return Err(Error::UnsupportedValueType {
                        key,
                        value_type: other.value_type(),
                    })
                }
            },
        };

        if map.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        map.push(key, value);
    }
}
