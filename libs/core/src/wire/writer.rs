use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::wire::{ValueType, WireMap, WireValue};

/// Low-level field writer
///
/// Every field is `[type code][key][payload]`. Keys and strings are
/// little-endian `i32` lengths that count a trailing NUL, followed by the
/// UTF-8 bytes and the NUL. Numbers are little-endian. An end marker is a
/// bare type code.
pub struct WireWriter<'a> {
    buf: &'a mut Vec<u8>,
    depth: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf, depth: 0 }
    }

    /// Open a nested map under `key`
    pub fn start(&mut self, key: &str) -> Result<()> {
        self.put_field_header(ValueType::StartMarker, key)?;
        self.depth += 1;
        Ok(())
    }

    /// Close the innermost open map
    pub fn end(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::UnbalancedMarkers(
                "end marker without matching start".to_string(),
            ));
        }
        self.depth -= 1;
        self.buf.push(ValueType::EndMarker.code());
        Ok(())
    }

    /// Write any value, recursing into maps without type restrictions
    pub fn put(&mut self, key: &str, value: &WireValue) -> Result<()> {
        if let WireValue::Map(map) = value {
            self.start(key)?;
            for (k, v) in map.iter() {
                self.put(k, v)?;
            }
            return self.end();
        }

        self.put_field_header(value.value_type(), key)?;
        match value {
            WireValue::Bool(v) => self.buf.push(u8::from(*v)),
            WireValue::Byte(v) => self.buf.push(*v),
            WireValue::Short(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            WireValue::Int(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            WireValue::Long(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            WireValue::Float(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            WireValue::Double(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            WireValue::String(v) => self.put_string(v)?,
            WireValue::Map(_) => {}
        }
        Ok(())
    }

    /// Fails unless every start marker has been closed
    pub fn finish(self) -> Result<()> {
        if self.depth != 0 {
            return Err(Error::UnbalancedMarkers(format!(
                "{} map(s) left open",
                self.depth
            )));
        }
        Ok(())
    }

    fn put_field_header(&mut self, value_type: ValueType, key: &str) -> Result<()> {
        self.buf.push(value_type.code());
        self.put_string(key)
    }

    fn put_string(&mut self, s: &str) -> Result<()> {
        let len = i32::try_from(s.len() + 1)
            .map_err(|_| Error::custom(format!("string of {} bytes is too long", s.len())))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        Ok(())
    }
}

/// Encode `map` as one self-contained frame body into `buf`
///
/// Only strings, 32/64-bit ints, booleans and nested maps are accepted.
/// Keys must be unique at every nesting level.
pub fn encode_map(map: &WireMap, buf: &mut Vec<u8>) -> Result<()> {
    let mut writer = WireWriter::new(buf);
    writer.start("")?;
    write_entries(&mut writer, map)?;
    writer.end()?;
    writer.finish()
}

/// Convenience wrapper around [`encode_map`] with a fresh buffer
pub fn map_to_bytes(map: &WireMap) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_map(map, &mut buf)?;
    Ok(buf)
}

fn write_entries(writer: &mut WireWriter<'_>, map: &WireMap) -> Result<()> {
    let mut seen = HashSet::with_capacity(map.len());
    for (key, value) in map.iter() {
        if !seen.insert(key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }
        match value {
            WireValue::String(_) | WireValue::Int(_) | WireValue::Long(_) | WireValue::Bool(_) => {
                writer.put(key, value)?;
            }
            WireValue::Map(inner) => {
                writer.start(key)?;
                write_entries(writer, inner)?;
                writer.end()?;
            }
            other => {
                return Err(Error::UnsupportedValueType {
                    key: key.to_string(),
                    value_type: other.value_type(),
                })
            }
        }
    }
    Ok(())
}
