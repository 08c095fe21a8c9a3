//! Self-describing binary value encoding
//!
//! Headers, request/data contexts, options and exception bodies are all
//! written as one wire-value map per frame: a start marker, typed fields,
//! nested maps bracketed by their own markers, and a closing end marker.

mod map;
mod reader;
mod value;
mod writer;

pub use self::map::WireMap;
pub use self::reader::{decode_map, WireField, WireReader, MAX_NESTING};
pub use self::value::{ValueType, WireValue};
pub use self::writer::{encode_map, map_to_bytes, WireWriter};
