//! ROS1 message deserialization
//!
//! ROS1 serialization is little endian with no alignment padding. Strings and
//! variable-length arrays are prefixed with a u32 length; fixed-length arrays
//! are not.

use crate::error::{BagError, Result};
use crate::msg_def::{ArraySize, EmbeddedMsgDef, FieldDef, Member, MsgDef, PrimitiveType};
use crate::types::{RosDuration, RosTime};
use crate::value::{Blob, RosValue, RosValueType};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

/// Decode `data` as a message described by `def`.
///
/// `scope` is the package of the message type and is used to resolve
/// unqualified nested types.
pub fn decode(def: &MsgDef, scope: &str, data: &[u8]) -> Result<RosValue> {
    let mut deserializer = Ros1Deserializer::new(data);
    let mut decoder = Decoder {
        def,
        de: &mut deserializer,
        active: Vec::new(),
        min_sizes: HashMap::new(),
    };
    decoder.read_members(scope, &def.members)
}

/// Cursor over serialized message bytes
pub struct Ros1Deserializer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Ros1Deserializer<'a> {
    /// Create a deserializer positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get current position in the data
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the total length of the data
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Check if there are enough bytes remaining from current position
    pub fn has_remaining(&self, bytes: usize) -> bool {
        self.pos
            .checked_add(bytes)
            .is_some_and(|end| end <= self.data.len())
    }

    fn truncated(&self, what: &str, needed: usize) -> BagError {
        BagError::deserialization(
            format!(
                "data truncated reading {what}: need {needed} bytes, {} available",
                self.data.len().saturating_sub(self.pos)
            ),
            self.pos,
            self.data.len(),
        )
    }

    /// Take the next `len` bytes
    pub fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if !self.has_remaining(len) {
            return Err(self.truncated(what, len));
        }
        let data = self.data;
        let bytes = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1, "u8")?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.read_bytes(2, "i16")?))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2, "u16")?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.read_bytes(4, "i32")?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4, "u32")?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.read_bytes(8, "i64")?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read_bytes(8, "u64")?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read_bytes(4, "f32")?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.read_bytes(8, "f64")?))
    }

    /// Read a length-prefixed string; invalid UTF-8 is replaced
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_u32()? as usize;
        let bytes = self.read_bytes(length, "string")?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_time(&mut self) -> Result<RosTime> {
        Ok(RosTime::new(self.read_u32()?, self.read_u32()?))
    }

    pub fn read_duration(&mut self) -> Result<RosDuration> {
        Ok(RosDuration::new(self.read_i32()?, self.read_i32()?))
    }

    /// Read one value of a primitive type
    pub fn read_value(&mut self, primitive: PrimitiveType) -> Result<RosValue> {
        Ok(match primitive {
            PrimitiveType::Bool => RosValue::Bool(self.read_bool()?),
            PrimitiveType::Int8 => RosValue::Int8(self.read_i8()?),
            PrimitiveType::Uint8 => RosValue::Uint8(self.read_u8()?),
            PrimitiveType::Int16 => RosValue::Int16(self.read_i16()?),
            PrimitiveType::Uint16 => RosValue::Uint16(self.read_u16()?),
            PrimitiveType::Int32 => RosValue::Int32(self.read_i32()?),
            PrimitiveType::Uint32 => RosValue::Uint32(self.read_u32()?),
            PrimitiveType::Int64 => RosValue::Int64(self.read_i64()?),
            PrimitiveType::Uint64 => RosValue::Uint64(self.read_u64()?),
            PrimitiveType::Float32 => RosValue::Float32(self.read_f32()?),
            PrimitiveType::Float64 => RosValue::Float64(self.read_f64()?),
            PrimitiveType::String => RosValue::String(self.read_string()?),
            PrimitiveType::Time => RosValue::Time(self.read_time()?),
            PrimitiveType::Duration => RosValue::Duration(self.read_duration()?),
        })
    }
}

/// Nesting limit for embedded message types
pub const MAX_DEPTH: usize = 32;

/// Longest accepted array of elements that take no bytes on the wire
pub const MAX_ZERO_WIDTH_ELEMENTS: usize = 1 << 16;

/// Walks a definition while consuming bytes
struct Decoder<'d, 'a, 'b> {
    def: &'d MsgDef,
    de: &'b mut Ros1Deserializer<'a>,
    /// Embedded types currently being decoded, outermost first
    active: Vec<&'d str>,
    /// Minimum encoded size per embedded type name
    min_sizes: HashMap<&'d str, usize>,
}

impl<'d> Decoder<'d, '_, '_> {
    fn read_members(&mut self, scope: &str, members: &'d [Member]) -> Result<RosValue> {
        let mut fields = Vec::with_capacity(members.len());
        for field in members.iter().filter_map(Member::as_field) {
            let value = self.read_field(scope, field)?;
            fields.push((field.field_name.clone(), value));
        }
        Ok(RosValue::Object(fields))
    }

    fn read_field(&mut self, scope: &str, field: &'d FieldDef) -> Result<RosValue> {
        let len = match field.array_size {
            ArraySize::Scalar => return self.read_single(scope, field),
            ArraySize::Fixed(n) => n,
            ArraySize::Dynamic => self.de.read_u32()? as usize,
        };

        match field.primitive() {
            Some(primitive) if is_blob_type(primitive) => self.read_blob(primitive, len),
            Some(primitive) => {
                let element_size = primitive.fixed_size().unwrap_or(4);
                self.check_array_len(len, element_size)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.de.read_value(primitive)?);
                }
                Ok(RosValue::Array(items))
            }
            None => {
                let embedded = self.embedded(scope, field)?;
                let element_size = self.min_size(embedded, 0)?;
                self.check_array_len(len, element_size)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_embedded(embedded)?);
                }
                Ok(RosValue::Array(items))
            }
        }
    }

    fn read_single(&mut self, scope: &str, field: &'d FieldDef) -> Result<RosValue> {
        match field.primitive() {
            Some(primitive) => self.de.read_value(primitive),
            None => {
                let embedded = self.embedded(scope, field)?;
                self.read_embedded(embedded)
            }
        }
    }

    fn read_embedded(&mut self, embedded: &'d EmbeddedMsgDef) -> Result<RosValue> {
        if self.active.contains(&embedded.type_name.as_str()) {
            return Err(self.error(format!(
                "message type {} contains itself",
                embedded.type_name
            )));
        }
        if self.active.len() >= MAX_DEPTH {
            return Err(self.too_deep());
        }

        self.active.push(&embedded.type_name);
        let value = self.read_members(embedded.scope(), &embedded.members);
        self.active.pop();
        value
    }

    fn read_blob(&mut self, primitive: PrimitiveType, len: usize) -> Result<RosValue> {
        let element_size = primitive.fixed_size().unwrap_or(1);
        let byte_len = len
            .checked_mul(element_size)
            .ok_or_else(|| self.error(format!("array length {len} overflows")))?;
        let data = self.de.read_bytes(byte_len, "array")?.to_vec();
        Ok(RosValue::Blob(Blob {
            element_type: RosValueType::from(primitive),
            len,
            data,
        }))
    }

    /// Reject lengths the remaining bytes cannot hold before allocating
    fn check_array_len(&self, len: usize, element_size: usize) -> Result<()> {
        if element_size == 0 {
            if len > MAX_ZERO_WIDTH_ELEMENTS {
                return Err(self.error(format!(
                    "array of {len} empty elements exceeds {MAX_ZERO_WIDTH_ELEMENTS}"
                )));
            }
            return Ok(());
        }

        let needed = len.saturating_mul(element_size);
        if !self.de.has_remaining(needed) {
            return Err(self.error(format!(
                "array of {len} elements needs at least {needed} bytes, {} available",
                self.de.data_len().saturating_sub(self.de.position())
            )));
        }
        Ok(())
    }

    /// Fewest bytes one value of `embedded` can occupy on the wire
    fn min_size(&mut self, embedded: &'d EmbeddedMsgDef, depth: usize) -> Result<usize> {
        if let Some(&size) = self.min_sizes.get(embedded.type_name.as_str()) {
            return Ok(size);
        }
        if depth >= MAX_DEPTH {
            return Err(self.too_deep());
        }

        let mut total = 0usize;
        for field in embedded.fields() {
            let element = match (field.array_size, field.primitive()) {
                (ArraySize::Dynamic, _) => {
                    total = total.saturating_add(4);
                    continue;
                }
                (_, Some(primitive)) => primitive.fixed_size().unwrap_or(4),
                (_, None) => {
                    let nested = self.embedded(embedded.scope(), field)?;
                    self.min_size(nested, depth + 1)?
                }
            };
            let count = match field.array_size {
                ArraySize::Fixed(n) => n,
                _ => 1,
            };
            total = total.saturating_add(element.saturating_mul(count));
        }

        self.min_sizes.insert(&embedded.type_name, total);
        Ok(total)
    }

    fn embedded(&self, scope: &str, field: &FieldDef) -> Result<&'d EmbeddedMsgDef> {
        self.def.embedded_type(scope, field)
    }

    fn too_deep(&self) -> BagError {
        self.error(format!("message types nest deeper than {MAX_DEPTH} levels"))
    }

    fn error(&self, message: String) -> BagError {
        BagError::deserialization(message, self.de.position(), self.de.data_len())
    }
}

/// Arrays of these element types decode to [`Blob`]s
fn is_blob_type(primitive: PrimitiveType) -> bool {
    !matches!(
        primitive,
        PrimitiveType::String | PrimitiveType::Time | PrimitiveType::Duration
    )
}
