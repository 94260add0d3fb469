//! Decoded message values
//!
//! Messages decode into a [`RosValue`] tree mirroring their definition.
//! Arrays of fixed-width primitives are kept as raw little endian bytes in a
//! [`Blob`] instead of being expanded element by element.

use crate::error::{BagError, Result};
use crate::msg_def::PrimitiveType;
use crate::types::{RosDuration, RosTime};
use byteorder::{ByteOrder, LittleEndian};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Index;

/// Kind of a [`RosValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RosValueType {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    String,
    Time,
    Duration,
    Object,
    Array,
    Blob,
}

impl From<PrimitiveType> for RosValueType {
    fn from(primitive: PrimitiveType) -> Self {
        match primitive {
            PrimitiveType::Bool => Self::Bool,
            PrimitiveType::Int8 => Self::Int8,
            PrimitiveType::Uint8 => Self::Uint8,
            PrimitiveType::Int16 => Self::Int16,
            PrimitiveType::Uint16 => Self::Uint16,
            PrimitiveType::Int32 => Self::Int32,
            PrimitiveType::Uint32 => Self::Uint32,
            PrimitiveType::Int64 => Self::Int64,
            PrimitiveType::Uint64 => Self::Uint64,
            PrimitiveType::Float32 => Self::Float32,
            PrimitiveType::Float64 => Self::Float64,
            PrimitiveType::String => Self::String,
            PrimitiveType::Time => Self::Time,
            PrimitiveType::Duration => Self::Duration,
        }
    }
}

impl fmt::Display for RosValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Object => "object",
            Self::Array => "array",
            Self::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Raw bytes of a primitive array
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Type of each element
    pub element_type: RosValueType,
    /// Number of elements
    pub len: usize,
    /// Little endian element bytes
    pub data: Vec<u8>,
}

/// Element types that can be read out of a [`Blob`]
pub trait BlobElement: Sized + Copy {
    const VALUE_TYPE: RosValueType;
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! blob_element {
    ($ty:ty, $value_type:ident, $read:expr) => {
        impl BlobElement for $ty {
            const VALUE_TYPE: RosValueType = RosValueType::$value_type;
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn from_le_slice(bytes: &[u8]) -> Self {
                $read(bytes)
            }
        }
    };
}

blob_element!(i8, Int8, |bytes: &[u8]| bytes[0] as i8);
blob_element!(u8, Uint8, |bytes: &[u8]| bytes[0]);
blob_element!(i16, Int16, LittleEndian::read_i16);
blob_element!(u16, Uint16, LittleEndian::read_u16);
blob_element!(i32, Int32, LittleEndian::read_i32);
blob_element!(u32, Uint32, LittleEndian::read_u32);
blob_element!(i64, Int64, LittleEndian::read_i64);
blob_element!(u64, Uint64, LittleEndian::read_u64);
blob_element!(f32, Float32, LittleEndian::read_f32);
blob_element!(f64, Float64, LittleEndian::read_f64);

impl BlobElement for bool {
    const VALUE_TYPE: RosValueType = RosValueType::Bool;
    const SIZE: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl Blob {
    /// Size of the element data in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Copy the elements out as a typed vector
    pub fn to_vec<T: BlobElement>(&self) -> Result<Vec<T>> {
        if T::VALUE_TYPE != self.element_type {
            return Err(BagError::type_mismatch(
                T::VALUE_TYPE.to_string(),
                self.element_type.to_string(),
            ));
        }
        Ok(self.data.chunks_exact(T::SIZE).map(T::from_le_slice).collect())
    }
}

/// A decoded message value
#[derive(Debug, Clone, PartialEq)]
pub enum RosValue {
    Bool(bool),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Time(RosTime),
    Duration(RosDuration),
    /// Fields in declaration order
    Object(Vec<(String, RosValue)>),
    Array(Vec<RosValue>),
    Blob(Blob),
}

impl RosValue {
    /// The kind of this value
    pub fn value_type(&self) -> RosValueType {
        match self {
            Self::Bool(_) => RosValueType::Bool,
            Self::Int8(_) => RosValueType::Int8,
            Self::Uint8(_) => RosValueType::Uint8,
            Self::Int16(_) => RosValueType::Int16,
            Self::Uint16(_) => RosValueType::Uint16,
            Self::Int32(_) => RosValueType::Int32,
            Self::Uint32(_) => RosValueType::Uint32,
            Self::Int64(_) => RosValueType::Int64,
            Self::Uint64(_) => RosValueType::Uint64,
            Self::Float32(_) => RosValueType::Float32,
            Self::Float64(_) => RosValueType::Float64,
            Self::String(_) => RosValueType::String,
            Self::Time(_) => RosValueType::Time,
            Self::Duration(_) => RosValueType::Duration,
            Self::Object(_) => RosValueType::Object,
            Self::Array(_) => RosValueType::Array,
            Self::Blob(_) => RosValueType::Blob,
        }
    }

    /// Look up a field of an object
    pub fn get(&self, name: &str) -> Option<&RosValue> {
        match self {
            Self::Object(fields) => fields.iter().find(|(key, _)| key == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Element of an array
    pub fn at(&self, index: usize) -> Option<&RosValue> {
        match self {
            Self::Array(items) => items.get(index),
            _ => None,
        }
    }

    /// Field names of an object, empty for other kinds
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let fields: &[(String, RosValue)] = match self {
            Self::Object(fields) => fields,
            _ => &[],
        };
        fields.iter().map(|(key, _)| key.as_str())
    }

    /// Number of fields, elements, or blob elements
    pub fn len(&self) -> usize {
        match self {
            Self::Object(fields) => fields.len(),
            Self::Array(items) => items.len(),
            Self::Blob(blob) => blob.len,
            _ => 0,
        }
    }

    /// Whether [`len`](Self::len) is zero
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Any integer value widened to i64, `None` if it does not fit
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int8(v) => Some(v.into()),
            Self::Uint8(v) => Some(v.into()),
            Self::Int16(v) => Some(v.into()),
            Self::Uint16(v) => Some(v.into()),
            Self::Int32(v) => Some(v.into()),
            Self::Uint32(v) => Some(v.into()),
            Self::Int64(v) => Some(v),
            Self::Uint64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Any non-negative integer value widened to u64
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Uint64(v) => Some(v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    /// Any numeric value as f64
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(v) => Some(v.into()),
            Self::Float64(v) => Some(v),
            Self::Uint64(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<RosTime> {
        match self {
            Self::Time(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<RosDuration> {
        match self {
            Self::Duration(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RosValue]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl Index<&str> for RosValue {
    type Output = RosValue;

    /// Panics if the value is not an object or has no such field
    fn index(&self, name: &str) -> &RosValue {
        match self.get(name) {
            Some(value) => value,
            None => panic!("no field '{name}' in {} value", self.value_type()),
        }
    }
}

impl Index<usize> for RosValue {
    type Output = RosValue;

    /// Panics if the value is not an array or the index is out of bounds
    fn index(&self, index: usize) -> &RosValue {
        match self.at(index) {
            Some(value) => value,
            None => panic!("no element {index} in {} value", self.value_type()),
        }
    }
}

struct BlobElements<'a>(&'a Blob);

impl Serialize for BlobElements<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        fn emit<T, S>(blob: &Blob, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where
            T: BlobElement + Serialize,
            S: Serializer,
        {
            let mut seq = serializer.serialize_seq(Some(blob.len))?;
            for chunk in blob.data.chunks_exact(T::SIZE) {
                seq.serialize_element(&T::from_le_slice(chunk))?;
            }
            seq.end()
        }

        let blob = self.0;
        match blob.element_type {
            RosValueType::Bool => emit::<bool, S>(blob, serializer),
            RosValueType::Int8 => emit::<i8, S>(blob, serializer),
            RosValueType::Uint8 => emit::<u8, S>(blob, serializer),
            RosValueType::Int16 => emit::<i16, S>(blob, serializer),
            RosValueType::Uint16 => emit::<u16, S>(blob, serializer),
            RosValueType::Int32 => emit::<i32, S>(blob, serializer),
            RosValueType::Uint32 => emit::<u32, S>(blob, serializer),
            RosValueType::Int64 => emit::<i64, S>(blob, serializer),
            RosValueType::Uint64 => emit::<u64, S>(blob, serializer),
            RosValueType::Float32 => emit::<f32, S>(blob, serializer),
            RosValueType::Float64 => emit::<f64, S>(blob, serializer),
            _ => serializer.serialize_bytes(&blob.data),
        }
    }
}

impl Serialize for RosValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int8(v) => serializer.serialize_i8(*v),
            Self::Uint8(v) => serializer.serialize_u8(*v),
            Self::Int16(v) => serializer.serialize_i16(*v),
            Self::Uint16(v) => serializer.serialize_u16(*v),
            Self::Int32(v) => serializer.serialize_i32(*v),
            Self::Uint32(v) => serializer.serialize_u32(*v),
            Self::Int64(v) => serializer.serialize_i64(*v),
            Self::Uint64(v) => serializer.serialize_u64(*v),
            Self::Float32(v) => serializer.serialize_f32(*v),
            Self::Float64(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Time(v) => v.serialize(serializer),
            Self::Duration(v) => v.serialize(serializer),
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Blob(blob) => BlobElements(blob).serialize(serializer),
        }
    }
}
