//! Core data types for ROS bag files

use crate::deserializer;
use crate::error::{BagError, Result};
use crate::msg_def::MsgDef;
use crate::value::RosValue;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A point in time as stored in bag files: seconds and nanoseconds since epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RosTime {
    /// Seconds component
    pub secs: u32,
    /// Nanoseconds component
    pub nsecs: u32,
}

/// A signed time span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RosDuration {
    /// Seconds component
    pub secs: i32,
    /// Nanoseconds component
    pub nsecs: i32,
}

impl RosTime {
    /// Create a time from its two components
    pub const fn new(secs: u32, nsecs: u32) -> Self {
        Self { secs, nsecs }
    }

    /// Build a time from nanoseconds since epoch
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            secs: (nanos / 1_000_000_000) as u32,
            nsecs: (nanos % 1_000_000_000) as u32,
        }
    }

    /// Build a time from floating point seconds
    pub fn from_sec(sec: f64) -> Self {
        Self::from_nanos((sec.max(0.0) * 1e9).round() as u64)
    }

    /// Seconds as a floating point value
    pub fn to_sec(&self) -> f64 {
        self.secs as f64 + self.nsecs as f64 * 1e-9
    }

    /// Nanoseconds since epoch
    pub fn to_nanos(&self) -> u64 {
        self.secs as u64 * 1_000_000_000 + self.nsecs as u64
    }

    /// Convert to a UTC datetime, `None` if the nanoseconds are out of range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.secs as i64, self.nsecs).single()
    }

    /// Decode the 8 byte wire form (u32 secs, u32 nsecs, little endian).
    ///
    /// Panics if `bytes` is shorter than 8 bytes.
    pub fn from_le_slice(bytes: &[u8]) -> Self {
        Self {
            secs: LittleEndian::read_u32(&bytes[..4]),
            nsecs: LittleEndian::read_u32(&bytes[4..8]),
        }
    }
}

impl fmt::Display for RosTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nsecs)
    }
}

impl RosDuration {
    /// Create a duration from its two components
    pub const fn new(secs: i32, nsecs: i32) -> Self {
        Self { secs, nsecs }
    }

    /// Seconds as a floating point value
    pub fn to_sec(&self) -> f64 {
        self.secs as f64 + self.nsecs as f64 * 1e-9
    }

    /// Signed nanoseconds
    pub fn to_nanos(&self) -> i64 {
        self.secs as i64 * 1_000_000_000 + self.nsecs as i64
    }
}

impl fmt::Display for RosDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}", self.to_sec())
    }
}

/// Summary found in the bag header record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BagHeader {
    /// Offset of the first record after the chunk section
    pub index_pos: u64,
    /// Number of unique connections
    pub conn_count: u32,
    /// Number of chunk records
    pub chunk_count: u32,
}

/// Compression used for a chunk payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Stored as-is
    None,
    /// LZ4 frame format
    Lz4,
    /// bzip2 stream
    Bz2,
}

impl Compression {
    /// Parse the value of a chunk's `compression` header field
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "none" => Ok(Self::None),
            "lz4" => Ok(Self::Lz4),
            "bz2" => Ok(Self::Bz2),
            other => Err(BagError::UnsupportedCompression {
                format: other.to_string(),
            }),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Bz2 => "bz2",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time bounds and counts from a chunk info record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkInfo {
    pub start_time: RosTime,
    pub end_time: RosTime,
    pub message_count: u32,
    /// `(connection id, message count)` pairs
    pub connection_counts: Vec<(u32, u32)>,
}

/// A chunk record located in the bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Offset of the chunk record (its header length prefix)
    pub offset: u64,
    pub compression: Compression,
    pub uncompressed_size: u32,
    /// Offset of the (possibly compressed) payload
    pub data_offset: u64,
    /// Length of the stored payload
    pub data_len: u32,
    pub info: ChunkInfo,
}

/// Position of one message inside a chunk's uncompressed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub time: RosTime,
    /// Index into the bag's chunk list
    pub chunk: usize,
    /// Offset of the message data record within the uncompressed chunk
    pub offset: u32,
}

/// Index data record for one connection and one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBlock {
    /// Index into the bag's chunk list
    pub chunk: usize,
    pub entries: Vec<IndexEntry>,
}

/// Connection record payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionData {
    pub topic: String,
    /// Full message type (e.g. "sensor_msgs/LaserScan")
    pub message_type: String,
    /// Package part of the message type (e.g. "sensor_msgs")
    pub scope: String,
    pub md5sum: String,
    pub message_definition: String,
    pub callerid: String,
    pub latching: bool,
}

impl ConnectionData {
    /// Package prefix of a message type, empty when the type has no package
    pub fn scope_of(message_type: &str) -> &str {
        message_type
            .split_once('/')
            .map(|(scope, _)| scope)
            .unwrap_or("")
    }
}

/// A connection (publisher of one topic with one type) recorded in the bag
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique connection ID
    pub id: u32,
    /// Topic name (e.g., "/base_scan")
    pub topic: String,
    pub data: ConnectionData,
    /// Parsed message definition
    pub schema: Arc<MsgDef>,
    /// Index blocks, one per chunk containing messages of this connection
    pub blocks: Vec<IndexBlock>,
}

impl Connection {
    /// Number of indexed messages on this connection
    pub fn message_count(&self) -> u64 {
        self.blocks.iter().map(|b| b.entries.len() as u64).sum()
    }

    /// Get the message type
    pub fn message_type(&self) -> &str {
        &self.data.message_type
    }
}

/// A message read from the bag
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub timestamp: RosTime,
    pub connection_id: u32,
    pub md5sum: String,
    pub message_type: String,
    /// Package of the message type, used to resolve nested types
    pub scope: String,
    /// Raw ROS1 serialized payload
    pub raw_data: Vec<u8>,
    pub schema: Arc<MsgDef>,
}

impl Message {
    /// Decode the payload using the definition recorded with its connection
    pub fn data(&self) -> Result<RosValue> {
        deserializer::decode(&self.schema, &self.scope, &self.raw_data)
    }

    /// Size of the raw payload in bytes
    pub fn raw_data_len(&self) -> usize {
        self.raw_data.len()
    }
}
