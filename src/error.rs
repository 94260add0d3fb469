//! Error types for embag

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for embag operations
pub type Result<T> = std::result::Result<T, BagError>;

/// Errors that can occur when working with ROS bag files
#[derive(Error, Debug)]
pub enum BagError {
    /// IO error when accessing files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bag file not found
    #[error("Bag file not found: {path}")]
    BagNotFound { path: PathBuf },

    /// The file does not start with the bag magic string
    #[error("This file doesn't appear to be a bag file: {path}")]
    InvalidMagic { path: PathBuf },

    /// Unsupported bag version
    #[error("Unsupported bag file version: {version}")]
    UnsupportedVersion { version: String },

    /// A record could not be framed or its header is corrupt
    #[error("Malformed record at offset {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    /// A required header field is absent
    #[error("Missing header field: {field}")]
    MissingField { field: String },

    /// A header field has an unexpected size or value
    #[error("Invalid header field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Record opcode not defined by the 2.0 format
    #[error("Unknown record operation: {op:#04x}")]
    UnknownOp { op: u8 },

    /// Chunk info record references a chunk that was never seen
    #[error("Unable to find chunk for chunk info at pos: {pos}")]
    ChunkNotFound { pos: u64 },

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Unsupported compression format
    #[error("Unsupported compression format: {format}")]
    UnsupportedCompression { format: String },

    /// Message definition text could not be parsed
    #[error("Message definition parsing failed at line {line}: {reason}")]
    MsgDefParse { line: usize, reason: String },

    /// Message type not found among the embedded definitions
    #[error("Message type not found: {message_type}")]
    MessageTypeNotFound { message_type: String },

    /// Topic not present in the bag
    #[error("Topic not found in bag: {topic}")]
    TopicNotFound { topic: String },

    /// Connection id not present in the bag
    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: u32 },

    /// Message payload did not match its definition
    #[error("Deserialization error at position {position}/{data_length}: {message}")]
    Deserialization {
        message: String,
        position: usize,
        data_length: usize,
    },

    /// Blob element type does not match the requested type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Bag has been closed
    #[error("Bag is not open")]
    BagNotOpen,
}

/// Type alias for backwards compatibility
pub type ReaderError = BagError;

impl BagError {
    /// Create a malformed record error
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid field error
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a compression error
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression(message.into())
    }

    /// Create a message definition parse error
    pub fn msg_def_parse(line: usize, reason: impl Into<String>) -> Self {
        Self::MsgDefParse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a deserialization error
    pub fn deserialization(message: impl Into<String>, position: usize, data_length: usize) -> Self {
        Self::Deserialization {
            message: message.into(),
            position,
            data_length,
        }
    }

    /// Create a message type not found error
    pub fn message_type_not_found(message_type: impl Into<String>) -> Self {
        Self::MessageTypeNotFound {
            message_type: message_type.into(),
        }
    }

    /// Create a topic not found error
    pub fn topic_not_found(topic: impl Into<String>) -> Self {
        Self::TopicNotFound {
            topic: topic.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
