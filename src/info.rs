//! Bag summaries in the spirit of `rosbag info`

use crate::reader::Bag;
use crate::types::{Compression, RosTime};
use serde::Serialize;
use std::collections::BTreeMap;

/// Complete bag summary
#[derive(Debug, Clone, Serialize)]
pub struct BagInfo {
    /// Bag file path, absent for in-memory bags
    pub path: Option<String>,
    /// Bag format version
    pub version: String,
    /// Duration in seconds
    pub duration: f64,
    /// Start time in seconds since epoch
    pub start: Option<f64>,
    /// End time in seconds since epoch
    pub end: Option<f64>,
    /// File size in bytes
    pub size: u64,
    /// Total message count
    pub messages: u64,
    /// Whether the bag has an index section
    pub indexed: bool,
    /// Number of chunks
    pub chunks: usize,
    /// Per compression format statistics
    pub compression: Vec<CompressionSummary>,
    /// Message types with their md5sums
    pub types: Vec<TypeSummary>,
    /// Topics with message counts
    pub topics: Vec<TopicSummary>,
    #[serde(skip)]
    start_time: Option<RosTime>,
    #[serde(skip)]
    end_time: Option<RosTime>,
}

/// Chunk statistics for one compression format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionSummary {
    pub format: Compression,
    pub chunks: usize,
    /// Bytes stored in the file
    pub compressed: u64,
    /// Bytes after decompression
    pub uncompressed: u64,
}

/// A message type present in the bag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    #[serde(rename = "type")]
    pub message_type: String,
    pub md5: String,
}

/// A topic present in the bag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSummary {
    pub topic: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub messages: u64,
    pub connections: usize,
}

impl BagInfo {
    /// Summarize an open bag
    pub fn from_bag(bag: &Bag) -> Self {
        let start_time = bag.start_time();
        let end_time = bag.end_time();

        let mut compression: BTreeMap<&'static str, CompressionSummary> = BTreeMap::new();
        for chunk in bag.chunks() {
            let summary = compression
                .entry(chunk.compression.as_str())
                .or_insert_with(|| CompressionSummary {
                    format: chunk.compression,
                    chunks: 0,
                    compressed: 0,
                    uncompressed: 0,
                });
            summary.chunks += 1;
            summary.compressed += chunk.data_len as u64;
            summary.uncompressed += chunk.uncompressed_size as u64;
        }

        let mut types: BTreeMap<String, String> = BTreeMap::new();
        for connection in bag.connections() {
            types
                .entry(connection.data.message_type.clone())
                .or_insert_with(|| connection.data.md5sum.clone());
        }

        let topics = bag
            .topics()
            .into_iter()
            .map(|topic| {
                let connections = bag.connections_for_topic(topic);
                TopicSummary {
                    topic: topic.to_string(),
                    message_type: connections
                        .first()
                        .map(|c| c.data.message_type.clone())
                        .unwrap_or_default(),
                    messages: connections.iter().map(|c| c.message_count()).sum(),
                    connections: connections.len(),
                }
            })
            .collect();

        Self {
            path: bag.path().map(|p| p.display().to_string()),
            version: bag.version().to_string(),
            duration: match (start_time, end_time) {
                (Some(start), Some(end)) => end.to_sec() - start.to_sec(),
                _ => 0.0,
            },
            start: start_time.map(|t| t.to_sec()),
            end: end_time.map(|t| t.to_sec()),
            size: bag.size(),
            messages: bag.message_count(),
            indexed: bag.header().index_pos != 0,
            chunks: bag.chunks().len(),
            compression: compression.into_values().collect(),
            types: types
                .into_iter()
                .map(|(message_type, md5)| TypeSummary { message_type, md5 })
                .collect(),
            topics,
            start_time,
            end_time,
        }
    }

    /// Exact start time
    pub fn start_time(&self) -> Option<RosTime> {
        self.start_time
    }

    /// Exact end time
    pub fn end_time(&self) -> Option<RosTime> {
        self.end_time
    }

    /// Duration in nanoseconds
    pub fn duration_nanos(&self) -> u64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.to_nanos().saturating_sub(start.to_nanos()),
            _ => 0,
        }
    }

    /// Check if any chunk is compressed
    pub fn is_compressed(&self) -> bool {
        self.compression
            .iter()
            .any(|summary| summary.format != Compression::None)
    }
}
