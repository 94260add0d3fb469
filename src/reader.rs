//! Main reader implementation for ROS bag files

use crate::error::{BagError, ReaderError, Result};
use crate::info::BagInfo;
use crate::msg_def::MsgDef;
use crate::record::{Op, Record, RecordHeader, RecordReader};
use crate::types::{
    BagHeader, Chunk, ChunkInfo, Compression, Connection, ConnectionData, IndexBlock, IndexEntry,
    Message, RosTime,
};
use crate::view::View;
use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Magic prefix every bag file starts with
pub const MAGIC: &[u8] = b"#ROSBAG V";
/// The only supported format version
pub const SUPPORTED_VERSION: &str = "2.0";
/// Length of `#ROSBAG V2.0\n`
const PREAMBLE_LEN: usize = 13;

const INDEX_VERSION: u32 = 1;
const CHUNK_INFO_VERSION: u32 = 1;
const INDEX_ENTRY_LEN: usize = 12;

/// Backing storage of an open bag
enum BagSource {
    Mapped(Mmap),
    Memory(Vec<u8>),
}

impl Deref for BagSource {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            BagSource::Mapped(mmap) => mmap,
            BagSource::Memory(bytes) => bytes,
        }
    }
}

/// An open ROS bag (format 2.0)
pub struct Bag {
    /// Path of the bag file, `None` for in-memory bags
    path: Option<PathBuf>,
    source: Option<BagSource>,
    size: u64,
    header: BagHeader,
    chunks: Vec<Chunk>,
    connections: BTreeMap<u32, Connection>,
    /// Topic name to connection ids
    topic_connections: BTreeMap<String, Vec<u32>>,
}

impl std::fmt::Debug for Bag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bag")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("open", &self.is_open())
            .field("header", &self.header)
            .field("chunks", &self.chunks.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl Bag {
    /// Memory-map and index the bag at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(ReaderError::BagNotFound { path });
        }

        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        log::debug!("mapped {} ({} bytes)", path.display(), mmap.len());

        Self::from_source(Some(path), BagSource::Mapped(mmap))
    }

    /// Index a bag held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_source(None, BagSource::Memory(bytes))
    }

    fn from_source(path: Option<PathBuf>, source: BagSource) -> Result<Self> {
        check_preamble(&source, path.as_deref())?;
        let scan = scan_records(&source)?;

        Ok(Self {
            path,
            size: source.len() as u64,
            source: Some(source),
            header: scan.header,
            chunks: scan.chunks,
            connections: scan.connections,
            topic_connections: scan.topic_connections,
        })
    }

    /// Release the underlying file mapping or buffer.
    ///
    /// Returns `false` if the bag was already closed.
    pub fn close(&mut self) -> bool {
        self.source.take().is_some()
    }

    /// Check if the bag is currently open
    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Path of the bag file, `None` for in-memory bags
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Size of the bag in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The bag header record
    pub fn header(&self) -> &BagHeader {
        &self.header
    }

    /// Format version string
    pub fn version(&self) -> &str {
        SUPPORTED_VERSION
    }

    /// All chunks in file order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// All topic names, sorted
    pub fn topics(&self) -> Vec<&str> {
        self.topic_connections.keys().map(String::as_str).collect()
    }

    /// Whether any connection publishes `topic`
    pub fn topic_in_bag(&self, topic: &str) -> bool {
        self.topic_connections.contains_key(topic)
    }

    /// All connections ordered by id
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Look up a connection by id
    pub fn connection(&self, id: u32) -> Result<&Connection> {
        self.connections
            .get(&id)
            .ok_or(BagError::ConnectionNotFound { id })
    }

    /// Connections recorded for `topic`, empty if the topic is absent
    pub fn connections_for_topic(&self, topic: &str) -> Vec<&Connection> {
        self.topic_connections
            .get(topic)
            .map(|ids| ids.iter().filter_map(|id| self.connections.get(id)).collect())
            .unwrap_or_default()
    }

    /// Parsed message definition of the first connection on `topic`
    pub fn msg_def_for_topic(&self, topic: &str) -> Result<Arc<MsgDef>> {
        self.connections_for_topic(topic)
            .first()
            .map(|connection| Arc::clone(&connection.schema))
            .ok_or_else(|| BagError::topic_not_found(topic))
    }

    /// Earliest chunk start time, `None` if the bag holds no messages
    pub fn start_time(&self) -> Option<RosTime> {
        self.indexed_chunks().map(|c| c.info.start_time).min()
    }

    /// Latest chunk end time, `None` if the bag holds no messages
    pub fn end_time(&self) -> Option<RosTime> {
        self.indexed_chunks().map(|c| c.info.end_time).max()
    }

    fn indexed_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.info.message_count > 0)
    }

    /// Total number of indexed messages
    pub fn message_count(&self) -> u64 {
        self.connections.values().map(Connection::message_count).sum()
    }

    /// Summary of the bag contents
    pub fn info(&self) -> BagInfo {
        BagInfo::from_bag(self)
    }

    /// A view over every message in this bag
    pub fn view(&self) -> View<'_> {
        View::new().add_bag(self)
    }

    fn buffer(&self) -> Result<&[u8]> {
        self.source.as_deref().ok_or(BagError::BagNotOpen)
    }

    /// Uncompressed payload of chunk `index`
    pub fn chunk_data(&self, index: usize) -> Result<Cow<'_, [u8]>> {
        let buf = self.buffer()?;
        let chunk = self.chunks.get(index).ok_or_else(|| {
            BagError::malformed(0, format!("chunk index {index} out of range"))
        })?;

        let start = chunk.data_offset as usize;
        let stored = buf
            .get(start..start + chunk.data_len as usize)
            .ok_or_else(|| BagError::malformed(chunk.offset, "chunk payload exceeds file"))?;

        crate::chunk::decompress(chunk.compression, stored, chunk.uncompressed_size as usize)
    }

    /// Read the message record at `offset` within an uncompressed chunk
    pub(crate) fn read_message(
        &self,
        connection: &Connection,
        chunk_data: &[u8],
        offset: u32,
    ) -> Result<Message> {
        let mut reader = RecordReader::new(chunk_data);
        reader.seek(offset as u64)?;
        let record = reader
            .read_record()?
            .ok_or_else(|| BagError::malformed(offset as u64, "index points past end of chunk"))?;
        let header = record.parse_header()?;

        let op = header.op()?;
        if op != Op::MessageData {
            return Err(BagError::malformed(
                offset as u64,
                format!("expected message data record, found {op:?}"),
            ));
        }
        let conn = header.u32("conn")?;
        if conn != connection.id {
            return Err(BagError::malformed(
                offset as u64,
                format!("index entry for connection {} points at connection {conn}", connection.id),
            ));
        }

        Ok(Message {
            topic: connection.topic.clone(),
            timestamp: header.time("time")?,
            connection_id: conn,
            md5sum: connection.data.md5sum.clone(),
            message_type: connection.data.message_type.clone(),
            scope: connection.data.scope.clone(),
            raw_data: record.data.to_vec(),
            schema: Arc::clone(&connection.schema),
        })
    }
}

fn check_preamble(buf: &[u8], path: Option<&Path>) -> Result<()> {
    if !buf.starts_with(MAGIC) {
        return Err(BagError::InvalidMagic {
            path: path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("<memory>")),
        });
    }

    let version_end = (MAGIC.len() + SUPPORTED_VERSION.len()).min(buf.len());
    let version = &buf[MAGIC.len()..version_end];
    if version != SUPPORTED_VERSION.as_bytes() {
        return Err(BagError::UnsupportedVersion {
            version: String::from_utf8_lossy(version).into_owned(),
        });
    }

    if buf.get(PREAMBLE_LEN - 1) != Some(&b'\n') {
        return Err(BagError::malformed(
            (PREAMBLE_LEN - 1) as u64,
            "unable to find newline after version string, perhaps this bag file is corrupted",
        ));
    }

    Ok(())
}

/// Everything learned from one pass over the top-level records
#[derive(Default)]
struct Scan {
    header: BagHeader,
    chunks: Vec<Chunk>,
    connections: BTreeMap<u32, Connection>,
    topic_connections: BTreeMap<String, Vec<u32>>,
}

fn scan_records(buf: &[u8]) -> Result<Scan> {
    let mut scan = Scan::default();
    let mut chunk_by_offset: HashMap<u64, usize> = HashMap::new();
    // Index data precedes the connection records of the index section
    let mut pending_blocks: HashMap<u32, Vec<IndexBlock>> = HashMap::new();
    let mut counts: HashMap<&'static str, usize> = HashMap::new();

    let mut reader = RecordReader::new(buf);
    reader.seek(PREAMBLE_LEN as u64)?;

    while let Some(record) = reader.read_record()? {
        let header = record.parse_header()?;

        match header.op()? {
            Op::BagHeader => {
                scan.header = BagHeader {
                    index_pos: header.u64("index_pos")?,
                    conn_count: header.u32("conn_count")?,
                    chunk_count: header.u32("chunk_count")?,
                };
                scan.chunks.reserve(scan.header.chunk_count as usize);
                *counts.entry("bag_header").or_default() += 1;
            }
            Op::Chunk => {
                let compression = Compression::parse(&header.string("compression")?)?;
                chunk_by_offset.insert(record.offset, scan.chunks.len());
                scan.chunks.push(Chunk {
                    offset: record.offset,
                    compression,
                    uncompressed_size: header.u32("size")?,
                    data_offset: record.data_offset,
                    data_len: record.data.len() as u32,
                    info: ChunkInfo::default(),
                });
                *counts.entry("chunk").or_default() += 1;
            }
            Op::IndexData => {
                let chunk = scan.chunks.len().checked_sub(1).ok_or_else(|| {
                    BagError::malformed(record.offset, "index data record before any chunk")
                })?;
                let (conn, block) = parse_index_data(&record, &header, chunk)?;
                pending_blocks.entry(conn).or_default().push(block);
                *counts.entry("index_data").or_default() += 1;
            }
            Op::Connection => {
                if let Some(connection) = parse_connection(&record, &header)? {
                    if !scan.connections.contains_key(&connection.id) {
                        scan.topic_connections
                            .entry(connection.topic.clone())
                            .or_default()
                            .push(connection.id);
                        scan.connections.insert(connection.id, connection);
                    }
                }
                *counts.entry("connection").or_default() += 1;
            }
            Op::MessageData => {
                // Messages live inside chunks
                *counts.entry("message_data").or_default() += 1;
            }
            Op::ChunkInfo => {
                let chunk_pos = header.u64("chunk_pos")?;
                let idx = *chunk_by_offset
                    .get(&chunk_pos)
                    .ok_or(BagError::ChunkNotFound { pos: chunk_pos })?;
                scan.chunks[idx].info = parse_chunk_info(&record, &header)?;
                *counts.entry("chunk_info").or_default() += 1;
            }
        }
    }

    for (id, blocks) in pending_blocks {
        match scan.connections.get_mut(&id) {
            Some(connection) => connection.blocks = blocks,
            None => log::warn!("index data for unknown connection {id} ignored"),
        }
    }

    if scan.header.index_pos == 0 {
        log::warn!("bag has no index (index_pos = 0); its messages cannot be iterated");
    }
    log::debug!("scanned records: {counts:?}");

    Ok(scan)
}

fn parse_index_data(
    record: &Record<'_>,
    header: &RecordHeader<'_>,
    chunk: usize,
) -> Result<(u32, IndexBlock)> {
    check_version(header, INDEX_VERSION, "index data")?;
    let conn = header.u32("conn")?;
    let count = header.u32("count")? as usize;

    let needed = count.saturating_mul(INDEX_ENTRY_LEN);
    if record.data.len() < needed {
        return Err(BagError::malformed(
            record.offset,
            format!("index data holds {} bytes, {count} entries need {needed}", record.data.len()),
        ));
    }

    let entries = record.data[..needed]
        .chunks_exact(INDEX_ENTRY_LEN)
        .map(|entry| IndexEntry {
            time: RosTime::from_le_slice(&entry[..8]),
            chunk,
            offset: LittleEndian::read_u32(&entry[8..]),
        })
        .collect();

    Ok((conn, IndexBlock { chunk, entries }))
}

fn check_version(header: &RecordHeader<'_>, expected: u32, what: &str) -> Result<()> {
    let version = header.u32("ver")?;
    if version != expected {
        return Err(BagError::invalid_field(
            "ver",
            format!("unsupported {what} version {version}"),
        ));
    }
    Ok(())
}

fn parse_connection(record: &Record<'_>, header: &RecordHeader<'_>) -> Result<Option<Connection>> {
    let id = header.u32("conn")?;
    let topic = header.string("topic")?;
    if topic.is_empty() {
        log::warn!("skipping connection {id} with an empty topic");
        return Ok(None);
    }

    let fields = RecordHeader::parse(record.data, record.data_offset)?;
    let message_type = fields.string("type")?;
    let message_definition = fields.string("message_definition")?;
    let schema = MsgDef::parse(&message_definition)?;

    let data = ConnectionData {
        topic: topic.clone(),
        scope: ConnectionData::scope_of(&message_type).to_string(),
        message_type,
        md5sum: fields.string("md5sum")?,
        message_definition,
        callerid: fields.optional_string("callerid").unwrap_or_default(),
        latching: fields.get("latching") == Some(b"1".as_slice()),
    };

    Ok(Some(Connection {
        id,
        topic,
        data,
        schema: Arc::new(schema),
        blocks: Vec::new(),
    }))
}

fn parse_chunk_info(record: &Record<'_>, header: &RecordHeader<'_>) -> Result<ChunkInfo> {
    check_version(header, CHUNK_INFO_VERSION, "chunk info")?;
    let count = header.u32("count")? as usize;
    let needed = count.saturating_mul(8);
    if record.data.len() < needed {
        return Err(BagError::malformed(
            record.offset,
            format!("chunk info holds {} bytes, {count} connections need {needed}", record.data.len()),
        ));
    }

    let connection_counts: Vec<(u32, u32)> = record.data[..needed]
        .chunks_exact(8)
        .map(|pair| (LittleEndian::read_u32(&pair[..4]), LittleEndian::read_u32(&pair[4..])))
        .collect();

    Ok(ChunkInfo {
        start_time: header.time("start_time")?,
        end_time: header.time("end_time")?,
        message_count: connection_counts.iter().map(|(_, n)| n).sum(),
        connection_counts,
    })
}
