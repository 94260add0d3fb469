//! Record framing for the bag 2.0 format
//!
//! Every record is `<header_len: u32><header><data_len: u32><data>`, all
//! integers little endian. A header is a run of `<field_len: u32><name>=<value>`
//! fields; connection records reuse the same field layout for their data.

use crate::error::{BagError, Result};
use crate::types::RosTime;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

/// Record opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    MessageData,
    BagHeader,
    IndexData,
    Chunk,
    ChunkInfo,
    Connection,
}

impl Op {
    /// Decode an opcode byte
    pub fn from_u8(op: u8) -> Result<Self> {
        match op {
            0x02 => Ok(Self::MessageData),
            0x03 => Ok(Self::BagHeader),
            0x04 => Ok(Self::IndexData),
            0x05 => Ok(Self::Chunk),
            0x06 => Ok(Self::ChunkInfo),
            0x07 => Ok(Self::Connection),
            _ => Err(BagError::UnknownOp { op }),
        }
    }

    /// Opcode byte
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::MessageData => 0x02,
            Self::BagHeader => 0x03,
            Self::IndexData => 0x04,
            Self::Chunk => 0x05,
            Self::ChunkInfo => 0x06,
            Self::Connection => 0x07,
        }
    }
}

/// One record borrowed from the underlying buffer
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Offset of the record within the buffer it was read from
    pub offset: u64,
    pub header: &'a [u8],
    pub data: &'a [u8],
    /// Offset of `data` within the buffer
    pub data_offset: u64,
}

impl<'a> Record<'a> {
    /// Parse the header fields
    pub fn parse_header(&self) -> Result<RecordHeader<'a>> {
        RecordHeader::parse(self.header, self.offset)
    }
}

/// Sequential reader over a buffer of records
pub struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    /// Create a reader positioned at the start of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Move to an absolute position
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.buf.len() as u64 {
            return Err(BagError::malformed(
                pos,
                format!("seek past end of buffer ({} bytes)", self.buf.len()),
            ));
        }
        self.pos = pos as usize;
        Ok(())
    }

    /// Whether the reader has consumed the whole buffer
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read the next record, `None` at end of buffer
    pub fn read_record(&mut self) -> Result<Option<Record<'a>>> {
        if self.is_at_end() {
            return Ok(None);
        }

        let offset = self.pos as u64;
        let header = self.read_block(offset, "header")?;
        let data_offset = self.pos as u64 + 4;
        let data = self.read_block(offset, "data")?;

        Ok(Some(Record {
            offset,
            header,
            data,
            data_offset,
        }))
    }

    fn read_block(&mut self, record_offset: u64, what: &str) -> Result<&'a [u8]> {
        let buf = self.buf;
        let len = read_len(buf, self.pos).ok_or_else(|| {
            BagError::malformed(record_offset, format!("truncated {what} length"))
        })?;
        let start = self.pos + 4;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| {
                BagError::malformed(
                    record_offset,
                    format!(
                        "{what} length {len} exceeds remaining {} bytes",
                        buf.len().saturating_sub(start)
                    ),
                )
            })?;
        self.pos = end;
        Ok(&buf[start..end])
    }
}

fn read_len(buf: &[u8], pos: usize) -> Option<usize> {
    buf.get(pos..pos.checked_add(4)?)
        .map(|bytes| LittleEndian::read_u32(bytes) as usize)
}

/// Parsed `name=value` fields
#[derive(Debug, Clone, Default)]
pub struct RecordHeader<'a> {
    fields: HashMap<&'a str, &'a [u8]>,
}

impl<'a> RecordHeader<'a> {
    /// Parse a field block. `offset` is only used for error reporting.
    pub fn parse(bytes: &'a [u8], offset: u64) -> Result<Self> {
        let mut fields = HashMap::new();
        let mut pos = 0usize;

        while pos < bytes.len() {
            let field_len = read_len(bytes, pos)
                .ok_or_else(|| BagError::malformed(offset, "truncated header field length"))?;
            let start = pos + 4;
            let end = start
                .checked_add(field_len)
                .filter(|&end| end <= bytes.len())
                .ok_or_else(|| {
                    BagError::malformed(offset, format!("header field length {field_len} overruns header"))
                })?;
            let field = &bytes[start..end];

            let sep = field.iter().position(|&b| b == b'=').ok_or_else(|| {
                BagError::malformed(
                    offset,
                    "unable to find '=' in header field - perhaps this bag is corrupt",
                )
            })?;
            let name = std::str::from_utf8(&field[..sep])
                .map_err(|_| BagError::malformed(offset, "header field name is not UTF-8"))?;
            fields.insert(name, &field[sep + 1..]);

            pos = end;
        }

        Ok(Self { fields })
    }

    /// Raw field value
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.fields.get(name).copied()
    }

    /// Whether a field is present
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the header has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn required(&self, name: &str) -> Result<&'a [u8]> {
        self.get(name).ok_or_else(|| BagError::missing_field(name))
    }

    fn fixed<const N: usize>(&self, name: &str) -> Result<[u8; N]> {
        let value = self.required(name)?;
        value.try_into().map_err(|_| {
            BagError::invalid_field(name, format!("expected {N} bytes, found {}", value.len()))
        })
    }

    /// The record opcode
    pub fn op(&self) -> Result<Op> {
        let [op] = self.fixed::<1>("op")?;
        Op::from_u8(op)
    }

    /// A little endian u32 field
    pub fn u32(&self, name: &str) -> Result<u32> {
        Ok(LittleEndian::read_u32(&self.fixed::<4>(name)?))
    }

    /// A little endian u64 field
    pub fn u64(&self, name: &str) -> Result<u64> {
        Ok(LittleEndian::read_u64(&self.fixed::<8>(name)?))
    }

    /// A time field (u32 secs, u32 nsecs)
    pub fn time(&self, name: &str) -> Result<RosTime> {
        Ok(RosTime::from_le_slice(&self.fixed::<8>(name)?))
    }

    /// A text field; invalid UTF-8 is replaced
    pub fn string(&self, name: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(self.required(name)?).into_owned())
    }

    /// A text field that may be absent
    pub fn optional_string(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|value| String::from_utf8_lossy(value).into_owned())
    }
}
