//! # embag
//!
//! A fast, simple reader for ROS1 bag files.
//!
//! Bags are memory-mapped and indexed from their own records. Messages are
//! decoded using the message definitions stored in the bag itself, so no
//! `.msg` files, generated code, or ROS installation are needed.
//!
//! ## Features
//!
//! - Read bag format 2.0, including `lz4` and `bz2` compressed chunks
//! - Parse the embedded message definitions of every connection
//! - Decode messages into a dynamic [`RosValue`] tree; primitive arrays are
//!   exposed as raw [`Blob`]s instead of being expanded
//! - Time ordered iteration across one or more bags with topic and time
//!   range filters
//!
//! ## Quick Start
//!
//! ```no_run
//! use embag::Bag;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bag = Bag::open("path/to/file.bag")?;
//!
//! println!("Topics: {:?}", bag.topics());
//! println!("Messages: {}", bag.message_count());
//!
//! for message in bag.view().with_topics(["/base_scan"]).messages() {
//!     let message = message?;
//!     let value = message.data()?;
//!     println!("{} seq={:?}", message.timestamp, value["header"]["seq"].as_u32());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading primitive arrays
//!
//! ```no_run
//! # use embag::Bag;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let bag = Bag::open("path/to/file.bag")?;
//! for message in bag.view().with_topics(["/base_scan"]).messages() {
//!     let value = message?.data()?;
//!     if let Some(blob) = value["ranges"].as_blob() {
//!         let ranges: Vec<f32> = blob.to_vec()?;
//!         println!("{} ranges", ranges.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Merging bags
//!
//! ```no_run
//! use embag::{Bag, RosTime, View};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let first = Bag::open("first.bag")?;
//! let second = Bag::open("second.bag")?;
//!
//! let view = View::new()
//!     .add_bag(&first)
//!     .add_bag(&second)
//!     .with_time_range(RosTime::new(100, 0), RosTime::new(200, 0));
//!
//! for message in view.messages() {
//!     println!("{}", message?.topic);
//! }
//! # Ok(())
//! # }
//! ```

/// Chunk payload decompression.
pub mod chunk;

/// ROS1 wire format decoding driven by parsed message definitions.
pub mod deserializer;

/// Comprehensive error types and handling.
///
/// All library operations return structured errors that can be matched and handled appropriately.
pub mod error;

/// Bag summaries.
pub mod info;

/// Parser for message definitions embedded in connection records.
pub mod msg_def;

/// Main reader interface.
///
/// The [`Bag`] struct provides the primary interface for reading bag files.
pub mod reader;

/// Low-level record framing.
pub mod record;

/// Core data types and structures.
pub mod types;

/// Dynamic message values.
pub mod value;

/// Ordered, filtered message iteration.
pub mod view;

// Re-export main types for convenience
pub use error::{BagError, ReaderError, Result};
pub use info::BagInfo;
pub use msg_def::{ArraySize, ConstantDef, EmbeddedMsgDef, FieldDef, Member, MsgDef, PrimitiveType};
pub use reader::Bag;
pub use types::{
    Chunk, ChunkInfo, Compression, Connection, ConnectionData, Message, RosDuration, RosTime,
};
pub use value::{Blob, BlobElement, RosValue, RosValueType};
pub use view::{MessageIter, View};
