//! Synthetic bag files for integration tests
//!
//! `BagBuilder` lays records out the way `rosbag record` does: preamble,
//! bag header padded to 4096 bytes, chunks each followed by their index data
//! records, then the index section with connection and chunk info records.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use embag::{Compression, RosTime};

pub const LASER_SCAN_DEF: &str = "\
# Single scan from a planar laser range-finder
Header header            # timestamp is the acquisition time of the first ray
float32 angle_min        # start angle of the scan [rad]
float32 angle_max        # end angle of the scan [rad]
float32 angle_increment  # angular distance between measurements [rad]
float32 range_min        # minimum range value [m]
float32 range_max        # maximum range value [m]
float32[] ranges         # range data [m]
float32[] intensities    # intensity data [device-specific units]

================================================================================
MSG: std_msgs/Header
# Standard metadata for higher-level stamped data types.
uint32 seq
time stamp
string frame_id
";

pub const ODOMETRY_DEF: &str = "\
# This represents an estimate of a position and velocity in free space.
Header header
string child_frame_id
geometry_msgs/PoseWithCovariance pose
geometry_msgs/TwistWithCovariance twist

================================================================================
MSG: std_msgs/Header
uint32 seq
time stamp
string frame_id

================================================================================
MSG: geometry_msgs/PoseWithCovariance
Pose pose
float64[36] covariance

================================================================================
MSG: geometry_msgs/Pose
Point position
Quaternion orientation

================================================================================
MSG: geometry_msgs/Point
float64 x
float64 y
float64 z

================================================================================
MSG: geometry_msgs/Quaternion
float64 x
float64 y
float64 z
float64 w

================================================================================
MSG: geometry_msgs/TwistWithCovariance
Twist twist
float64[36] covariance

================================================================================
MSG: geometry_msgs/Twist
Vector3 linear
Vector3 angular

================================================================================
MSG: geometry_msgs/Vector3
float64 x
float64 y
float64 z
";

pub const SCAN_TOPIC: &str = "/base_scan";
pub const ODOM_TOPIC: &str = "/base_pose_ground_truth";

const BAG_HEADER_LEN: usize = 4096;

/// Builder for ROS1 message payloads
#[derive(Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.0.write_u32::<LittleEndian>(value).unwrap();
        self
    }

    pub fn f32(mut self, value: f32) -> Self {
        self.0.write_f32::<LittleEndian>(value).unwrap();
        self
    }

    pub fn f64(mut self, value: f64) -> Self {
        self.0.write_f64::<LittleEndian>(value).unwrap();
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        self = self.u32(value.len() as u32);
        self.0.extend_from_slice(value.as_bytes());
        self
    }

    pub fn time(self, time: RosTime) -> Self {
        self.u32(time.secs).u32(time.nsecs)
    }

    pub fn f32_array(mut self, values: &[f32]) -> Self {
        self = self.u32(values.len() as u32);
        values.iter().fold(self, |p, v| p.f32(*v))
    }

    pub fn f64_fixed(self, values: &[f64]) -> Self {
        values.iter().fold(self, |p, v| p.f64(*v))
    }

    pub fn header(self, seq: u32, stamp: RosTime, frame_id: &str) -> Self {
        self.u32(seq).time(stamp).string(frame_id)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// A `sensor_msgs/LaserScan` payload
pub fn laser_scan(seq: u32, stamp: RosTime, ranges: &[f32]) -> Vec<u8> {
    Payload::new()
        .header(seq, stamp, "base_laser_link")
        .f32(-1.5707964)
        .f32(1.5707964)
        .f32(0.017453292)
        .f32(0.0)
        .f32(30.0)
        .f32_array(ranges)
        .f32_array(&[])
        .into_bytes()
}

/// A `nav_msgs/Odometry` payload
pub fn odometry(seq: u32, stamp: RosTime, x: f64, y: f64) -> Vec<u8> {
    let covariance: Vec<f64> = (0..36).map(|i| i as f64).collect();
    Payload::new()
        .header(seq, stamp, "odom")
        .string("base_footprint")
        .f64_fixed(&[x, y, 0.0])
        .f64_fixed(&[0.0, 0.0, 0.0, 1.0])
        .f64_fixed(&covariance)
        .f64_fixed(&[0.5, 0.0, 0.0])
        .f64_fixed(&[0.0, 0.0, 0.1])
        .f64_fixed(&covariance)
        .into_bytes()
}

/// A connection written to the bag
#[derive(Clone)]
pub struct TestConnection {
    pub id: u32,
    pub topic: String,
    pub message_type: String,
    pub md5sum: String,
    pub definition: String,
    pub callerid: Option<String>,
    pub latching: bool,
}

impl TestConnection {
    pub fn new(id: u32, topic: &str, message_type: &str, definition: &str) -> Self {
        Self {
            id,
            topic: topic.to_string(),
            message_type: message_type.to_string(),
            md5sum: format!("{:032x}", id as u128 + 0x90c7ef2dc6895d81024acba2ac42f369),
            definition: definition.to_string(),
            callerid: Some("/stage".to_string()),
            latching: false,
        }
    }
}

struct TestChunk {
    compression: Compression,
    messages: Vec<(u32, RosTime, Vec<u8>)>,
}

/// Assembles a complete bag 2.0 file in memory
pub struct BagBuilder {
    connections: Vec<TestConnection>,
    chunks: Vec<TestChunk>,
    chunk_info: bool,
    index: bool,
    index_version: u32,
    chunk_info_version: u32,
    index_data_first: bool,
    mislabel_messages: bool,
    compression_name: Option<String>,
    misreport_chunk_size: bool,
}

impl Default for BagBuilder {
    fn default() -> Self {
        Self {
            connections: Vec::new(),
            chunks: Vec::new(),
            chunk_info: true,
            index: true,
            index_version: 1,
            chunk_info_version: 1,
            index_data_first: false,
            mislabel_messages: false,
            compression_name: None,
            misreport_chunk_size: false,
        }
    }
}

impl BagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(mut self, connection: TestConnection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Add a chunk holding `messages` as `(connection id, time, payload)`
    pub fn chunk(mut self, compression: Compression, messages: Vec<(u32, RosTime, Vec<u8>)>) -> Self {
        self.chunks.push(TestChunk {
            compression,
            messages,
        });
        self
    }

    /// Write chunk info records pointing at a position with no chunk
    pub fn misplaced_chunk_info(mut self) -> Self {
        self.chunk_info = false;
        self
    }

    /// Leave `index_pos` at zero and omit the index section
    pub fn unindexed(mut self) -> Self {
        self.index = false;
        self
    }

    /// Version written in every index data record
    pub fn index_version(mut self, version: u32) -> Self {
        self.index_version = version;
        self
    }

    /// Version written in every chunk info record
    pub fn chunk_info_version(mut self, version: u32) -> Self {
        self.chunk_info_version = version;
        self
    }

    /// Write an empty index data record ahead of the first chunk
    pub fn index_data_first(mut self) -> Self {
        self.index_data_first = true;
        self
    }

    /// Give message data records a connection id the index does not use
    pub fn mislabel_messages(mut self) -> Self {
        self.mislabel_messages = true;
        self
    }

    /// Store chunks uncompressed but label them with `name`
    pub fn compression_name(mut self, name: &str) -> Self {
        self.compression_name = Some(name.to_string());
        self
    }

    /// Declare one byte more than each chunk's uncompressed size
    pub fn misreport_chunk_size(mut self) -> Self {
        self.misreport_chunk_size = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let base = (13 + BAG_HEADER_LEN) as u64;
        let mut body = Vec::new();
        let mut chunk_positions = Vec::new();

        if self.index_data_first {
            write_record(
                &mut body,
                &[
                    field("op", &[0x04]),
                    field("ver", &self.index_version.to_le_bytes()),
                    field("conn", &1u32.to_le_bytes()),
                    field("count", &0u32.to_le_bytes()),
                ],
                &[],
            );
        }

        for chunk in &self.chunks {
            let chunk_pos = base + body.len() as u64;
            chunk_positions.push(chunk_pos);

            let mut payload = Vec::new();
            let mut offsets: Vec<(u32, RosTime, u32)> = Vec::new();
            let mut written: Vec<u32> = Vec::new();
            for (conn, time, data) in &chunk.messages {
                if !written.contains(conn) {
                    write_connection(&mut payload, self.find(*conn));
                    written.push(*conn);
                }
                offsets.push((*conn, *time, payload.len() as u32));
                let label = if self.mislabel_messages { conn + 100 } else { *conn };
                write_record(
                    &mut payload,
                    &[
                        field("op", &[0x02]),
                        field("conn", &label.to_le_bytes()),
                        field("time", &time_bytes(*time)),
                    ],
                    data,
                );
            }

            let (stored, compression_name) = match &self.compression_name {
                Some(name) => (payload.clone(), name.as_str()),
                None => (compress(chunk.compression, &payload), chunk.compression.as_str()),
            };
            let size = payload.len() as u32 + u32::from(self.misreport_chunk_size);
            write_record(
                &mut body,
                &[
                    field("op", &[0x05]),
                    field("compression", compression_name.as_bytes()),
                    field("size", &size.to_le_bytes()),
                ],
                &stored,
            );

            for conn in &written {
                let mut entries: Vec<&(u32, RosTime, u32)> =
                    offsets.iter().filter(|(c, _, _)| c == conn).collect();
                entries.sort_by_key(|(_, time, _)| *time);
                let mut data = Vec::new();
                for (_, time, offset) in &entries {
                    data.extend_from_slice(&time_bytes(*time));
                    data.extend_from_slice(&offset.to_le_bytes());
                }
                write_record(
                    &mut body,
                    &[
                        field("op", &[0x04]),
                        field("ver", &self.index_version.to_le_bytes()),
                        field("conn", &conn.to_le_bytes()),
                        field("count", &(entries.len() as u32).to_le_bytes()),
                    ],
                    &data,
                );
            }
        }

        let index_pos = if self.index { base + body.len() as u64 } else { 0 };
        if self.index {
            for connection in &self.connections {
                write_connection(&mut body, connection);
            }
            for (chunk, chunk_pos) in self.chunks.iter().zip(&chunk_positions) {
                let chunk_pos = if self.chunk_info { *chunk_pos } else { chunk_pos + 1 };
                write_chunk_info(&mut body, chunk, chunk_pos, self.chunk_info_version);
            }
        }

        let mut bag = b"#ROSBAG V2.0\n".to_vec();
        let header_fields = [
            field("op", &[0x03]),
            field("index_pos", &index_pos.to_le_bytes()),
            field("conn_count", &(self.connections.len() as u32).to_le_bytes()),
            field("chunk_count", &(self.chunks.len() as u32).to_le_bytes()),
        ];
        let header_len: usize = header_fields.iter().map(Vec::len).sum();
        let padding = vec![b' '; BAG_HEADER_LEN - 8 - header_len];
        write_record(&mut bag, &header_fields, &padding);
        assert_eq!(bag.len() as u64, base);

        bag.extend_from_slice(&body);
        bag
    }

    fn find(&self, id: u32) -> &TestConnection {
        self.connections
            .iter()
            .find(|c| c.id == id)
            .unwrap_or_else(|| panic!("no test connection {id}"))
    }
}

fn write_chunk_info(out: &mut Vec<u8>, chunk: &TestChunk, chunk_pos: u64, version: u32) {
    let mut counts: Vec<(u32, u32)> = Vec::new();
    for (conn, _, _) in &chunk.messages {
        match counts.iter_mut().find(|(c, _)| c == conn) {
            Some((_, n)) => *n += 1,
            None => counts.push((*conn, 1)),
        }
    }
    let start = chunk.messages.iter().map(|(_, t, _)| *t).min().unwrap_or_default();
    let end = chunk.messages.iter().map(|(_, t, _)| *t).max().unwrap_or_default();

    let mut data = Vec::new();
    for (conn, n) in &counts {
        data.extend_from_slice(&conn.to_le_bytes());
        data.extend_from_slice(&n.to_le_bytes());
    }
    write_record(
        out,
        &[
            field("op", &[0x06]),
            field("ver", &version.to_le_bytes()),
            field("chunk_pos", &chunk_pos.to_le_bytes()),
            field("start_time", &time_bytes(start)),
            field("end_time", &time_bytes(end)),
            field("count", &(counts.len() as u32).to_le_bytes()),
        ],
        &data,
    );
}

fn write_connection(out: &mut Vec<u8>, connection: &TestConnection) {
    let mut fields = vec![
        field("topic", connection.topic.as_bytes()),
        field("type", connection.message_type.as_bytes()),
        field("md5sum", connection.md5sum.as_bytes()),
        field("message_definition", connection.definition.as_bytes()),
    ];
    if let Some(callerid) = &connection.callerid {
        fields.push(field("callerid", callerid.as_bytes()));
    }
    if connection.latching {
        fields.push(field("latching", b"1"));
    }

    write_record(
        out,
        &[
            field("op", &[0x07]),
            field("conn", &connection.id.to_le_bytes()),
            field("topic", connection.topic.as_bytes()),
        ],
        &fields.concat(),
    );
}

/// `<len><name>=<value>`
pub fn field(name: &str, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>((name.len() + 1 + value.len()) as u32)
        .unwrap();
    out.extend_from_slice(name.as_bytes());
    out.push(b'=');
    out.extend_from_slice(value);
    out
}

/// `<header_len><header><data_len><data>`
pub fn write_record(out: &mut Vec<u8>, header: &[Vec<u8>], data: &[u8]) {
    let header = header.concat();
    out.write_u32::<LittleEndian>(header.len() as u32).unwrap();
    out.extend_from_slice(&header);
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(data);
}

fn time_bytes(time: RosTime) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&time.secs.to_le_bytes());
    bytes[4..].copy_from_slice(&time.nsecs.to_le_bytes());
    bytes
}

fn compress(compression: Compression, payload: &[u8]) -> Vec<u8> {
    use std::io::Write;

    match compression {
        Compression::None => payload.to_vec(),
        Compression::Lz4 => {
            let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
            encoder.write_all(payload).unwrap();
            encoder.finish().unwrap()
        }
        Compression::Bz2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(payload).unwrap();
            encoder.finish().unwrap()
        }
    }
}

/// The standard two-topic test bag.
///
/// Three chunks: an uncompressed one with scans 0..3 and odometry 0..2,
/// then the remaining messages split across two chunks with `compression`.
/// Scans are at `100 + i` seconds, odometry at `100.5 + i` seconds.
pub fn stage_bag(compression: Compression) -> Vec<u8> {
    let scan = |seq: u32| {
        let time = RosTime::new(100 + seq, 0);
        (1u32, time, laser_scan(seq, time, &[1.0 + seq as f32, 2.0, 3.5]))
    };
    let odom = |seq: u32| {
        let time = RosTime::new(100 + seq, 500_000_000);
        (2u32, time, odometry(seq, time, seq as f64, -(seq as f64)))
    };

    BagBuilder::new()
        .connection(TestConnection::new(1, SCAN_TOPIC, "sensor_msgs/LaserScan", LASER_SCAN_DEF))
        .connection(TestConnection::new(2, ODOM_TOPIC, "nav_msgs/Odometry", ODOMETRY_DEF))
        .chunk(Compression::None, vec![scan(0), odom(0), scan(1), odom(1), scan(2)])
        .chunk(compression, vec![odom(2), scan(3), odom(3)])
        .chunk(compression, vec![scan(4), odom(4), scan(5)])
        .build()
}
