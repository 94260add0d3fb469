//! Display a summary of a ROS bag file in the style of `rosbag info`
//!
//! Only the index of the bag is read, no chunk is decompressed, so this is
//! fast even for very large bags.
//!
//! Usage:
//!   cargo run --bin bag_info -- <bag_path>
//!   cargo run --bin bag_info -- <bag_path> --yaml

use anyhow::{Context, Result};
use clap::Parser;
use embag::info::{BagInfo, CompressionSummary};
use embag::{Bag, Compression, RosTime};
use std::path::PathBuf;

/// Summarize a ROS bag file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bag file to summarize
    bag: PathBuf,

    /// Print the summary as YAML
    #[arg(short, long)]
    yaml: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bag = Bag::open(&args.bag)
        .with_context(|| format!("Failed to open bag {}", args.bag.display()))?;
    let info = bag.info();

    if args.yaml {
        print!("{}", serde_yml::to_string(&info).context("Failed to serialize summary")?);
    } else {
        print_summary(&info);
    }

    Ok(())
}

fn print_summary(info: &BagInfo) {
    println!("path:        {}", info.path.as_deref().unwrap_or("<memory>"));
    println!("version:     {}", info.version);
    println!("duration:    {}", format_duration(info.duration));
    if let (Some(start), Some(end)) = (info.start_time(), info.end_time()) {
        println!("start:       {}", format_timestamp(start));
        println!("end:         {}", format_timestamp(end));
    }
    println!("size:        {}", format_size(info.size));
    println!("messages:    {}", info.messages);
    if !info.indexed {
        println!("indexed:     no (messages cannot be read)");
    }
    println!("compression: {}", format_compression(info));

    let type_width = info
        .types
        .iter()
        .map(|t| t.message_type.len())
        .max()
        .unwrap_or(0);
    for (i, summary) in info.types.iter().enumerate() {
        let label = if i == 0 { "types:" } else { "" };
        println!(
            "{label:<13}{:<type_width$} [{}]",
            summary.message_type, summary.md5
        );
    }

    let topic_width = info.topics.iter().map(|t| t.topic.len()).max().unwrap_or(0);
    for (i, summary) in info.topics.iter().enumerate() {
        let label = if i == 0 { "topics:" } else { "" };
        let connections = if summary.connections > 1 {
            format!(" ({} connections)", summary.connections)
        } else {
            String::new()
        };
        println!(
            "{label:<13}{:<topic_width$} {:>7} msgs{connections} : {}",
            summary.topic, summary.messages, summary.message_type
        );
    }
}

/// Format chunk compression the way `rosbag info` does
fn format_compression(info: &BagInfo) -> String {
    if !info.is_compressed() {
        return "none".to_string();
    }

    let total: usize = info.compression.iter().map(|c| c.chunks).sum();
    let mut lines: Vec<String> = info
        .compression
        .iter()
        .map(|summary| format_compression_line(summary, total))
        .collect();
    lines.sort();
    lines.join("\n             ")
}

fn format_compression_line(summary: &CompressionSummary, total_chunks: usize) -> String {
    let ratio = if summary.uncompressed == 0 {
        100.0
    } else {
        summary.compressed as f64 / summary.uncompressed as f64 * 100.0
    };
    let chunk_label = if summary.chunks == 1 { "chunk" } else { "chunks" };
    match summary.format {
        Compression::None => format!("none [{}/{total_chunks} {chunk_label}]", summary.chunks),
        other => format!(
            "{other} [{}/{total_chunks} {chunk_label}; {ratio:.2}%]",
            summary.chunks
        ),
    }
}

/// Format size in human-readable format
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    if whole >= 3600 {
        format!("{}:{:02}:{:02}s ({seconds:.0}s)", whole / 3600, whole % 3600 / 60, whole % 60)
    } else if whole >= 60 {
        format!("{}:{:02}s ({seconds:.0}s)", whole / 60, whole % 60)
    } else {
        format!("{seconds:.1}s")
    }
}

/// Format timestamp in human-readable format
fn format_timestamp(time: RosTime) -> String {
    match time.to_datetime() {
        Some(datetime) => format!(
            "{} ({:.2})",
            datetime.format("%b %e %Y %H:%M:%S%.3f"),
            time.to_sec()
        ),
        None => format!("Invalid timestamp ({time})"),
    }
}
