//! Print the messages of one or more ROS bag files
//!
//! Messages from all given bags are merged in timestamp order and printed as
//! YAML documents, decoded with the definitions stored in the bags.
//!
//! Usage:
//!   cargo run --bin bag_echo -- <bag_path>... [--topic T]... [--start S] [--end E]
//!
//! Examples:
//!   # Every laser scan
//!   cargo run --bin bag_echo -- ./run.bag --topic /base_scan
//!
//!   # Ten seconds of two bags, first 5 messages, payload as hex
//!   cargo run --bin bag_echo -- a.bag b.bag --start 100 --end 110 --limit 5 --raw

use anyhow::{Context, Result};
use clap::Parser;
use embag::{Bag, Message, RosTime, View};
use serde::Serialize;
use std::path::PathBuf;

/// Print messages from ROS bag files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bag files to read
    #[arg(required = true)]
    bags: Vec<PathBuf>,

    /// Topics to print (repeat or comma-separate; all topics if empty)
    #[arg(short, long = "topic", value_delimiter = ',')]
    topics: Vec<String>,

    /// Start time (seconds since epoch, inclusive)
    #[arg(short, long)]
    start: Option<f64>,

    /// End time (seconds since epoch, inclusive)
    #[arg(short, long)]
    end: Option<f64>,

    /// Stop after this many messages
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Print the serialized payload as hex instead of decoding it
    #[arg(long)]
    raw: bool,
}

/// One printed message
#[derive(Serialize)]
struct Echo<'a, T: Serialize> {
    topic: &'a str,
    #[serde(rename = "type")]
    message_type: &'a str,
    time: f64,
    data: T,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bags = args
        .bags
        .iter()
        .map(|path| {
            Bag::open(path).with_context(|| format!("Failed to open bag {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    for topic in &args.topics {
        if !bags.iter().any(|bag| bag.topic_in_bag(topic)) {
            log::warn!("topic {topic} is not present in any bag");
        }
    }

    let view = build_view(&bags, &args);
    log::info!("{} messages selected", view.message_count());

    let limit = args.limit.unwrap_or(usize::MAX);
    for message in view.messages().take(limit) {
        let message = message.context("Failed to read message")?;
        print_message(&message, args.raw)?;
    }

    Ok(())
}

fn build_view<'a>(bags: &'a [Bag], args: &Args) -> View<'a> {
    let mut view = bags.iter().fold(View::new(), |view, bag| view.add_bag(bag));

    if !args.topics.is_empty() {
        view = view.with_topics(args.topics.iter().cloned());
    }
    if args.start.is_some() || args.end.is_some() {
        let start = args.start.map(RosTime::from_sec).unwrap_or_default();
        let end = args
            .end
            .map(RosTime::from_sec)
            .unwrap_or(RosTime::new(u32::MAX, 999_999_999));
        view = view.with_time_range(start, end);
    }

    view
}

fn print_message(message: &Message, raw: bool) -> Result<()> {
    let yaml = if raw {
        serde_yml::to_string(&Echo {
            topic: &message.topic,
            message_type: &message.message_type,
            time: message.timestamp.to_sec(),
            data: hex::encode(&message.raw_data),
        })?
    } else {
        let value = message.data().with_context(|| {
            format!(
                "Failed to decode {} message on {} at {}",
                message.message_type, message.topic, message.timestamp
            )
        })?;
        serde_yml::to_string(&Echo {
            topic: &message.topic,
            message_type: &message.message_type,
            time: message.timestamp.to_sec(),
            data: value,
        })?
    };

    println!("---");
    print!("{yaml}");
    Ok(())
}
