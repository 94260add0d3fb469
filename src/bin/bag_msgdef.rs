//! Print the message definition recorded for a topic
//!
//! Nested types are expanded in place using the embedded definitions of the
//! connection, which shows exactly how the messages on the topic are decoded.
//!
//! Usage:
//!   cargo run --bin bag_msgdef -- <bag_path> <topic>

use anyhow::{bail, Context, Result};
use clap::Parser;
use embag::deserializer::MAX_DEPTH;
use embag::{Bag, Member, MsgDef};

/// Show the message definition of a topic in a ROS bag file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bag file to read
    bag: std::path::PathBuf,

    /// Topic whose definition is printed
    topic: String,

    /// Print the definition text as recorded instead of the parsed tree
    #[arg(long)]
    text: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bag = Bag::open(&args.bag)
        .with_context(|| format!("Failed to open bag {}", args.bag.display()))?;

    let connections = bag.connections_for_topic(&args.topic);
    let Some(connection) = connections.first() else {
        bail!(
            "Topic {} not found. Available topics: {}",
            args.topic,
            bag.topics().join(", ")
        );
    };

    println!("# {} [{}]", connection.data.message_type, connection.data.md5sum);
    if args.text {
        print!("{}", connection.data.message_definition);
        return Ok(());
    }

    print_members(
        &connection.schema,
        &connection.data.scope,
        &connection.schema.members,
        0,
    )
}

fn print_members(def: &MsgDef, scope: &str, members: &[Member], depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        bail!("Message definition nests deeper than {MAX_DEPTH} levels");
    }

    let indent = "  ".repeat(depth);
    for member in members {
        println!("{indent}{member}");

        let Member::Field(field) = member else {
            continue;
        };
        if field.primitive().is_some() {
            continue;
        }

        let embedded = def.embedded_type(scope, field)?;
        print_members(def, embedded.scope(), &embedded.members, depth + 1)?;
    }

    Ok(())
}
