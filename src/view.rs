//! Time ordered iteration over the messages of one or more bags

use crate::error::Result;
use crate::reader::Bag;
use crate::types::{Connection, Message, RosTime};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// A filtered, time ordered selection of messages.
///
/// ```no_run
/// use embag::Bag;
///
/// # fn main() -> Result<(), embag::BagError> {
/// let bag = Bag::open("test.bag")?;
/// for message in bag.view().with_topics(["/base_scan"]).messages() {
///     let message = message?;
///     println!("{} {}", message.timestamp, message.topic);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Default, Clone)]
pub struct View<'a> {
    bags: Vec<&'a Bag>,
    topics: Option<HashSet<String>>,
    start: Option<RosTime>,
    end: Option<RosTime>,
}

/// One message position selected by a view
#[derive(Clone, Copy)]
struct Planned<'a> {
    time: RosTime,
    bag: usize,
    chunk: usize,
    offset: u32,
    connection: &'a Connection,
}

impl<'a> View<'a> {
    /// An empty view
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the messages of another bag into this view
    pub fn add_bag(mut self, bag: &'a Bag) -> Self {
        self.bags.push(bag);
        self
    }

    /// Only yield messages on these topics
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Only yield messages with `start <= timestamp <= end`
    pub fn with_time_range(mut self, start: RosTime, end: RosTime) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Connections selected by the topic filter
    pub fn connections(&self) -> Vec<&'a Connection> {
        self.bags
            .iter()
            .flat_map(|&bag| bag.connections())
            .filter(|connection| self.selects(connection))
            .collect()
    }

    fn selects(&self, connection: &Connection) -> bool {
        self.topics
            .as_ref()
            .map_or(true, |topics| topics.contains(&connection.topic))
    }

    fn in_range(&self, time: RosTime) -> bool {
        self.start.map_or(true, |start| time >= start) && self.end.map_or(true, |end| time <= end)
    }

    fn planned(&self) -> impl Iterator<Item = Planned<'a>> + '_ {
        self.bags.iter().enumerate().flat_map(move |(bag_idx, &bag)| {
            bag.connections()
                .filter(move |connection| self.selects(connection))
                .flat_map(move |connection| {
                    connection
                        .blocks
                        .iter()
                        .flat_map(|block| block.entries.iter())
                        .filter(move |entry| self.in_range(entry.time))
                        .map(move |entry| Planned {
                            time: entry.time,
                            bag: bag_idx,
                            chunk: entry.chunk,
                            offset: entry.offset,
                            connection,
                        })
                })
        })
    }

    /// Timestamp of the first message the view yields
    pub fn start_time(&self) -> Option<RosTime> {
        self.planned().map(|p| p.time).min()
    }

    /// Timestamp of the last message the view yields
    pub fn end_time(&self) -> Option<RosTime> {
        self.planned().map(|p| p.time).max()
    }

    /// Number of messages the view yields
    pub fn message_count(&self) -> usize {
        self.planned().count()
    }

    /// Iterate the selected messages in timestamp order
    pub fn messages(&self) -> MessageIter<'a> {
        let mut entries: Vec<Planned<'a>> = self.planned().collect();
        entries.sort_by_key(|p| (p.time, p.bag, p.chunk, p.offset));

        let mut remaining: HashMap<(usize, usize), usize> = HashMap::new();
        for entry in &entries {
            *remaining.entry((entry.bag, entry.chunk)).or_default() += 1;
        }
        log::debug!(
            "view selected {} messages across {} chunks",
            entries.len(),
            remaining.len()
        );

        MessageIter {
            bags: self.bags.clone(),
            entries: entries.into_iter(),
            remaining,
            cache: HashMap::new(),
        }
    }
}

/// Iterator returned by [`View::messages`]
pub struct MessageIter<'a> {
    bags: Vec<&'a Bag>,
    entries: std::vec::IntoIter<Planned<'a>>,
    /// Entries still to be read per (bag, chunk)
    remaining: HashMap<(usize, usize), usize>,
    /// Decompressed chunks still referenced by remaining entries
    cache: HashMap<(usize, usize), Cow<'a, [u8]>>,
}

impl<'a> MessageIter<'a> {
    fn read(&mut self, entry: &Planned<'a>) -> Result<Message> {
        let bag = self.bags[entry.bag];
        let key = (entry.bag, entry.chunk);

        let data = match self.cache.entry(key) {
            Entry::Occupied(cached) => cached.into_mut(),
            Entry::Vacant(slot) => slot.insert(bag.chunk_data(entry.chunk)?),
        };

        bag.read_message(entry.connection, &**data, entry.offset)
    }

    fn release(&mut self, key: (usize, usize)) {
        if let Some(count) = self.remaining.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.remaining.remove(&key);
                self.cache.remove(&key);
            }
        }
    }
}

impl Iterator for MessageIter<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        let result = self.read(&entry);
        self.release((entry.bag, entry.chunk));
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for MessageIter<'_> {}
