use crate::content::{
    ends_inside_value, write_object, write_operations, ContentParser, Operation, ParsedContent,
};
use crate::error::Result;
use crate::objects::{Object, ObjectId, Resolve};
use std::cell::Cell;
use tracing::{debug, warn};

/// A run of a page body that parses on its own.
///
/// Usually backed by one stream; spans several when an operation was split
/// across stream boundaries.
#[derive(Debug)]
pub struct ContentStream {
    streams: Vec<ObjectId>,
    operations: Vec<Operation>,
    trailing: Vec<Object>,
    valid: Cell<bool>,
}

impl ContentStream {
    pub(crate) fn new(streams: Vec<ObjectId>, parsed: ParsedContent) -> Self {
        Self {
            streams,
            operations: parsed.operations,
            trailing: parsed.trailing,
            valid: Cell::new(true),
        }
    }

    /// Streams backing this segment, in page order.
    pub fn streams(&self) -> &[ObjectId] {
        &self.streams
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Operands left without an operator at the end of the page body.
    pub fn trailing_operands(&self) -> &[Object] {
        &self.trailing
    }

    /// Content bytes of the whole segment.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.operations, &self.trailing)
    }

    /// Content bytes with `operation` inserted before operation `index`.
    pub(crate) fn bytes_with(&self, index: usize, operation: Operation) -> Vec<u8> {
        let mut operations = self.operations.clone();
        operations.insert(index.min(operations.len()), operation);
        encode(&operations, &self.trailing)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub(crate) fn invalidate(&self) {
        self.valid.set(false);
    }

    pub(crate) fn matches(&self, other: &ContentStream) -> bool {
        self.streams == other.streams
            && self.operations == other.operations
            && self.trailing == other.trailing
    }
}

fn encode(operations: &[Operation], trailing: &[Object]) -> Vec<u8> {
    let mut out = write_operations(operations);
    for operand in trailing {
        write_object(operand, &mut out);
        out.push(b' ');
    }
    out
}

/// Parses the streams of a page body into segments.
///
/// A stream whose content does not end on an operator boundary is merged
/// with the following ones until the accumulated bytes parse cleanly. Streams
/// are joined by a newline unless the previous one stops inside a string.
pub(crate) fn build_segments(
    resolver: &dyn Resolve,
    streams: &[ObjectId],
) -> Result<Vec<ContentStream>> {
    let mut segments = Vec::new();
    let mut pending = Vec::new();
    let mut buffer = Vec::new();

    for (index, &id) in streams.iter().enumerate() {
        let value = resolver.resolve(id)?;
        let Some(stream) = value.as_stream() else {
            warn!("content entry {id} is a {}, not a stream", value.type_name());
            continue;
        };
        buffer.extend_from_slice(&stream.decoded_data()?);
        if !ends_inside_value(&buffer) {
            buffer.push(b'\n');
        }
        pending.push(id);

        let is_last = index + 1 == streams.len();
        match ContentParser::parse(&buffer) {
            Ok(parsed) if parsed.is_complete() || is_last => {
                segments.push(ContentStream::new(std::mem::take(&mut pending), parsed));
                buffer.clear();
            }
            Ok(parsed) => debug!(
                "{id} ends with {} dangling operands, merging with the next stream",
                parsed.trailing.len()
            ),
            Err(e) if !is_last => debug!("{id} does not parse alone ({e}), merging"),
            Err(e) => return Err(e),
        }
    }

    if !pending.is_empty() {
        let parsed = ContentParser::parse(&buffer)?;
        segments.push(ContentStream::new(pending, parsed));
    }

    Ok(segments)
}
