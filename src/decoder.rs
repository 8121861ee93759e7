//! Incremental extraction of complete JSON objects from raw byte streams.
//!
//! Providers deliver streamed responses in one of two wire shapes: bare
//! concatenated JSON objects (sometimes wrapped in a top-level array) or
//! SSE-style framing where each object follows a `data:` marker. Network
//! chunk boundaries fall anywhere, so both shapes are decoded through one
//! stateful buffer that only ever emits whole, valid objects.

use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::Error;

/// Hard cap on buffered bytes while waiting for an object to complete.
const MAX_BUFFER_BYTES: usize = 32 * 1024 * 1024;

/// Upper bound on extraction steps per feed. Every step consumes input,
/// so this only matters for absurdly dense feeds; leftovers surface on
/// the next call.
const MAX_STEPS_PER_FEED: usize = 65_536;

/// Stateful decoder turning arbitrarily-chunked wire bytes into complete
/// JSON object strings.
///
/// One instance belongs to exactly one streaming call. Call [`feed`] for
/// every network read and [`finish`] when the stream ends; a partial
/// object left in the buffer at that point is discarded, never emitted.
///
/// [`feed`]: ChunkDecoder::feed
/// [`finish`]: ChunkDecoder::finish
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
    scan: Scan,
}

/// Resumable object-scan state. `pos` is the next byte to examine; the
/// object under scan always starts at buffer index 0. Reset whenever the
/// consumed prefix is drained.
#[derive(Debug, Default)]
struct Scan {
    pos: usize,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

enum Step {
    Object(String),
    Discarded,
    NeedMore,
}

enum Noise {
    ObjectAhead,
    NeedMore,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of wire bytes and return every complete JSON
    /// object that became available.
    ///
    /// One call may yield zero, one, or many objects; callers must not
    /// assume any alignment between chunks and objects.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut objects = Vec::new();
        for _ in 0..MAX_STEPS_PER_FEED {
            match self.step() {
                Step::Object(text) => objects.push(text),
                Step::Discarded => continue,
                Step::NeedMore => break,
            }
        }

        if self.buffer.len() > MAX_BUFFER_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "buffer exceeded cap without a complete object, discarding"
            );
            self.buffer.clear();
            self.scan = Scan::default();
        }

        objects
    }

    /// Signal end of stream. An unconsumed partial object is dropped.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(
                discarded = self.buffer.len(),
                "discarding partial buffer at stream end"
            );
            self.buffer.clear();
        }
        self.scan = Scan::default();
    }

    /// Advance by one extracted object, one discarded candidate, or
    /// stop until more bytes arrive.
    fn step(&mut self) -> Step {
        if self.scan.pos == 0 {
            match self.skip_noise() {
                Noise::ObjectAhead => {}
                Noise::NeedMore => return Step::NeedMore,
            }
        }

        // The object starts at index 0; scan for its closing brace while
        // tracking string-literal state so braces inside string values
        // never affect the depth count.
        while self.scan.pos < self.buffer.len() {
            let byte = self.buffer[self.scan.pos];
            self.scan.pos += 1;

            if self.scan.in_string {
                if self.scan.escaped {
                    self.scan.escaped = false;
                } else if byte == b'\\' {
                    self.scan.escaped = true;
                } else if byte == b'"' {
                    self.scan.in_string = false;
                }
            } else {
                match byte {
                    b'"' => self.scan.in_string = true,
                    b'{' => self.scan.depth += 1,
                    b'}' => {
                        self.scan.depth -= 1;
                        if self.scan.depth == 0 {
                            let end = self.scan.pos;
                            let candidate: Vec<u8> = self.buffer.drain(..end).collect();
                            self.scan = Scan::default();
                            return Self::emit(candidate);
                        }
                    }
                    _ => {}
                }
            }
        }

        Step::NeedMore
    }

    /// Strip framing noise from the buffer front until an object opens:
    /// whitespace, commas and `]` (array framing), `[DONE]` markers,
    /// `data:` prefixes, and whole `event:` lines. A partial marker at
    /// the end of the buffer waits for more bytes.
    fn skip_noise(&mut self) -> Noise {
        let mut skip = 0;
        let result = loop {
            let rest = &self.buffer[skip..];
            break match rest.first() {
                None => Noise::NeedMore,
                Some(b'{') => Noise::ObjectAhead,
                Some(b' ' | b'\t' | b'\r' | b'\n' | b',' | b']') => {
                    skip += 1;
                    continue;
                }
                Some(b'[') => {
                    if rest.starts_with(b"[DONE]") {
                        skip += 6;
                        continue;
                    }
                    if b"[DONE]".starts_with(rest) {
                        Noise::NeedMore
                    } else {
                        // Array framing around concatenated objects.
                        skip += 1;
                        continue;
                    }
                }
                Some(b'd') => {
                    if rest.starts_with(b"data:") {
                        skip += 5;
                        continue;
                    }
                    if b"data:".starts_with(rest) {
                        Noise::NeedMore
                    } else {
                        skip += 1;
                        continue;
                    }
                }
                Some(b'e') => {
                    if rest.starts_with(b"event:") {
                        match memchr::memchr(b'\n', rest) {
                            Some(newline) => {
                                skip += newline + 1;
                                continue;
                            }
                            None => Noise::NeedMore,
                        }
                    } else if b"event:".starts_with(rest) {
                        Noise::NeedMore
                    } else {
                        skip += 1;
                        continue;
                    }
                }
                Some(_) => {
                    skip += 1;
                    continue;
                }
            };
        };

        if skip > 0 {
            self.buffer.drain(..skip);
        }
        result
    }

    /// Validate a balanced-brace candidate before emitting it. Balanced
    /// braces are not enough; the candidate must parse as JSON.
    fn emit(candidate: Vec<u8>) -> Step {
        let text = match String::from_utf8(candidate) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "dropping object candidate with invalid UTF-8");
                return Step::Discarded;
            }
        };

        if serde_json::from_str::<&serde_json::value::RawValue>(&text).is_err() {
            tracing::warn!(len = text.len(), "dropping invalid JSON object candidate");
            return Step::Discarded;
        }

        Step::Object(text)
    }
}

/// A stream adapter that decodes JSON objects from a byte stream.
/// Maintains a [`ChunkDecoder`] to handle objects split across chunks.
pub struct JsonObjectStream<S> {
    inner: S,
    decoder: ChunkDecoder,
    pending: VecDeque<String>,
    ended: bool,
}

impl<S> JsonObjectStream<S> {
    /// Create a new decoding stream from a byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            decoder: ChunkDecoder::new(),
            pending: VecDeque::new(),
            ended: false,
        }
    }
}

impl<S, E> Stream for JsonObjectStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            // Yield already-decoded objects in FIFO order first.
            if let Some(object) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(object)));
            }

            if self.ended {
                return Poll::Ready(None);
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    let objects = self.decoder.feed(&chunk);
                    self.pending.extend(objects);
                }
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(Error::decode(format!(
                        "byte stream failed: {}",
                        e.into()
                    )))));
                }
                None => {
                    self.ended = true;
                    self.decoder.finish();
                }
            }
        }
    }
}

/// Extension trait to add JSON object decoding to byte streams.
pub trait JsonObjectStreamExt: Stream {
    /// Decode this byte stream into complete JSON object strings.
    fn json_objects(self) -> JsonObjectStream<Self>
    where
        Self: Sized,
    {
        JsonObjectStream::new(self)
    }
}

impl<S: Stream> JsonObjectStreamExt for S {}
