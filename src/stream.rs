//! Append-only stream values and their two-part entry identifiers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum StreamError {
    #[error("Invalid stream ID specified as stream command argument")]
    Malformed,
    #[error("The ID specified in XADD must be greater than 0-0")]
    ZeroId,
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    Regression,
    #[error("system time is before the unix epoch")]
    Clock,
}

/// A stream entry identifier, written textually as `ms-seq`.
///
/// Ordering is lexicographic on (ms, seq), which is exactly the order entries
/// must be appended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// An entry identifier as requested by a client: fully explicit, or with the
/// sequence (or the whole id) left for the server to generate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdSpec {
    /// `*`: current wall-clock milliseconds, next free sequence.
    Auto,
    /// `<ms>-*`: explicit milliseconds, next free sequence.
    AutoSeq(u64),
    /// `<ms>-<seq>`.
    Explicit(StreamId),
}

impl IdSpec {
    pub fn parse(input: &str) -> Result<Self, StreamError> {
        if input == "*" {
            return Ok(IdSpec::Auto);
        }
        let (ms_part, seq_part) = input.split_once('-').ok_or(StreamError::Malformed)?;
        let ms = ms_part.parse::<u64>().map_err(|_| StreamError::Malformed)?;
        if seq_part == "*" {
            return Ok(IdSpec::AutoSeq(ms));
        }
        let seq = seq_part.parse::<u64>().map_err(|_| StreamError::Malformed)?;
        Ok(IdSpec::Explicit(StreamId { ms, seq }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(String, String)>,
}

/// An append-only ordered log of entries with strictly increasing ids.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
}

impl Stream {
    pub fn new() -> Self {
        Stream::default()
    }

    pub fn top(&self) -> Option<&StreamEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Appends an entry, resolving auto-generated id parts.
    ///
    /// An explicit id must be strictly greater than the current top; `0-0` is
    /// rejected outright.
    pub fn append(
        &mut self,
        spec: IdSpec,
        fields: Vec<(String, String)>,
    ) -> Result<StreamId, StreamError> {
        let id = match spec {
            IdSpec::Explicit(id) => {
                if id == (StreamId { ms: 0, seq: 0 }) {
                    return Err(StreamError::ZeroId);
                }
                if let Some(top) = self.top() {
                    if id <= top.id {
                        return Err(StreamError::Regression);
                    }
                }
                id
            }
            IdSpec::AutoSeq(ms) => StreamId {
                ms,
                seq: self.next_sequence(ms)?,
            },
            IdSpec::Auto => {
                let now = unix_millis()?;
                match self.top() {
                    Some(top) if top.id.ms >= now => StreamId {
                        ms: top.id.ms,
                        seq: top.id.seq + 1,
                    },
                    _ => StreamId { ms: now, seq: 0 },
                }
            }
        };

        self.entries.push(StreamEntry { id, fields });
        Ok(id)
    }

    /// The next free sequence number for `ms`, starting at 0 except for the
    /// reserved `0-0`.
    fn next_sequence(&self, ms: u64) -> Result<u64, StreamError> {
        match self.top() {
            Some(top) if top.id.ms > ms => Err(StreamError::Regression),
            Some(top) if top.id.ms == ms => Ok(top.id.seq + 1),
            _ => Ok(if ms == 0 { 1 } else { 0 }),
        }
    }
}

fn unix_millis() -> Result<u64, StreamError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .map_err(|_| StreamError::Clock)
}
