//! Value types shared by every session: positions, deliveries and
//! session kinds.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A compound resumable pointer into a topic's log.
///
/// `segment` names the chapter/file of the log, `index` the line within
/// it. Marks order lexicographically and are only comparable within a
/// single topic. The client never fabricates a mark: they come from the
/// caller's resume point or from the broker.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Mark {
    /// Logical chapter of the log.
    pub segment: u64,
    /// Line within the chapter.
    pub index: u64,
}

impl Mark {
    /// Create a mark from its two components.
    pub const fn new(segment: u64, index: u64) -> Self {
        Self { segment, index }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.index)
    }
}

impl FromStr for Mark {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (segment, index) = s
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("invalid mark '{}': expected segment:index", s)))?;
        let segment = segment
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid mark segment '{}'", segment)))?;
        let index = index
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid mark index '{}'", index)))?;
        Ok(Self { segment, index })
    }
}

/// Where a consumer group starts reading in the flat-offset protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetStrategy {
    /// From the first message of the log.
    #[default]
    FromStart,
    /// From the current tail; only new messages are delivered.
    FromCurrent,
    /// From an explicit segment and offset.
    Explicit {
        /// Segment to start in.
        segment: u64,
        /// Offset within the segment.
        offset: u64,
    },
}

impl OffsetStrategy {
    /// Sentinel sent for [`OffsetStrategy::FromStart`].
    pub const FROM_START: i64 = 0;
    /// Sentinel sent for [`OffsetStrategy::FromCurrent`].
    pub const FROM_CURRENT: i64 = -1;

    /// The handshake parameter for this strategy.
    pub fn to_param(&self) -> String {
        match self {
            OffsetStrategy::FromStart => Self::FROM_START.to_string(),
            OffsetStrategy::FromCurrent => Self::FROM_CURRENT.to_string(),
            OffsetStrategy::Explicit { segment, offset } => format!("{}:{}", segment, offset),
        }
    }
}

/// Position of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    /// Compound chapter/line position.
    Mark(Mark),
    /// Flat monotonically increasing offset.
    Offset(u64),
}

impl Position {
    /// Returns the compound mark, if this is one.
    pub fn as_mark(&self) -> Option<Mark> {
        match self {
            Position::Mark(m) => Some(*m),
            Position::Offset(_) => None,
        }
    }

    /// Returns the flat offset, if this is one.
    pub fn as_offset(&self) -> Option<u64> {
        match self {
            Position::Offset(o) => Some(*o),
            Position::Mark(_) => None,
        }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Position::Mark(a), Position::Mark(b)) => Some(a.cmp(b)),
            (Position::Offset(a), Position::Offset(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Mark(m) => m.fmt(f),
            Position::Offset(o) => o.fmt(f),
        }
    }
}

/// One message handed to a tailing session's handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic the message belongs to.
    pub topic: String,
    /// Where the message sits in the log.
    pub position: Position,
    /// Opaque message payload.
    pub message: String,
    /// Set when the broker is replaying an already delivered message.
    pub review: bool,
}

/// The role a connection plays, announced in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Tail a topic from a compound mark (`sr`).
    Read,
    /// Append with compound marks in the response (`sw`).
    Write,
    /// Tail as a member of a consumer group (`c`).
    Consume,
    /// Append with opaque ids in the response (`p`).
    Produce,
    /// Subscribe to group-health summaries (`s`).
    Sync,
}

impl SessionKind {
    /// The wire tag that opens the handshake line.
    pub fn tag(&self) -> &'static str {
        match self {
            SessionKind::Read => "sr",
            SessionKind::Write => "sw",
            SessionKind::Consume => "c",
            SessionKind::Produce => "p",
            SessionKind::Sync => "s",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_ordering_is_lexicographic() {
        assert!(Mark::new(1, 99) < Mark::new(2, 0));
        assert!(Mark::new(2, 3) < Mark::new(2, 4));
        assert_eq!(Mark::new(5, 5), Mark::new(5, 5));
    }

    #[test]
    fn test_mark_parse_and_display() {
        let mark: Mark = "5:12".parse().unwrap();
        assert_eq!(mark, Mark::new(5, 12));
        assert_eq!(mark.to_string(), "5:12");
        assert!("5".parse::<Mark>().is_err());
        assert!("a:1".parse::<Mark>().is_err());
    }

    #[test]
    fn test_position_not_comparable_across_kinds() {
        let a = Position::Mark(Mark::new(1, 1));
        let b = Position::Offset(7);
        assert_eq!(a.partial_cmp(&b), None);
        assert!(Position::Offset(3) < Position::Offset(4));
        assert_eq!(b.as_offset(), Some(7));
        assert_eq!(b.as_mark(), None);
    }

    #[test]
    fn test_offset_strategy_params() {
        assert_eq!(OffsetStrategy::FromStart.to_param(), "0");
        assert_eq!(OffsetStrategy::FromCurrent.to_param(), "-1");
        assert_eq!(
            OffsetStrategy::Explicit {
                segment: 3,
                offset: 40
            }
            .to_param(),
            "3:40"
        );
    }

    #[test]
    fn test_session_kind_tags() {
        assert_eq!(SessionKind::Read.tag(), "sr");
        assert_eq!(SessionKind::Write.tag(), "sw");
        assert_eq!(SessionKind::Consume.tag(), "c");
        assert_eq!(SessionKind::Produce.tag(), "p");
        assert_eq!(SessionKind::Sync.to_string(), "s");
    }
}
