//! Hybrid logical clock timestamps.
//!
//! A timestamp serializes to a fixed-width, collatable string:
//!
//! ```text
//! 2015-04-24T22:23:42.123Z-1000-0123456789abcdef
//! \______________________/ \__/ \______________/
//!      wall time (ms)      counter     node
//! ```
//!
//! Because every field before the node is zero-padded, comparing the strings
//! gives the same answer as comparing the timestamps.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};

use crate::error::{ProtocolError, ProtocolResult};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const DATETIME_LEN: usize = 24;
const COUNTER_LEN: usize = 4;

/// Last millisecond of year 9999; later instants do not fit the fixed width.
pub const MAX_MILLIS: i64 = 253_402_300_799_999;

/// Length of generated node ids.
pub const NODE_ID_LEN: usize = 16;

/// A logical timestamp.
///
/// Field order matters: the derived ordering compares wall time, then
/// counter, then node, which matches the ordering of the string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalTimestamp {
    millis: i64,
    counter: u16,
    node: String,
}

impl LogicalTimestamp {
    /// Creates a timestamp from its parts.
    ///
    /// # Errors
    ///
    /// Fails if `millis` is outside `0..=MAX_MILLIS` or the node is empty
    /// or contains a `-`.
    pub fn new(millis: i64, counter: u16, node: impl Into<String>) -> ProtocolResult<Self> {
        let node = node.into();
        if !(0..=MAX_MILLIS).contains(&millis) {
            return Err(ProtocolError::invalid_timestamp(
                millis.to_string(),
                "wall time outside 1970..=9999",
            ));
        }
        validate_node(&node)?;
        Ok(Self {
            millis,
            counter,
            node,
        })
    }

    /// The smallest timestamp for `node`, used to request the full history.
    ///
    /// # Errors
    ///
    /// Fails if the node id is invalid.
    pub fn zero(node: impl Into<String>) -> ProtocolResult<Self> {
        Self::new(0, 0, node)
    }

    /// Milliseconds since the Unix epoch.
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Per-millisecond counter.
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Node (client) id.
    pub fn node(&self) -> &str {
        &self.node
    }
}

fn validate_node(node: &str) -> ProtocolResult<()> {
    if node.is_empty() {
        return Err(ProtocolError::invalid_timestamp(node, "empty node id"));
    }
    if node.contains('-') {
        return Err(ProtocolError::invalid_timestamp(node, "node id contains '-'"));
    }
    Ok(())
}

impl fmt::Display for LogicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let datetime = DateTime::from_timestamp_millis(self.millis).ok_or(fmt::Error)?;
        write!(
            f,
            "{}-{:04X}-{}",
            datetime.format(DATETIME_FORMAT),
            self.counter,
            self.node
        )
    }
}

impl FromStr for LogicalTimestamp {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        // The date contains dashes, so split from the right.
        let mut parts = s.rsplitn(3, '-');
        let (Some(node), Some(counter), Some(datetime)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::invalid_timestamp(s, "expected <time>-<counter>-<node>"));
        };

        if datetime.len() != DATETIME_LEN {
            return Err(ProtocolError::invalid_timestamp(s, "wall time is not fixed width"));
        }
        let naive = NaiveDateTime::parse_from_str(datetime, DATETIME_FORMAT)
            .map_err(|e| ProtocolError::invalid_timestamp(s, e.to_string()))?;

        if counter.len() != COUNTER_LEN
            || !counter
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        {
            return Err(ProtocolError::invalid_timestamp(
                s,
                "counter must be four upper-case hex digits",
            ));
        }
        let counter = u16::from_str_radix(counter, 16)
            .map_err(|e| ProtocolError::invalid_timestamp(s, e.to_string()))?;

        Self::new(naive.and_utc().timestamp_millis(), counter, node)
    }
}

/// Generates a node id: the last 16 hex digits of a random UUID.
pub fn generate_node_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    simple[simple.len() - NODE_ID_LEN..].to_string()
}

/// Current wall time in milliseconds.
pub fn wall_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A hybrid logical clock owned by one session.
///
/// Timestamps issued by one clock are strictly increasing even when the wall
/// clock stalls or steps backwards.
#[derive(Debug, Clone)]
pub struct HulcClock {
    last: LogicalTimestamp,
}

impl HulcClock {
    /// Creates a clock for `node`, starting at the zero timestamp.
    ///
    /// # Errors
    ///
    /// Fails if the node id is invalid.
    pub fn new(node: impl Into<String>) -> ProtocolResult<Self> {
        Ok(Self {
            last: LogicalTimestamp::zero(node)?,
        })
    }

    /// Creates a clock with a freshly generated node id.
    pub fn generate() -> Self {
        Self {
            last: LogicalTimestamp {
                millis: 0,
                counter: 0,
                node: generate_node_id(),
            },
        }
    }

    /// Restores a clock from a previously issued timestamp, keeping its node.
    pub fn from_timestamp(ts: &LogicalTimestamp) -> Self {
        Self { last: ts.clone() }
    }

    /// Node id stamped on every issued timestamp.
    pub fn node(&self) -> &str {
        &self.last.node
    }

    /// The most recent timestamp issued or observed.
    pub fn last(&self) -> &LogicalTimestamp {
        &self.last
    }

    /// The zero timestamp for this clock's node.
    pub fn zero(&self) -> LogicalTimestamp {
        LogicalTimestamp {
            millis: 0,
            counter: 0,
            node: self.last.node.clone(),
        }
    }

    /// Issues a timestamp for a local event at the current wall time.
    ///
    /// # Errors
    ///
    /// See [`HulcClock::tick_at`].
    pub fn now(&mut self) -> ProtocolResult<LogicalTimestamp> {
        self.tick_at(wall_millis())
    }

    /// Issues a timestamp for a local event at wall time `physical`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ClockOverflow`] when the counter would pass
    /// `0xFFFF` within one millisecond.
    pub fn tick_at(&mut self, physical: i64) -> ProtocolResult<LogicalTimestamp> {
        let millis = self.last.millis.max(physical.clamp(0, MAX_MILLIS));
        let counter = if millis == self.last.millis {
            self.last
                .counter
                .checked_add(1)
                .ok_or(ProtocolError::ClockOverflow { millis })?
        } else {
            0
        };
        self.last.millis = millis;
        self.last.counter = counter;
        Ok(self.last.clone())
    }

    /// Folds a remote timestamp into the clock at the current wall time.
    ///
    /// # Errors
    ///
    /// See [`HulcClock::observe_at`].
    pub fn observe(&mut self, remote: &LogicalTimestamp) -> ProtocolResult<()> {
        self.observe_at(remote, wall_millis())
    }

    /// Folds a remote timestamp into the clock so later local timestamps sort
    /// after it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ClockOverflow`] on counter overflow.
    pub fn observe_at(&mut self, remote: &LogicalTimestamp, physical: i64) -> ProtocolResult<()> {
        let local = self.last.millis;
        let millis = local.max(remote.millis).max(physical.clamp(0, MAX_MILLIS));
        let base = match (millis == local, millis == remote.millis) {
            (true, true) => Some(self.last.counter.max(remote.counter)),
            (true, false) => Some(self.last.counter),
            (false, true) => Some(remote.counter),
            (false, false) => None,
        };
        let counter = match base {
            Some(c) => c
                .checked_add(1)
                .ok_or(ProtocolError::ClockOverflow { millis })?,
            None => 0,
        };
        self.last.millis = millis;
        self.last.counter = counter;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_reference_timestamp() {
        // 2020-10-11T12:13:14.015Z
        let ts = LogicalTimestamp::new(1_602_418_394_015, 0, "foo").unwrap();
        assert_eq!(ts.to_string(), "2020-10-11T12:13:14.015Z-0000-foo");
    }

    #[test]
    fn zero_timestamp() {
        let ts = LogicalTimestamp::zero("0123456789abcdef").unwrap();
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00.000Z-0000-0123456789abcdef");
    }

    #[test]
    fn parse_recovers_parts() {
        let ts: LogicalTimestamp = "2015-04-24T22:23:42.123Z-1000-A219E7A71CC18912"
            .parse()
            .unwrap();
        assert_eq!(ts.counter(), 0x1000);
        assert_eq!(ts.node(), "A219E7A71CC18912");
        assert_eq!(
            ts.to_string(),
            "2015-04-24T22:23:42.123Z-1000-A219E7A71CC18912"
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        for raw in [
            "",
            "foo",
            "2015-04-24T22:23:42.123Z-1000-",
            "2015-04-24T22:23:42Z-1000-node",
            "2015-04-24T22:23:42.123Z-10000-node",
            "2015-04-24T22:23:42.123Z-abcd-node",
            "2015-13-24T22:23:42.123Z-0000-node",
        ] {
            assert!(raw.parse::<LogicalTimestamp>().is_err(), "{raw} parsed");
        }
    }

    #[test]
    fn ticks_are_strictly_increasing() {
        let mut clock = HulcClock::new("node").unwrap();
        let a = clock.tick_at(1000).unwrap();
        let b = clock.tick_at(1000).unwrap();
        let c = clock.tick_at(999).unwrap();
        let d = clock.tick_at(2000).unwrap();
        assert!(a < b && b < c && c < d);
        assert_eq!(c.millis(), 1000);
        assert_eq!(c.counter(), 2);
        assert_eq!(d.counter(), 0);
    }

    #[test]
    fn counter_overflow_is_an_error() {
        let ts = LogicalTimestamp::new(5, u16::MAX, "node").unwrap();
        let mut clock = HulcClock::from_timestamp(&ts);
        assert_eq!(
            clock.tick_at(5),
            Err(ProtocolError::ClockOverflow { millis: 5 })
        );
    }

    #[test]
    fn observe_moves_past_remote() {
        let mut clock = HulcClock::new("local").unwrap();
        let remote = LogicalTimestamp::new(10_000, 7, "remote").unwrap();
        clock.observe_at(&remote, 500).unwrap();
        let next = clock.tick_at(500).unwrap();
        assert_eq!(next.millis(), 10_000);
        assert_eq!(next.counter(), 9);
        assert_eq!(next.node(), "local");
    }

    #[test]
    fn generated_node_ids() {
        let node = generate_node_id();
        assert_eq!(node.len(), NODE_ID_LEN);
        assert!(node.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(node, generate_node_id());
    }

    proptest! {
        #[test]
        fn string_order_matches_timestamp_order(
            a in 0..MAX_MILLIS, b in 0..MAX_MILLIS,
            ca in any::<u16>(), cb in any::<u16>(),
        ) {
            let x = LogicalTimestamp::new(a, ca, "0123456789abcdef").unwrap();
            let y = LogicalTimestamp::new(b, cb, "0123456789abcdef").unwrap();
            prop_assert_eq!(x.cmp(&y), x.to_string().cmp(&y.to_string()));
            prop_assert_eq!(x.to_string().parse::<LogicalTimestamp>().unwrap(), x);
        }
    }
}
