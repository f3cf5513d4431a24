use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// 100ns intervals between the Gregorian epoch (1582-10-15) and the Unix epoch.
const GREGORIAN_OFFSET: i128 = 0x01B2_1DD2_1381_4000;
const MAX_TICKS: u64 = (1 << 60) - 1;

/// A version 1 (time-based) UUID. Ordered by embedded timestamp first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeUuid(Uuid);

impl TimeUuid {
    pub fn from_ticks(ticks: u64, clock_seq: u16, node: [u8; 6]) -> Self {
        let ticks = ticks.min(MAX_TICKS);
        let time_low = (ticks & 0xFFFF_FFFF) as u32;
        let time_mid = ((ticks >> 32) & 0xFFFF) as u16;
        let time_hi_and_version = ((ticks >> 48) & 0x0FFF) as u16 | 0x1000;

        let mut tail = [0u8; 8];
        tail[0] = ((clock_seq >> 8) & 0x3F) as u8 | 0x80;
        tail[1] = (clock_seq & 0xFF) as u8;
        tail[2..].copy_from_slice(&node);

        Self(Uuid::from_fields(time_low, time_mid, time_hi_and_version, &tail))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 100ns ticks since the Gregorian epoch.
    pub fn ticks(&self) -> u64 {
        let (time_low, time_mid, time_hi, _) = self.0.as_fields();
        (u64::from(time_hi & 0x0FFF) << 48) | (u64::from(time_mid) << 32) | u64::from(time_low)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let unix_ticks = i128::from(self.ticks()) - GREGORIAN_OFFSET;
        let secs = unix_ticks.div_euclid(10_000_000) as i64;
        let nanos = (unix_ticks.rem_euclid(10_000_000) * 100) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Ord for TimeUuid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticks()
            .cmp(&other.ticks())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for TimeUuid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

fn gregorian_ticks(at: NaiveDateTime) -> u64 {
    let at = at.and_utc();
    let ticks = i128::from(at.timestamp()) * 10_000_000
        + i128::from(at.timestamp_subsec_nanos() / 100)
        + GREGORIAN_OFFSET;
    ticks.clamp(0, i128::from(MAX_TICKS)) as u64
}

/// Node id stamped into every generated id. The multicast bit marks it as
/// not being a real MAC address.
pub const DEFAULT_NODE: [u8; 4] = [0x01, 0x41, 0x51, 0x4C];

/// Issues time-based ids that always carry the row's own timestamp.
///
/// Rows sharing a timestamp are told apart by a per-timestamp sequence
/// number: its high bits go into the clock sequence and its low 16 bits into
/// the tail of the node field, so ids at one timestamp increase in issue
/// order. Nothing random is involved; the same rows in the same order give
/// the same ids, and a repeated load overwrites instead of duplicating.
#[derive(Debug, Clone)]
pub struct TimeUuidGenerator {
    node: [u8; 4],
    issued: HashMap<u64, u32>,
}

impl TimeUuidGenerator {
    pub fn new() -> Self {
        Self::with_node(DEFAULT_NODE)
    }

    pub fn with_node(node: [u8; 4]) -> Self {
        Self {
            node,
            issued: HashMap::new(),
        }
    }

    pub fn next_for(&mut self, at: NaiveDateTime) -> TimeUuid {
        let ticks = gregorian_ticks(at);
        let counter = self.issued.entry(ticks).or_insert(0);
        let sequence = *counter;
        *counter = counter.wrapping_add(1);

        let clock_seq = ((sequence >> 16) & 0x3FFF) as u16;
        let low = (sequence & 0xFFFF) as u16;
        let mut node = [0u8; 6];
        node[..4].copy_from_slice(&self.node);
        node[4..].copy_from_slice(&low.to_be_bytes());

        TimeUuid::from_ticks(ticks, clock_seq, node)
    }
}

impl Default for TimeUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}
