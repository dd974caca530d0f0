//! Outbox job identifiers.
//!
//! An id has the shape `<millis>:<suffix>`: a process-monotonic millisecond
//! timestamp followed by a short random suffix. Ids sort by creation time.

use core::cmp::Ordering;
use core::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

const SUFFIX_LEN: usize = 8;

/// Identifier of one outbox job.
///
/// Ids written by older clients may not follow the `<millis>:<suffix>` shape;
/// those are still accepted (any non-empty token without whitespace or path
/// separators) and sort after well-formed ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutboxId(String);

impl OutboxId {
    fn from_parts(millis: u64, suffix: &str) -> Self {
        Self(format!("{millis}:{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Timestamp component, when the id is well-formed.
    pub fn timestamp_millis(&self) -> Option<u64> {
        let (millis, _) = self.0.split_once(':')?;
        millis.parse().ok()
    }

    /// File-name friendly form. See [`file_safe`].
    pub fn to_file_stem(&self) -> String {
        file_safe(&self.0)
    }
}

/// Injective file-name encoding: `:` becomes `_`, ASCII alphanumerics, `-`
/// and `.` are kept, every other byte (including `_` and `%`) becomes `%XX`.
pub fn file_safe(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ':' => out.push('_'),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{b:02X}"));
                }
            }
        }
    }
    out
}

impl Ord for OutboxId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.timestamp_millis(), other.timestamp_millis()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for OutboxId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl core::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OutboxId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::invalid_id("OutboxId: empty"));
        }
        if s.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(DomainError::invalid_id(format!(
                "OutboxId: unexpected character in {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for OutboxId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OutboxId> for String {
    fn from(value: OutboxId) -> Self {
        value.0
    }
}

/// Generates [`OutboxId`]s that are strictly increasing within a process.
///
/// When the wall clock has not advanced since the previous id (or went
/// backwards) the timestamp component is bumped to `last + 1`.
#[derive(Debug, Default)]
pub struct OutboxIdGenerator {
    last_millis: AtomicU64,
}

static GLOBAL: OutboxIdGenerator = OutboxIdGenerator::new();

impl OutboxIdGenerator {
    pub const fn new() -> Self {
        Self {
            last_millis: AtomicU64::new(0),
        }
    }

    /// Process-wide generator shared by every queue.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Next id using the current wall clock.
    pub fn next_id(&self) -> OutboxId {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.next_at(now)
    }

    /// Next id as if the wall clock read `now_millis`.
    pub fn next_at(&self, now_millis: u64) -> OutboxId {
        let mut last = self.last_millis.load(AtomicOrdering::Acquire);
        loop {
            let candidate = if now_millis > last { now_millis } else { last + 1 };
            match self.last_millis.compare_exchange_weak(
                last,
                candidate,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            ) {
                Ok(_) => return OutboxId::from_parts(candidate, &random_suffix()),
                Err(actual) => last = actual,
            }
        }
    }
}

fn random_suffix() -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(SUFFIX_LEN);
    s
}
