//! Per-principal sync versions and optimistic concurrency expectations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Totally ordered version of a profile snapshot.
///
/// Ordering is lexicographic on `(major, minor)`. `major` carries the profile
/// store's revision or a millisecond timestamp; `minor` breaks ties between
/// snapshots that share a `major` (e.g. two events that arrived within the same
/// millisecond).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SyncVersion {
    major: u64,
    minor: u64,
}

impl SyncVersion {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Version taken from the profile store's own revision counter.
    pub const fn from_revision(revision: u64) -> Self {
        Self::new(revision, 0)
    }

    /// Version taken from a wall-clock instant plus a tie-break sequence.
    ///
    /// Instants before the Unix epoch clamp to zero.
    pub fn from_timestamp(at: DateTime<Utc>, sequence: u64) -> Self {
        let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
        Self::new(millis, sequence)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn is_newer_than(&self, other: &SyncVersion) -> bool {
        self > other
    }
}

impl core::fmt::Display for SyncVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Optimistic concurrency expectation for a compare-and-swap on a stored record.
///
/// Record revisions start at 1 on first insert; `Absent` means "no record yet".
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedRevision {
    Absent,
    Exact(u64),
}

impl ExpectedRevision {
    /// Expectation matching what a load returned.
    pub fn of(current: Option<u64>) -> Self {
        match current {
            None => ExpectedRevision::Absent,
            Some(rev) => ExpectedRevision::Exact(rev),
        }
    }

    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedRevision::Absent, None) => true,
            (ExpectedRevision::Exact(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }

    /// Revision the record carries after a successful swap.
    pub fn next(self) -> u64 {
        match self {
            ExpectedRevision::Absent => 1,
            ExpectedRevision::Exact(rev) => rev + 1,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "compare-and-swap failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn minor_breaks_ties() {
        assert!(SyncVersion::new(5, 2).is_newer_than(&SyncVersion::new(5, 1)));
        assert!(SyncVersion::new(6, 0).is_newer_than(&SyncVersion::new(5, 99)));
        assert!(!SyncVersion::new(5, 1).is_newer_than(&SyncVersion::new(5, 1)));
    }

    #[test]
    fn pre_epoch_timestamps_clamp_to_zero() {
        let at = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(SyncVersion::from_timestamp(at, 3), SyncVersion::new(0, 3));
    }

    #[test]
    fn expected_revision_checks() {
        assert!(ExpectedRevision::Absent.matches(None));
        assert!(!ExpectedRevision::Absent.matches(Some(1)));
        assert!(ExpectedRevision::Exact(3).matches(Some(3)));
        assert!(ExpectedRevision::Exact(3).check(Some(4)).is_err());
        assert_eq!(ExpectedRevision::of(None).next(), 1);
        assert_eq!(ExpectedRevision::of(Some(7)).next(), 8);
    }

    proptest! {
        /// Timestamp versions preserve the order of the instants they came from.
        #[test]
        fn timestamp_versions_follow_time(
            a in 0i64..4_000_000_000_000,
            b in 0i64..4_000_000_000_000,
        ) {
            let va = SyncVersion::from_timestamp(Utc.timestamp_millis_opt(a).unwrap(), 0);
            let vb = SyncVersion::from_timestamp(Utc.timestamp_millis_opt(b).unwrap(), 0);
            prop_assert_eq!(a.cmp(&b), va.cmp(&vb));
        }
    }
}
