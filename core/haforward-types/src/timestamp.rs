//! Wall-clock timestamps carried by forwarded commands.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// `Timestamp::UNKNOWN` (zero) marks commands whose sender did not supply a
/// creation time; such commands are never used for latency reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp.
    pub const UNKNOWN: Timestamp = Timestamp(0);

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(millis)
    }

    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Seconds resolution, as used by index fingerprints.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.0 == 0
    }

    /// Time elapsed between this timestamp and `later`, or `None` when the
    /// timestamp is unknown or lies after `later` (clock skew between nodes).
    #[must_use]
    pub fn elapsed_until(&self, later: Timestamp) -> Option<Duration> {
        if self.is_unknown() || later.0 < self.0 {
            return None;
        }
        Some(Duration::from_millis(later.0 - self.0))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::UNKNOWN
    }
}
