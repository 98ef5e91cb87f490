use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Activity timestamp, i64 microseconds relative to the unix epoch.
///
/// Peers and client sessions are stamped with one of these on every
/// heartbeat, and the reaper compares them against a cutoff.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

fn micros(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}

impl Timestamp {
    /// The current system time.
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// From microseconds since the unix epoch.
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Microseconds since the unix epoch.
    pub fn as_micros(&self) -> i64 {
        self.0
    }

    /// The instant `d` before this one, `None` if that would fall before
    /// the unix epoch.
    pub fn checked_sub(self, d: Duration) -> Option<Self> {
        self.0
            .checked_sub(micros(d))
            .filter(|m| *m >= 0)
            .map(Self)
    }

    /// The instant `d` after this one, clamped at the far future.
    pub fn saturating_add(self, d: Duration) -> Self {
        Self(self.0.saturating_add(micros(d)))
    }

    /// How long after `earlier` this instant is, `None` if it is not.
    pub fn elapsed_since(self, earlier: Timestamp) -> Option<Duration> {
        let diff = self.0.checked_sub(earlier.0)?;
        u64::try_from(diff).ok().map(Duration::from_micros)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self(micros(d)),
            Err(e) => Self(-micros(e.duration())),
        }
    }
}

/// Source of "now" for modules that stamp entity activity.
pub type DynClock = Arc<dyn Fn() -> Timestamp + 'static + Send + Sync>;

/// A [DynClock] reading the system time.
pub fn system_clock() -> DynClock {
    Arc::new(Timestamp::now)
}
