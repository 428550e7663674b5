use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{Event, EventKind};

/// Canonical lifecycle status of a swap.
///
/// A trailing `*` marks a swap past expiry that needs a recovery action;
/// `...` marks a release that has been submitted but not confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusTag {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "TEMPORARY")]
    Temporary,
    #[serde(rename = "POSTED")]
    Posted,
    #[serde(rename = "BONDED")]
    Bonded,
    #[serde(rename = "LOCKED")]
    Locked,
    #[serde(rename = "RELEASING")]
    Releasing,
    #[serde(rename = "RELEASING...")]
    ReleasingInFlight,
    #[serde(rename = "RELEASING*")]
    ReleasingOverdue,
    #[serde(rename = "RELEASED")]
    Released,
    #[serde(rename = "EXECUTED")]
    Executed,
    #[serde(rename = "UNLOCKED")]
    Unlocked,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "CANCELLED*")]
    CancelledOverdue,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "EXPIRED*")]
    ExpiredOverdue,
    #[serde(rename = "DROPPED")]
    Dropped,
}

impl StatusTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusTag::Pending => "PENDING",
            StatusTag::Temporary => "TEMPORARY",
            StatusTag::Posted => "POSTED",
            StatusTag::Bonded => "BONDED",
            StatusTag::Locked => "LOCKED",
            StatusTag::Releasing => "RELEASING",
            StatusTag::ReleasingInFlight => "RELEASING...",
            StatusTag::ReleasingOverdue => "RELEASING*",
            StatusTag::Released => "RELEASED",
            StatusTag::Executed => "EXECUTED",
            StatusTag::Unlocked => "UNLOCKED",
            StatusTag::Cancelled => "CANCELLED",
            StatusTag::CancelledOverdue => "CANCELLED*",
            StatusTag::Expired => "EXPIRED",
            StatusTag::ExpiredOverdue => "EXPIRED*",
            StatusTag::Dropped => "DROPPED",
        }
    }

    /// Name without the `*` / `...` suffix.
    pub fn base(self) -> &'static str {
        self.as_str().trim_end_matches(['*', '.'])
    }

    pub fn needs_action(self) -> bool {
        self.as_str().ends_with('*')
    }

    pub fn is_in_flight(self) -> bool {
        self.as_str().ends_with("...")
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatusTag::Released | StatusTag::Executed | StatusTag::Unlocked | StatusTag::Cancelled
        )
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Tally {
    posted: usize,
    bonded: usize,
    locks: usize,
    unlocks: usize,
    releasing: usize,
    releases: usize,
    executions: usize,
    cancels: usize,
    latest_release_ts: Option<u64>,
    latest_execution_ts: Option<u64>,
}

impl Tally {
    fn from_events(events: &[Event]) -> Self {
        let mut tally = Self::default();
        for event in events {
            let Some(kind) = event.kind() else {
                tracing::trace!("skip event without name");
                continue;
            };
            if event.is_failed() {
                continue;
            }
            let ts = event.data.ts;
            match kind {
                EventKind::Posted => tally.posted += 1,
                EventKind::Bonded => tally.bonded += 1,
                EventKind::Locked => tally.locks += 1,
                EventKind::Unlocked => tally.unlocks += 1,
                EventKind::Releasing => tally.releasing += 1,
                EventKind::Released => {
                    tally.releases += 1;
                    tally.latest_release_ts = tally.latest_release_ts.max(ts);
                }
                EventKind::Executed => {
                    tally.executions += 1;
                    tally.latest_execution_ts = tally.latest_execution_ts.max(ts);
                }
                EventKind::Cancelled => tally.cancels += 1,
                EventKind::DirectSwap | EventKind::Other(_) => {}
            }
        }
        tally
    }

    fn lock_outstanding(&self) -> bool {
        self.locks > self.unlocks + self.releases
    }

    fn is_empty(&self) -> bool {
        self.posted
            + self.bonded
            + self.locks
            + self.unlocks
            + self.releasing
            + self.releases
            + self.executions
            + self.cancels
            == 0
    }
}

/// Derives the canonical status from the full event set.
///
/// Events without a name and failed events do not participate. `now` and
/// `expire_ts` are unix seconds; a swap is expired once `now > expire_ts`.
pub fn derive_status(
    events: &[Event],
    expire_ts: u64,
    is_temporary: bool,
    now: u64,
) -> StatusTag {
    let tally = Tally::from_events(events);
    let expired = now > expire_ts;

    if tally.releases > 0 {
        return match (tally.latest_execution_ts, tally.latest_release_ts) {
            (Some(executed), Some(released)) if executed > released => StatusTag::Executed,
            _ => StatusTag::Released,
        };
    }
    if tally.executions > 0 {
        return if tally.releasing > 0 {
            StatusTag::ReleasingInFlight
        } else if expired {
            StatusTag::ReleasingOverdue
        } else {
            StatusTag::Releasing
        };
    }
    if tally.lock_outstanding() && expired {
        return StatusTag::CancelledOverdue;
    }
    if tally.cancels > 0 {
        return StatusTag::Cancelled;
    }
    if expired {
        return if is_temporary && tally.is_empty() {
            StatusTag::Dropped
        } else if tally.locks > 0 {
            StatusTag::ExpiredOverdue
        } else {
            StatusTag::Expired
        };
    }
    if tally.lock_outstanding() {
        return StatusTag::Locked;
    }
    if tally.locks > 0 {
        return StatusTag::Unlocked;
    }
    if tally.bonded > 0 {
        return StatusTag::Bonded;
    }
    if tally.posted > 0 {
        return StatusTag::Posted;
    }
    if is_temporary && tally.is_empty() {
        return StatusTag::Temporary;
    }
    StatusTag::Pending
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
