pub mod codec;
pub mod merge;
pub mod service;
pub mod status;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use self::codec::{DecodeError, SwapDescriptor};
use self::status::StatusTag;

const FAILED_SUFFIX: &str = ":FAILED";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Posted,
    Bonded,
    Locked,
    Unlocked,
    Releasing,
    Released,
    Executed,
    Cancelled,
    DirectSwap,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Posted => "POSTED",
            EventKind::Bonded => "BONDED",
            EventKind::Locked => "LOCKED",
            EventKind::Unlocked => "UNLOCKED",
            EventKind::Releasing => "RELEASING",
            EventKind::Released => "RELEASED",
            EventKind::Executed => "EXECUTED",
            EventKind::Cancelled => "CANCELLED",
            EventKind::DirectSwap => "DIRECT-SWAP",
            EventKind::Other(name) => name,
        }
    }

    fn parse(name: &str) -> Self {
        match name {
            "POSTED" => EventKind::Posted,
            "BONDED" => EventKind::Bonded,
            "LOCKED" => EventKind::Locked,
            "UNLOCKED" => EventKind::Unlocked,
            "RELEASING" => EventKind::Releasing,
            "RELEASED" => EventKind::Released,
            "EXECUTED" => EventKind::Executed,
            "CANCELLED" => EventKind::Cancelled,
            "DIRECT-SWAP" => EventKind::DirectSwap,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// Event name as it appears on the wire, e.g. `RELEASED` or `RELEASED:FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EventName {
    pub kind: EventKind,
    pub failed: bool,
}

impl EventName {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            failed: false,
        }
    }
}

impl From<EventKind> for EventName {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

impl From<String> for EventName {
    fn from(s: String) -> Self {
        match s.strip_suffix(FAILED_SUFFIX) {
            Some(base) => Self {
                kind: EventKind::parse(base),
                failed: true,
            },
            None => Self::new(EventKind::parse(&s)),
        }
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.to_string()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if self.failed {
            f.write_str(FAILED_SUFFIX)?;
        }
        Ok(())
    }
}

/// Payload carried by an event. Fields this crate does not interpret are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<EventName>,
    #[serde(flatten)]
    pub data: EventData,
}

impl Event {
    pub fn new(name: impl Into<EventName>, data: EventData) -> Self {
        Self {
            name: Some(name.into()),
            data,
        }
    }

    pub fn kind(&self) -> Option<&EventKind> {
        self.name.as_ref().map(|n| &n.kind)
    }

    pub fn is_failed(&self) -> bool {
        self.data.failed || self.name.as_ref().is_some_and(|n| n.failed)
    }

    /// Whether `self` and `other` describe the same occurrence.
    pub fn same_as(&self, other: &Event) -> bool {
        match (&self.data.hash, &other.data.hash) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name && self.data.ts == other.data.ts,
            _ => false,
        }
    }
}

/// A live notification for one swap, as delivered by the update transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapUpdate {
    pub status: EventName,
    #[serde(default)]
    pub data: EventData,
}

impl SwapUpdate {
    pub fn new(status: impl Into<EventName>, data: EventData) -> Self {
        Self {
            status: status.into(),
            data,
        }
    }

    pub fn to_event(&self) -> Event {
        Event {
            name: Some(self.status.clone()),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromTo {
    pub initiator: Option<String>,
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub id: String,
    pub encoded: String,
    #[serde(default)]
    pub events: Vec<Event>,
    pub created: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonded: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed: Option<u64>,
    #[serde(default)]
    pub from_to: FromTo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub error_confirmed: bool,
}

impl SwapRecord {
    pub fn requested(
        id: impl Into<String>,
        encoded: impl Into<String>,
        initiator: Option<String>,
        created: u64,
    ) -> Self {
        Self {
            id: id.into(),
            encoded: encoded.into(),
            events: Vec::new(),
            created,
            temp_at: None,
            posted: None,
            bonded: None,
            released: None,
            executed: None,
            from_to: FromTo {
                initiator,
                recipient: None,
            },
            provider: None,
            disabled: false,
            modified: false,
            error_confirmed: false,
        }
    }

    /// Placeholder for a swap seen on chain before its request reached us.
    pub fn temporary(encoded: impl Into<String>, initiator: Option<String>, now: u64) -> Self {
        let mut record = Self::requested(uuid::Uuid::new_v4().to_string(), encoded, initiator, now);
        record.temp_at = Some(now);
        record
    }

    pub fn is_temporary(&self) -> bool {
        self.temp_at.is_some()
    }

    pub fn descriptor(&self) -> Result<SwapDescriptor, DecodeError> {
        SwapDescriptor::decode(&self.encoded)
    }

    /// Both the release and the execution have been observed; no further updates matter.
    pub fn is_settled(&self) -> bool {
        self.released.is_some() && self.executed.is_some()
    }

    /// Undecodable records never expire.
    pub fn status_at(&self, now: u64) -> StatusTag {
        let expire_ts = self.descriptor().map_or(u64::MAX, |d| d.expire_ts);
        status::derive_status(&self.events, expire_ts, self.is_temporary(), now)
    }

    pub fn status(&self) -> StatusTag {
        self.status_at(status::unix_now())
    }
}
