//! Point-in-time records of the network configuration
// (c) 2024 NetTune contributors

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use chrono::NaiveDateTime;
use serde::{de, de::Visitor, Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::os::NetworkFacts;

mod restore;
pub use restore::{plan_restore, restore, safety_backup, RestorePlan};

mod store;
pub use store::{SnapshotStore, StoreError};

/// Stands in for a buffer value which could not be read
pub const VALUE_NOT_FOUND: &str = "Not found";
/// Stands in for the default interface when there is none
pub const INTERFACE_NOT_FOUND: &str = "Not Found";
/// Stands in for the MTU when there was no interface to ask
pub const MTU_NOT_APPLICABLE: &str = "N/A";
/// Stands in for a value whose lookup failed
pub const UNKNOWN: &str = "Unknown";

/// Label given to the automatic backup taken before any change is applied
pub const BACKUP_LABEL: &str = "bk";

/// Format of [`Metadata::timestamp`]
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where and when a snapshot was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// OS family (`Linux` or `Darwin`)
    pub os: String,
    /// Local time of capture, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    /// Default outbound interface at capture time, or [`INTERFACE_NOT_FOUND`]
    pub interface: String,
}

/// The recorded parameter values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Buffer parameter label to value; [`VALUE_NOT_FOUND`] where unreadable
    pub tcp_buffers: BTreeMap<String, String>,
    /// Congestion control algorithm, or [`UNKNOWN`]
    pub congestion_control: String,
    /// Interface MTU, [`MTU_NOT_APPLICABLE`] or [`UNKNOWN`]
    #[serde(deserialize_with = "string_or_int")]
    pub mtu: String,
}

/// A snapshot of the network configuration, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Where and when
    pub metadata: Metadata,
    /// What
    pub settings: Settings,
}

impl ConfigSnapshot {
    /// Records the current state of the host
    #[must_use]
    pub fn capture<F: NetworkFacts + ?Sized>(facts: &F, now: NaiveDateTime) -> Self {
        let interface = facts.default_interface();
        let mtu = match &interface {
            Some(i) => facts.mtu(i).unwrap_or_else(|| UNKNOWN.into()),
            None => MTU_NOT_APPLICABLE.into(),
        };
        let tcp_buffers = facts
            .tcp_buffers()
            .into_iter()
            .map(|(label, value)| (label, value.unwrap_or_else(|| VALUE_NOT_FOUND.into())))
            .collect();
        let snapshot = Self {
            metadata: Metadata {
                os: facts.family().to_string(),
                timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
                interface: interface.unwrap_or_else(|| INTERFACE_NOT_FOUND.into()),
            },
            settings: Settings {
                tcp_buffers,
                congestion_control: facts
                    .congestion_control()
                    .unwrap_or_else(|| UNKNOWN.into()),
                mtu,
            },
        };
        debug!("captured {snapshot:?}");
        snapshot
    }

    /// The capture time, if the timestamp is well-formed
    #[must_use]
    pub fn captured_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.metadata.timestamp, TIMESTAMP_FORMAT).ok()
    }
}

/// Names a stored snapshot: `{os}_{YYYYMMDD}_{HHMMSS}[_{label}]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Derives the identifier for a snapshot.
    ///
    /// The label is reduced to characters that are safe in a filename.
    #[must_use]
    pub fn for_snapshot(os: &str, at: NaiveDateTime, label: Option<&str>) -> Self {
        let mut id = format!("{}_{}", os.to_lowercase(), at.format("%Y%m%d_%H%M%S"));
        if let Some(label) = label.map(sanitise_label).filter(|l| !l.is_empty()) {
            id.push('_');
            id.push_str(&label);
        }
        Self(id)
    }

    /// The identifier as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a user-supplied identifier. A trailing `.json` is accepted and removed.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        let s = s.trim();
        let s = s.strip_suffix(".json").unwrap_or(s);
        if s.is_empty() || s.contains(['/', '\\']) || s.contains("..") {
            return Err(StoreError::InvalidId(s.into()));
        }
        Ok(Self(s.into()))
    }
}

impl Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SnapshotId {
    type Err = StoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn sanitise_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Older snapshot files recorded the MTU as a number
struct StringOrInt;

impl Visitor<'_> for StringOrInt {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("int or string")
    }

    fn visit_str<E>(self, value: &str) -> Result<String, E>
    where
        E: de::Error,
    {
        Ok(value.into())
    }

    fn visit_u64<E>(self, value: u64) -> Result<String, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_i64<E>(self, value: i64) -> Result<String, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }
}

fn string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(StringOrInt)
}
