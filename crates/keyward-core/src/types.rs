use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::timestamp;

fn is_false(b: &bool) -> bool {
    !*b
}

/// On-the-wire shape of one domain entry (local container and sync blob).
///
/// Every field is optional so that older and newer writers interoperate:
/// the loader in [`crate::entry`] fills gaps with defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<i64>,
    /// Base64 (standard alphabet)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_template: Option<String>,
    /// Legacy: superseded by `passwordTemplate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    /// Legacy: superseded by `passwordTemplate` + `extras`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_characters: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

/// A record received from the remote store: either a live entry or a
/// deletion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRecord {
    Live(EntryRecord),
    Tombstone { modified: NaiveDateTime },
}

impl RemoteRecord {
    pub fn from_record(record: EntryRecord) -> Self {
        if record.deleted {
            let modified = record
                .m_date
                .as_deref()
                .map(timestamp::parse_or_now)
                .unwrap_or_else(timestamp::now);
            RemoteRecord::Tombstone { modified }
        } else {
            RemoteRecord::Live(record)
        }
    }

    pub fn tombstone(modified: NaiveDateTime) -> Self {
        RemoteRecord::Tombstone { modified }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, RemoteRecord::Tombstone { .. })
    }

    /// Modification time used for last-writer-wins comparisons.
    ///
    /// A live record without a readable `mDate` falls back to its `cDate`,
    /// then to [`NaiveDateTime::MIN`], so it never beats a dated local copy.
    pub fn modified(&self) -> NaiveDateTime {
        match self {
            RemoteRecord::Live(record) => [&record.m_date, &record.c_date]
                .into_iter()
                .flatten()
                .find_map(|date| timestamp::parse(date).ok())
                .unwrap_or(NaiveDateTime::MIN),
            RemoteRecord::Tombstone { modified } => *modified,
        }
    }

    pub fn into_record(self) -> EntryRecord {
        match self {
            RemoteRecord::Live(record) => record,
            RemoteRecord::Tombstone { modified } => EntryRecord {
                m_date: Some(timestamp::format(&modified)),
                deleted: true,
                ..Default::default()
            },
        }
    }
}
