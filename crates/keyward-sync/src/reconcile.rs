//! Last-writer-wins merge of a remote collection into local entries.
//!
//! Only a strictly later remote `mDate` replaces local state; ties keep the
//! local copy. Deletions travel as tombstones and are never materialised as
//! entries.

use keyward_core::types::RemoteRecord;
use keyward_core::DomainEntry;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;

use crate::container::RemoteCollection;

// ── Decision ──────────────────────────────────────────────────────────────────

/// What to do with one remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Unknown locally: add it, marked synced.
    Insert,
    /// Tombstone for a domain we do not have.
    Skip,
    /// Remote is newer: replace the local entry, marked synced.
    Overwrite,
    /// Remote tombstone is newer: drop the local entry.
    Remove,
    /// Same timestamp and content.
    InSync,
    /// Local is at least as new and differs: keep it and push.
    KeepLocal,
}

/// Decide how a remote record applies to the local entry, if any.
pub fn decide<R: RngCore + CryptoRng + ?Sized>(
    domain: &str,
    local: Option<&DomainEntry>,
    remote: &RemoteRecord,
    rng: &mut R,
) -> Decision {
    let Some(local) = local else {
        return if remote.is_tombstone() {
            Decision::Skip
        } else {
            Decision::Insert
        };
    };

    let remote_modified = remote.modified();
    if remote_modified > local.modified() {
        return if remote.is_tombstone() {
            Decision::Remove
        } else {
            Decision::Overwrite
        };
    }

    match remote {
        RemoteRecord::Live(record) if remote_modified == local.modified() => {
            let incoming = DomainEntry::from_record(domain, record, rng);
            if incoming.settings() == local.settings() {
                Decision::InSync
            } else {
                Decision::KeepLocal
            }
        }
        _ => Decision::KeepLocal,
    }
}

// ── Merge ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// The remote lacks local state and should receive a fresh export.
    pub needs_push: bool,
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Merge `remote` into `local` and report whether a push is required.
///
/// Applying the same snapshot twice changes nothing the second time.
pub fn merge<R: RngCore + CryptoRng + ?Sized>(
    local: &mut BTreeMap<String, DomainEntry>,
    remote: &RemoteCollection,
    rng: &mut R,
) -> MergeReport {
    let mut report = MergeReport::default();

    for (domain, record) in remote {
        match decide(domain, local.get(domain), record, rng) {
            Decision::Insert | Decision::Overwrite => {
                let RemoteRecord::Live(record) = record else {
                    continue;
                };
                let mut entry = DomainEntry::from_record(domain.as_str(), record, rng);
                entry.set_synced(true);
                if local.insert(domain.clone(), entry).is_some() {
                    tracing::debug!(%domain, "remote entry is newer");
                    report.updated += 1;
                } else {
                    tracing::debug!(%domain, "new entry from remote");
                    report.inserted += 1;
                }
            }
            Decision::Remove => {
                tracing::debug!(%domain, "deleted remotely");
                local.remove(domain);
                report.removed += 1;
            }
            Decision::InSync => {
                if let Some(entry) = local.get_mut(domain) {
                    entry.set_synced(true);
                }
            }
            Decision::KeepLocal => {
                tracing::debug!(%domain, "local entry is ahead");
                report.needs_push = true;
            }
            Decision::Skip => {}
        }
    }

    if local.keys().any(|domain| !remote.contains_key(domain)) {
        report.needs_push = true;
    }

    tracing::info!(
        inserted = report.inserted,
        updated = report.updated,
        removed = report.removed,
        needs_push = report.needs_push,
        "merged remote settings"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::timestamp;
    use keyward_core::types::EntryRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(99)
    }

    fn entry(domain: &str, modified: &str, username: &str) -> DomainEntry {
        let mut e = DomainEntry::new(domain, &mut rng());
        e.edit(|s| s.username = Some(username.into()));
        e.set_creation_date(timestamp::parse("2015-01-01T00:00:00").unwrap());
        e.set_modification_date(timestamp::parse(modified).unwrap());
        e
    }

    fn live(e: &DomainEntry) -> RemoteRecord {
        RemoteRecord::Live(e.to_record())
    }

    fn tomb(modified: &str) -> RemoteRecord {
        RemoteRecord::tombstone(timestamp::parse(modified).unwrap())
    }

    #[test]
    fn test_insert_unknown_domain() {
        let mut local = BTreeMap::new();
        let remote: RemoteCollection =
            [("a.com".to_string(), live(&entry("a.com", "2016-01-01T00:00:00", "u")))].into();

        let report = merge(&mut local, &remote, &mut rng());

        assert_eq!(report.inserted, 1);
        assert!(!report.needs_push);
        assert!(local["a.com"].is_synced());
        assert_eq!(local["a.com"].username(), "u");
    }

    #[test]
    fn test_newer_remote_overwrites() {
        let mut local = BTreeMap::from([("a.com".to_string(), entry("a.com", "2016-01-01T00:00:00", "old"))]);
        let remote: RemoteCollection =
            [("a.com".to_string(), live(&entry("a.com", "2016-06-01T00:00:00", "new")))].into();

        let report = merge(&mut local, &remote, &mut rng());

        assert_eq!(report.updated, 1);
        assert_eq!(local["a.com"].username(), "new");
        assert!(local["a.com"].is_synced());
    }

    #[test]
    fn test_older_remote_keeps_local_and_pushes() {
        let mut local = BTreeMap::from([("a.com".to_string(), entry("a.com", "2016-06-01T00:00:00", "mine"))]);
        let remote: RemoteCollection =
            [("a.com".to_string(), live(&entry("a.com", "2016-01-01T00:00:00", "theirs")))].into();

        let report = merge(&mut local, &remote, &mut rng());

        assert!(report.needs_push);
        assert_eq!(local["a.com"].username(), "mine");
    }

    #[test]
    fn test_equal_timestamp_different_content_favors_local() {
        let mine = entry("a.com", "2016-01-01T00:00:00", "mine");
        let theirs = entry("a.com", "2016-01-01T00:00:00", "theirs");
        let mut local = BTreeMap::from([("a.com".to_string(), mine)]);
        let remote: RemoteCollection = [("a.com".to_string(), live(&theirs))].into();

        let report = merge(&mut local, &remote, &mut rng());

        assert!(report.needs_push);
        assert_eq!(local["a.com"].username(), "mine");
    }

    #[test]
    fn test_equal_timestamp_same_content_is_in_sync() {
        let e = entry("a.com", "2016-01-01T00:00:00", "u");
        let remote: RemoteCollection = [("a.com".to_string(), live(&e))].into();
        let mut local = BTreeMap::from([("a.com".to_string(), e)]);

        let report = merge(&mut local, &remote, &mut rng());

        assert!(!report.needs_push);
        assert!(local["a.com"].is_synced());
    }

    #[test]
    fn test_newer_tombstone_removes() {
        let mut local = BTreeMap::from([("a.com".to_string(), entry("a.com", "2016-01-01T00:00:00", "u"))]);
        let remote: RemoteCollection = [("a.com".to_string(), tomb("2016-02-01T00:00:00"))].into();

        let report = merge(&mut local, &remote, &mut rng());

        assert_eq!(report.removed, 1);
        assert!(local.is_empty());
    }

    #[test]
    fn test_older_tombstone_keeps_local() {
        let mut local = BTreeMap::from([("a.com".to_string(), entry("a.com", "2016-03-01T00:00:00", "u"))]);
        let remote: RemoteCollection = [("a.com".to_string(), tomb("2016-02-01T00:00:00"))].into();

        let report = merge(&mut local, &remote, &mut rng());

        assert!(report.needs_push);
        assert!(local.contains_key("a.com"));
    }

    #[test]
    fn test_undated_remote_record_applies_once() {
        let record: EntryRecord = serde_json::from_str(r#"{"domain": "a.com", "username": "u"}"#).unwrap();
        let remote: RemoteCollection = [("a.com".to_string(), RemoteRecord::Live(record))].into();
        let mut local = BTreeMap::new();

        let first = merge(&mut local, &remote, &mut rng());
        let after_first = local.clone();
        let second = merge(&mut local, &remote, &mut rng());

        assert_eq!(first.inserted, 1);
        assert_eq!(second.updated, 0);
        assert_eq!(second.inserted, 0);
        assert_eq!(local, after_first);
    }

    #[test]
    fn test_tombstone_for_unknown_domain_is_not_materialised() {
        let mut local = BTreeMap::new();
        let remote: RemoteCollection = [("gone.com".to_string(), tomb("2016-02-01T00:00:00"))].into();

        let report = merge(&mut local, &remote, &mut rng());

        assert!(local.is_empty());
        assert!(!report.needs_push);
    }

    #[test]
    fn test_local_only_entry_requests_push() {
        let mut local = BTreeMap::from([("mine.com".to_string(), entry("mine.com", "2016-01-01T00:00:00", "u"))]);
        let report = merge(&mut local, &RemoteCollection::new(), &mut rng());
        assert!(report.needs_push);
    }

    #[test]
    fn test_merge_twice_is_stable() {
        let mut local = BTreeMap::from([
            ("a.com".to_string(), entry("a.com", "2016-01-01T00:00:00", "old")),
            ("b.com".to_string(), entry("b.com", "2016-01-01T00:00:00", "b")),
        ]);
        let remote: RemoteCollection = [
            ("a.com".to_string(), live(&entry("a.com", "2016-06-01T00:00:00", "new"))),
            ("b.com".to_string(), tomb("2016-06-01T00:00:00")),
            ("c.com".to_string(), live(&entry("c.com", "2016-06-01T00:00:00", "c"))),
        ]
        .into();

        let first = merge(&mut local, &remote, &mut rng());
        let after_first = local.clone();
        let second = merge(&mut local, &remote, &mut rng());

        assert_eq!(local, after_first);
        assert!(!first.needs_push);
        assert!(!second.needs_push);
        assert_eq!(second.inserted + second.updated + second.removed, 0);
    }

    #[test]
    fn test_incomplete_record_at_same_time_keeps_local() {
        let e = entry("a.com", "2016-01-01T00:00:00", "u");
        let record = EntryRecord {
            m_date: Some("2016-01-01T00:00:00".into()),
            ..Default::default()
        };
        let decision = decide("a.com", Some(&e), &RemoteRecord::Live(record), &mut rng());
        assert_eq!(decision, Decision::KeepLocal);
    }
}
