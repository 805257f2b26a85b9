//! In-memory collection of domain entries and its encrypted forms.

use chrono::NaiveDateTime;
use keyward_core::types::RemoteRecord;
use keyward_core::{timestamp, DomainEntry, KeywardError, KeywardResult};
use keyward_crypto::{decrypt, derive_legacy_key, encrypt, generate_salt, MasterSecretManager};
use rand::{CryptoRng, RngCore};
use secrecy::SecretString;
use std::collections::BTreeMap;
use zeroize::Zeroize;

use crate::container::{
    decode_collection, encode_collection, ExportBlob, LocalContainer, RemoteCollection, SettingsDocument,
    SettingsPayload,
};
use crate::endpoint::SyncEndpoint;
use crate::reconcile::{merge, MergeReport};
use crate::transport::SyncTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote could not be reached; nothing changed.
    Skipped,
    /// Local and remote already agree.
    UpToDate,
    /// A fresh export was pushed and every entry is now synced.
    Pushed,
    /// The remote refused the push.
    PushRejected,
}

#[derive(Debug, Default)]
pub struct ConfigurationStore {
    entries: BTreeMap<String, DomainEntry>,
    /// Local deletions to announce as tombstones on the next export
    deleted: BTreeMap<String, NaiveDateTime>,
    endpoint: Option<SyncEndpoint>,
    /// Last remote collection seen by [`ConfigurationStore::import`]
    remote_snapshot: Option<RemoteCollection>,
}

impl ConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Entries ──────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DomainEntry> {
        self.entries.values()
    }

    pub fn get(&self, domain: &str) -> Option<&DomainEntry> {
        self.entries.get(domain)
    }

    pub fn get_mut(&mut self, domain: &str) -> Option<&mut DomainEntry> {
        self.entries.get_mut(domain)
    }

    /// Entry for `domain`, created with fresh defaults if there is none.
    pub fn get_or_create<R: RngCore + CryptoRng + ?Sized>(&mut self, domain: &str, rng: &mut R) -> &mut DomainEntry {
        self.deleted.remove(domain);
        self.entries.entry(domain.to_string()).or_insert_with(|| {
            tracing::debug!(%domain, "creating entry");
            DomainEntry::new(domain, rng)
        })
    }

    /// Insert or replace the entry for its domain.
    pub fn set(&mut self, entry: DomainEntry) {
        self.deleted.remove(entry.domain());
        self.entries.insert(entry.domain().to_string(), entry);
    }

    pub fn delete(&mut self, domain: &str) -> Option<DomainEntry> {
        let removed = self.entries.remove(domain)?;
        let at = timestamp::now().max(removed.modified());
        self.deleted.insert(domain.to_string(), at);
        tracing::debug!(%domain, "entry deleted");
        Some(removed)
    }

    /// Domains deleted locally and not yet acknowledged by a remote.
    pub fn pending_deletions(&self) -> impl Iterator<Item = &str> {
        self.deleted.keys().map(String::as_str)
    }

    pub fn set_all_synced(&mut self) {
        for entry in self.entries.values_mut() {
            entry.set_synced(true);
        }
    }

    pub fn endpoint(&self) -> Option<&SyncEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn set_endpoint(&mut self, endpoint: Option<SyncEndpoint>) {
        self.endpoint = endpoint;
    }

    pub fn remote_snapshot(&self) -> Option<&RemoteCollection> {
        self.remote_snapshot.as_ref()
    }

    // ── Local container ──────────────────────────────────────────────────────

    fn document(&self) -> SettingsDocument {
        SettingsDocument {
            settings: self
                .entries
                .iter()
                .map(|(domain, entry)| (domain.clone(), entry.to_record()))
                .collect(),
            synced: self
                .entries
                .values()
                .filter(|e| e.is_synced())
                .map(|e| e.domain().to_string())
                .collect(),
            deleted: self
                .deleted
                .iter()
                .map(|(domain, at)| (domain.clone(), timestamp::format(at)))
                .collect(),
        }
    }

    /// Build the local container: rotate the wrapped block, then encrypt the
    /// settings under the key derived from the new rotation values.
    pub fn serialize<R: RngCore + CryptoRng + ?Sized>(
        &self,
        manager: &mut MasterSecretManager,
        rng: &mut R,
    ) -> KeywardResult<Vec<u8>> {
        let block = manager.rotate_and_wrap(rng)?;
        let key = manager.settings_key()?;
        let iv = manager.rotation_iv()?;
        let vault_salt = manager.vault_salt().ok_or(KeywardError::Locked("vault salt"))?;

        let mut plain = SettingsPayload {
            endpoint: self.endpoint.clone(),
            document: self.document(),
        }
        .encode()?;
        let encrypted = encrypt(key.as_bytes(), iv, &plain);
        plain.zeroize();

        LocalContainer::assemble(vault_salt, &block, &encrypted?)
    }

    /// Unlock the master secret from `bytes` and load the settings it holds.
    /// An empty or short container starts a new vault with a fresh salt.
    pub fn open<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        bytes: &[u8],
        password: &SecretString,
        manager: &mut MasterSecretManager,
        rng: &mut R,
    ) -> KeywardResult<()> {
        match LocalContainer::split(bytes) {
            Some(container) => {
                manager.unwrap(container.wrapped_block, password, container.vault_salt, rng)?;
                self.deserialize(bytes, manager, rng)
            }
            None => {
                tracing::info!("no local vault, starting a new one");
                manager.unwrap(&[], password, &generate_salt(rng), rng)
            }
        }
    }

    /// Load the settings section of `bytes` with an already unlocked
    /// `manager`. Stored records only replace in-memory entries that are
    /// strictly older.
    pub fn deserialize<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        bytes: &[u8],
        manager: &MasterSecretManager,
        rng: &mut R,
    ) -> KeywardResult<()> {
        let Some(container) = LocalContainer::split(bytes) else {
            return Ok(());
        };
        if container.encrypted_settings.is_empty() {
            return Ok(());
        }
        let key = manager.settings_key()?;
        let mut plain = decrypt(key.as_bytes(), manager.rotation_iv()?, container.encrypted_settings)?;
        let payload = SettingsPayload::decode(&plain);
        plain.zeroize();
        let payload = payload?;

        if payload.endpoint.is_some() {
            self.endpoint = payload.endpoint;
        }
        let document = payload.document;
        for (domain, record) in &document.settings {
            let mut stored = DomainEntry::from_record(domain.as_str(), record, rng);
            if let Some(existing) = self.entries.get(domain) {
                if stored.modified() <= existing.modified() {
                    continue;
                }
            }
            stored.set_synced(document.synced.iter().any(|d| d == domain));
            self.entries.insert(domain.clone(), stored);
        }
        for (domain, at) in &document.deleted {
            if !self.entries.contains_key(domain) {
                self.deleted.insert(domain.clone(), timestamp::parse_or_now(at));
            }
        }
        tracing::debug!(entries = self.entries.len(), "settings loaded");
        Ok(())
    }

    // ── Export / import ──────────────────────────────────────────────────────

    /// Collection as announced to the remote: live entries plus tombstones for
    /// local deletions and for remote entries that no longer exist here.
    pub fn export_collection(&self) -> RemoteCollection {
        let mut collection: RemoteCollection = self
            .entries
            .iter()
            .map(|(domain, entry)| (domain.clone(), RemoteRecord::Live(entry.to_record())))
            .collect();
        for (domain, at) in &self.deleted {
            collection.insert(domain.clone(), RemoteRecord::tombstone(*at));
        }
        if let Some(snapshot) = &self.remote_snapshot {
            for (domain, record) in snapshot {
                if collection.contains_key(domain) {
                    continue;
                }
                let tombstone = match record {
                    RemoteRecord::Tombstone { .. } => record.clone(),
                    RemoteRecord::Live(_) => RemoteRecord::tombstone(timestamp::now()),
                };
                collection.insert(domain.clone(), tombstone);
            }
        }
        collection
    }

    /// Base64 export blob (current version) under freshly rotated wrapping.
    pub fn export<R: RngCore + CryptoRng + ?Sized>(
        &self,
        manager: &mut MasterSecretManager,
        rng: &mut R,
    ) -> KeywardResult<String> {
        let block = manager.rotate_and_wrap(rng)?;
        let key = manager.settings_key()?;
        let vault_salt = manager.vault_salt().ok_or(KeywardError::Locked("vault salt"))?;

        let mut packed = encode_collection(&self.export_collection())?;
        let ciphertext = encrypt(key.as_bytes(), manager.rotation_iv()?, &packed);
        packed.zeroize();

        ExportBlob::V1 {
            vault_salt: vault_salt.to_vec(),
            wrapped_block: block,
            ciphertext: ciphertext?,
        }
        .encode()
    }

    /// Decrypt a remote blob. Nothing local changes unless the blob decodes,
    /// belongs to this vault and decrypts; then a fresh local secret is
    /// replaced by the remote one and the blob becomes the remote snapshot.
    pub fn import(
        &mut self,
        blob: &str,
        password: &SecretString,
        manager: &mut MasterSecretManager,
    ) -> KeywardResult<RemoteCollection> {
        let collection = match ExportBlob::decode(blob)? {
            ExportBlob::V1 {
                vault_salt,
                wrapped_block,
                ciphertext,
            } => {
                let remote = manager.import_remote(password, &vault_salt, &wrapped_block)?;
                let key = remote.settings_key()?;
                let mut packed = decrypt(key.as_bytes(), remote.rotation_iv()?, &ciphertext)?;
                let collection = decode_collection(&packed);
                packed.zeroize();
                let collection = collection?;
                manager.adopt(&remote)?;
                collection
            }
            ExportBlob::V0 { salt, ciphertext } => {
                tracing::info!("importing legacy version 0 blob");
                let key = derive_legacy_key(password, &salt);
                let mut packed = decrypt(key.key(), key.iv(), &ciphertext)?;
                let collection = decode_collection(&packed);
                packed.zeroize();
                collection?
            }
        };
        self.remote_snapshot = Some(collection.clone());
        Ok(collection)
    }

    /// Merge a remote collection, honouring local deletions that are newer
    /// than the remote copy.
    pub fn merge_remote<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        remote: &RemoteCollection,
        rng: &mut R,
    ) -> MergeReport {
        let mut remote = remote.clone();
        let mut deletion_pending = false;
        for (domain, deleted_at) in self.deleted.clone() {
            let live_modified = remote
                .get(&domain)
                .filter(|record| !record.is_tombstone())
                .map(RemoteRecord::modified);
            match live_modified {
                Some(modified) if modified <= deleted_at => {
                    remote.remove(&domain);
                    deletion_pending = true;
                }
                Some(_) => {
                    tracing::debug!(%domain, "remote edit is newer than local deletion");
                    self.deleted.remove(&domain);
                }
                None => {
                    self.deleted.remove(&domain);
                }
            }
        }
        let mut report = merge(&mut self.entries, &remote, rng);
        report.needs_push |= deletion_pending;
        report
    }

    // ── Sync ─────────────────────────────────────────────────────────────────

    /// Pull, merge and push back if the remote is behind.
    ///
    /// A failed pull or push degrades to [`SyncOutcome::Skipped`]; a blob that
    /// cannot be imported (conflict, unknown version, wrong password) is an
    /// error. The caller persists the store afterwards.
    pub fn sync<T, R>(
        &mut self,
        transport: &T,
        manager: &mut MasterSecretManager,
        password: &SecretString,
        rng: &mut R,
    ) -> KeywardResult<SyncOutcome>
    where
        T: SyncTransport + ?Sized,
        R: RngCore + CryptoRng + ?Sized,
    {
        let needs_push = match transport.pull() {
            Err(e) => {
                tracing::warn!("sync skipped, pull failed: {e}");
                return Ok(SyncOutcome::Skipped);
            }
            Ok(None) => {
                tracing::info!("remote is empty");
                !self.entries.is_empty() || !self.deleted.is_empty()
            }
            Ok(Some(blob)) => {
                let remote = self.import(&blob, password, manager)?;
                self.merge_remote(&remote, rng).needs_push
            }
        };

        if !needs_push {
            return Ok(SyncOutcome::UpToDate);
        }

        let pushed = self.export_collection();
        let blob = self.export(manager, rng)?;
        match transport.push(&blob) {
            Ok(true) => {
                self.set_all_synced();
                self.deleted.clear();
                self.remote_snapshot = Some(pushed);
                tracing::info!(entries = self.entries.len(), "pushed settings to remote");
                Ok(SyncOutcome::Pushed)
            }
            Ok(false) => {
                tracing::warn!("remote rejected push");
                Ok(SyncOutcome::PushRejected)
            }
            Err(e) => {
                tracing::warn!("sync skipped, push failed: {e}");
                Ok(SyncOutcome::Skipped)
            }
        }
    }
}
