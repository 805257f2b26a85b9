//! Per-domain configuration record.
//!
//! Editable fields live in [`EntrySettings`] and are only changed through
//! [`DomainEntry::edit`], which owns the dirty-bit: any effective change
//! clears `synced` and bumps the modification time.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDateTime;
use rand::{CryptoRng, RngCore};
use std::fmt;

use crate::template::{ClassSelection, Template, DEFAULT_EXTRA, DEFAULT_LENGTH};
use crate::timestamp;
use crate::types::EntryRecord;

pub const DEFAULT_ITERATIONS: i64 = 4096;
pub const ENTRY_SALT_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub legacy_password: Option<String>,
    pub notes: Option<String>,
    pub iterations: i64,
    pub salt: Vec<u8>,
    pub extra_characters: String,
    pub template: Template,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DomainEntry {
    domain: String,
    settings: EntrySettings,
    created: NaiveDateTime,
    modified: NaiveDateTime,
    synced: bool,
}

impl DomainEntry {
    /// Fresh entry: random salt, default iterations, and a shuffled
    /// 10-position template using all four classes.
    pub fn new<R: RngCore + CryptoRng + ?Sized>(domain: impl Into<String>, rng: &mut R) -> Self {
        let mut salt = vec![0u8; ENTRY_SALT_SIZE];
        rng.fill_bytes(&mut salt);
        let now = timestamp::now();
        Self {
            domain: domain.into(),
            settings: EntrySettings {
                url: None,
                username: None,
                legacy_password: None,
                notes: None,
                iterations: DEFAULT_ITERATIONS,
                salt,
                extra_characters: DEFAULT_EXTRA.to_string(),
                template: Template::calculate(DEFAULT_LENGTH, ClassSelection::ALL, rng),
            },
            created: now,
            modified: now,
            synced: false,
        }
    }

    /// Build an entry from a stored record. Missing fields keep the defaults
    /// of [`DomainEntry::new`], except the salt: a record without one was
    /// written before per-entry salts and derives with the pepper.
    pub fn from_record<R: RngCore + CryptoRng + ?Sized>(
        domain: impl Into<String>,
        record: &EntryRecord,
        rng: &mut R,
    ) -> Self {
        let mut entry = Self::new(domain, rng);
        entry.settings.salt.clear();
        entry.apply_record(record, rng);
        entry
    }

    /// Overwrite fields present in `record`. Bypasses [`DomainEntry::edit`]:
    /// dates come from the record, and the caller decides the synced state.
    pub fn apply_record<R: RngCore + CryptoRng + ?Sized>(&mut self, record: &EntryRecord, rng: &mut R) {
        let s = &mut self.settings;
        if let Some(url) = &record.url {
            s.url = Some(url.clone());
        }
        if let Some(username) = &record.username {
            s.username = Some(username.clone());
        }
        if let Some(legacy) = &record.legacy_password {
            s.legacy_password = Some(legacy.clone());
        }
        if let Some(notes) = &record.notes {
            s.notes = Some(notes.clone());
        }
        if let Some(iterations) = record.iterations {
            s.iterations = iterations;
        }
        if let Some(salt) = &record.salt {
            match STANDARD.decode(salt) {
                Ok(bytes) => s.salt = bytes,
                Err(e) => tracing::warn!(domain = %self.domain, "ignoring undecodable salt: {e}"),
            }
        }
        if let Some(extras) = &record.extras {
            s.extra_characters = non_empty_extra(extras);
        }
        match (&record.password_template, record.length, &record.used_characters) {
            (Some(full), _, _) => match Template::parse_full(full) {
                Ok(template) => s.template = template,
                Err(e) => tracing::warn!(domain = %self.domain, "ignoring template: {e}"),
            },
            (None, Some(length), Some(used)) => {
                s.extra_characters = non_empty_extra(used);
                s.template = Template::calculate(
                    length,
                    ClassSelection {
                        extra: true,
                        ..Default::default()
                    },
                    rng,
                );
            }
            _ => {}
        }
        if let Some(c_date) = &record.c_date {
            self.set_creation_date(timestamp::parse_or_now(c_date));
        }
        if let Some(m_date) = &record.m_date {
            self.set_modification_date(timestamp::parse_or_now(m_date));
        }
    }

    pub fn to_record(&self) -> EntryRecord {
        let s = &self.settings;
        EntryRecord {
            domain: Some(self.domain.clone()),
            url: s.url.clone().filter(|v| !v.is_empty()),
            username: s.username.clone().filter(|v| !v.is_empty()),
            legacy_password: s.legacy_password.clone().filter(|v| !v.is_empty()),
            notes: s.notes.clone().filter(|v| !v.is_empty()),
            iterations: Some(s.iterations),
            // Written even when empty: an empty salt selects the pepper.
            salt: Some(STANDARD.encode(&s.salt)),
            c_date: Some(timestamp::format(&self.created)),
            m_date: Some(timestamp::format(&self.modified)),
            extras: Some(s.extra_characters.clone()),
            password_template: Some(s.template.to_string()),
            ..Default::default()
        }
    }

    /// Apply `f` to the editable settings. Returns whether anything changed;
    /// a change clears `synced` and stamps the modification time.
    pub fn edit<F: FnOnce(&mut EntrySettings)>(&mut self, f: F) -> bool {
        let before = self.settings.clone();
        f(&mut self.settings);
        if self.settings.extra_characters.is_empty() {
            self.settings.extra_characters = DEFAULT_EXTRA.to_string();
        }
        let changed = self.settings != before;
        if changed {
            self.synced = false;
            self.modified = timestamp::now().max(self.created);
        }
        changed
    }

    /// Recompute the template for the current length and the given classes.
    pub fn recalculate_template<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        selection: ClassSelection,
        rng: &mut R,
    ) -> bool {
        let template = Template::calculate(self.settings.template.len(), selection, rng);
        self.edit(|s| s.template = template)
    }

    /// Set the creation date; the modification date is pulled forward so it
    /// never precedes creation.
    pub fn set_creation_date(&mut self, created: NaiveDateTime) {
        if self.created != created {
            self.synced = false;
        }
        self.created = created;
        if self.modified < self.created {
            self.modified = self.created;
        }
    }

    /// Set the modification date; a date before creation moves creation back.
    pub fn set_modification_date(&mut self, modified: NaiveDateTime) {
        if self.modified != modified {
            self.synced = false;
        }
        self.modified = modified;
        if self.modified < self.created {
            tracing::debug!(domain = %self.domain, "modification date precedes creation, adjusting creation date");
            self.created = self.modified;
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn settings(&self) -> &EntrySettings {
        &self.settings
    }

    pub fn username(&self) -> &str {
        self.settings.username.as_deref().unwrap_or("")
    }

    pub fn template(&self) -> &Template {
        &self.settings.template
    }

    pub fn extra_characters(&self) -> &str {
        &self.settings.extra_characters
    }

    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    pub fn modified(&self) -> NaiveDateTime {
        self.modified
    }

    pub fn complexity(&self) -> i8 {
        self.settings.template.complexity()
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }
}

fn non_empty_extra(extra: &str) -> String {
    if extra.is_empty() {
        DEFAULT_EXTRA.to_string()
    } else {
        extra.to_string()
    }
}

impl fmt::Debug for DomainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainEntry")
            .field("domain", &self.domain)
            .field("username", &self.settings.username)
            .field(
                "legacy_password",
                &self.settings.legacy_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("iterations", &self.settings.iterations)
            .field("template", &self.settings.template.to_string())
            .field("created", &timestamp::format(&self.created))
            .field("modified", &timestamp::format(&self.modified))
            .field("synced", &self.synced)
            .finish()
    }
}
