//! Cross-reference (secondary index) maintenance and lookup.
//!
//! An entry for field F of record R holding value V is the empty node
//! `^G(xref(F), UPPER(V), R)`. Only the orchestrator writes entries; this
//! module exposes lookups, verification and repair publicly and keeps the
//! mutators crate-private.

use crate::dictionary::{EntityDefinition, FieldDefinition};
use crate::error::FileBotResult;
use crate::gateway::{is_ien, Gateway};
use crate::validation::UniquenessProbe;
use filebot_storage::{is_canonical_number, GlobalStore};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Record ids found under one indexed value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XrefMatches {
    /// Matching ids in ascending order.
    pub ids: Vec<String>,
    /// True if more ids exist beyond the limit.
    pub truncated: bool,
}

/// One `(value, record)` pair from a prefix search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XrefHit {
    /// The indexed (upper-cased) value.
    pub value: String,
    /// The record holding it.
    pub ien: String,
}

/// Results of a prefix search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefixMatches {
    /// Hits in index order.
    pub hits: Vec<XrefHit>,
    /// True if the limit cut the search short.
    pub truncated: bool,
}

/// A single index entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct XrefEntry {
    /// Cross-reference name.
    pub xref: String,
    /// Indexed value.
    pub value: String,
    /// Record id.
    pub ien: String,
}

/// Differences between the index and the records it describes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XrefReport {
    /// Entries implied by record values but absent from the index.
    pub missing: Vec<XrefEntry>,
    /// Entries in the index that no record value supports.
    pub stale: Vec<XrefEntry>,
}

impl XrefReport {
    /// Returns true if the index matches the records exactly.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty()
    }
}

/// The key a value is indexed under.
#[must_use]
pub fn index_key(internal: &str) -> String {
    internal.to_uppercase()
}

/// True if some canonical number starts with `prefix`.
fn could_begin_number(prefix: &str) -> bool {
    let digits = prefix.strip_prefix('-').unwrap_or(prefix);
    digits.chars().all(|c| c.is_ascii_digit() || c == '.') && digits.matches('.').count() <= 1
}

/// Cross-reference operations over one store.
#[derive(Debug)]
pub struct CrossReferenceIndex<'a, S> {
    gateway: &'a Gateway<S>,
    match_limit: usize,
}

impl<'a, S: GlobalStore> CrossReferenceIndex<'a, S> {
    /// Creates an index view returning at most `match_limit` ids per lookup.
    pub fn new(gateway: &'a Gateway<S>, match_limit: usize) -> Self {
        Self {
            gateway,
            match_limit: match_limit.max(1),
        }
    }

    /// Writes the entry for `(def, internal, ien)`. Empty values and
    /// unindexed fields are ignored.
    pub(crate) fn add(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        internal: &str,
        ien: &str,
    ) -> FileBotResult<()> {
        let Some(xref) = def.xref.as_deref() else {
            return Ok(());
        };
        if internal.is_empty() {
            return Ok(());
        }
        let key = index_key(internal);
        debug!(entity = %entity.name, field = %def.field, xref, ien, "adding index entry");
        self.gateway.set("", &entity.global, &[xref, &key, ien])
    }

    /// Removes the entry for `(def, internal, ien)`.
    pub(crate) fn remove(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        internal: &str,
        ien: &str,
    ) -> FileBotResult<()> {
        let Some(xref) = def.xref.as_deref() else {
            return Ok(());
        };
        if internal.is_empty() {
            return Ok(());
        }
        let key = index_key(internal);
        debug!(entity = %entity.name, field = %def.field, xref, ien, "removing index entry");
        self.gateway.kill(&entity.global, &[xref, &key, ien])
    }

    /// Returns the records indexed under `internal`, up to the match limit.
    pub fn find(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        internal: &str,
    ) -> FileBotResult<XrefMatches> {
        self.find_page(entity, def, internal, None, self.match_limit)
    }

    /// Returns up to `limit` records indexed under `internal` whose ids
    /// collate after `after`.
    pub fn find_page(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        internal: &str,
        after: Option<&str>,
        limit: usize,
    ) -> FileBotResult<XrefMatches> {
        let Some(xref) = def.xref.as_deref() else {
            return Ok(XrefMatches::default());
        };
        if internal.is_empty() {
            return Ok(XrefMatches::default());
        }
        let key = index_key(internal);
        if !self
            .gateway
            .data(&entity.global, &[xref, &key])?
            .has_descendants()
        {
            return Ok(XrefMatches::default());
        }
        let mut ids = self
            .gateway
            .children(&entity.global, &[xref, &key], after, limit.saturating_add(1))?;
        let truncated = ids.len() > limit;
        ids.truncate(limit);
        Ok(XrefMatches { ids, truncated })
    }

    /// Returns entries whose value starts with `prefix`, up to `limit` hits.
    ///
    /// A trailing `*` is accepted and ignored. An entry equal to the prefix
    /// itself is included.
    pub fn find_prefix(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        prefix: &str,
        limit: usize,
    ) -> FileBotResult<PrefixMatches> {
        let Some(xref) = def.xref.as_deref() else {
            return Ok(PrefixMatches::default());
        };
        let prefix = index_key(prefix.trim_end_matches('*'));
        let global = entity.global.as_str();
        let mut out = PrefixMatches::default();

        let collect = |value: &str, out: &mut PrefixMatches| -> FileBotResult<bool> {
            let room = limit.saturating_sub(out.hits.len());
            let ids = self.gateway.children(global, &[xref, value], None, room + 1)?;
            for ien in ids {
                if out.hits.len() >= limit {
                    out.truncated = true;
                    return Ok(false);
                }
                out.hits.push(XrefHit {
                    value: value.to_string(),
                    ien,
                });
            }
            Ok(true)
        };

        let mut resume = prefix.clone();
        if could_begin_number(&prefix) {
            // Numbers collate numerically ("-12" before "-1"), so the whole
            // numeric range is scanned.
            let mut last = None;
            self.gateway.walk(global, &[xref], "", |value| {
                if !is_canonical_number(value) {
                    return Ok(false);
                }
                last = Some(value.to_string());
                if value.starts_with(prefix.as_str()) {
                    return collect(value, &mut out);
                }
                Ok(true)
            })?;
            if out.truncated {
                return Ok(out);
            }
            if prefix.is_empty() || is_canonical_number(&prefix) {
                resume = last.unwrap_or_default();
            }
        }

        if !prefix.is_empty()
            && !is_canonical_number(&prefix)
            && self.gateway.data(global, &[xref, &prefix])?.has_descendants()
            && !collect(&prefix, &mut out)?
        {
            return Ok(out);
        }

        self.gateway.walk(global, &[xref], &resume, |value| {
            if value.starts_with(prefix.as_str()) {
                collect(value, &mut out)
            } else {
                // Strings collate bytewise; past the prefix nothing matches.
                Ok(value < prefix.as_str())
            }
        })?;
        Ok(out)
    }

    /// Re-adds the index entries implied by one record's current values.
    ///
    /// Returns the number of entries written. Entries for prior values are
    /// not removed; use [`CrossReferenceIndex::repair`] for that.
    pub fn rebuild(&self, entity: &EntityDefinition, ien: &str) -> FileBotResult<usize> {
        let mut written = 0;
        for def in entity.indexed_fields() {
            if let Some(value) = self.gateway.get(&entity.global, &[ien, &def.field])? {
                if !value.is_empty() {
                    self.add(entity, def, &value, ien)?;
                    written += 1;
                }
            }
        }
        debug!(entity = %entity.name, ien, written, "rebuilt index entries");
        Ok(written)
    }

    /// Compares every index of `entity` against its records.
    pub fn verify(&self, entity: &EntityDefinition) -> FileBotResult<XrefReport> {
        let iens = self.record_ids(entity)?;
        let mut report = XrefReport::default();

        for def in entity.indexed_fields() {
            let Some(xref) = def.xref.as_deref() else {
                continue;
            };
            let mut expected = BTreeSet::new();
            for ien in &iens {
                if let Some(value) = self.gateway.get(&entity.global, &[ien, &def.field])? {
                    if !value.is_empty() {
                        expected.insert((index_key(&value), ien.clone()));
                    }
                }
            }

            let mut actual = BTreeSet::new();
            let mut values = Vec::new();
            self.gateway.walk(&entity.global, &[xref], "", |value| {
                values.push(value.to_string());
                Ok(true)
            })?;
            for value in values {
                self.gateway.walk(&entity.global, &[xref, &value], "", |ien| {
                    actual.insert((value.clone(), ien.to_string()));
                    Ok(true)
                })?;
            }

            let entry = |(value, ien): &(String, String)| XrefEntry {
                xref: xref.to_string(),
                value: value.clone(),
                ien: ien.clone(),
            };
            report.missing.extend(expected.difference(&actual).map(entry));
            report.stale.extend(actual.difference(&expected).map(entry));
        }
        Ok(report)
    }

    /// Removes stale entries and adds missing ones. Returns what was fixed.
    pub fn repair(&self, entity: &EntityDefinition) -> FileBotResult<XrefReport> {
        let report = self.verify(entity)?;
        for entry in &report.stale {
            self.gateway
                .kill(&entity.global, &[&entry.xref, &entry.value, &entry.ien])?;
        }
        for entry in &report.missing {
            self.gateway
                .set("", &entity.global, &[&entry.xref, &entry.value, &entry.ien])?;
        }
        info!(
            entity = %entity.name,
            missing = report.missing.len(),
            stale = report.stale.len(),
            "repaired cross-references"
        );
        Ok(report)
    }

    /// Record ids at the top level of the entity's global.
    fn record_ids(&self, entity: &EntityDefinition) -> FileBotResult<Vec<String>> {
        let mut iens = Vec::new();
        self.gateway.walk(&entity.global, &[], "", |sub| {
            if is_ien(sub) {
                iens.push(sub.to_string());
                return Ok(true);
            }
            // Past the numeric range only index and header nodes remain.
            Ok(is_canonical_number(sub))
        })?;
        Ok(iens)
    }
}

impl<S: GlobalStore> UniquenessProbe for CrossReferenceIndex<'_, S> {
    fn owners(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        internal: &str,
    ) -> FileBotResult<Vec<String>> {
        // Two owners are enough to prove a conflict for any record.
        Ok(self.find_page(entity, def, internal, None, 2)?.ids)
    }
}
