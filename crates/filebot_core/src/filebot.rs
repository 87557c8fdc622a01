//! The safe CRUD orchestrator.

use crate::config::FileBotConfig;
use crate::dictionary::{canonical_field_id, Dictionary, EntityDefinition, FieldValues, NAME_FIELD};
use crate::error::{ErrorCode, FieldError, FileBotError, FileBotResult};
use crate::gateway::{is_ien, Gateway};
use crate::stats::{OperationStats, StatsSnapshot};
use crate::transform::Transformer;
use crate::validation::{ValidationResult, Validator};
use crate::xref::{index_key, CrossReferenceIndex, PrefixMatches, XrefMatches, XrefReport};
use filebot_storage::{is_canonical_number, Capabilities, ConnectionResult, GlobalStore, Support};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Subscript of the file header node.
pub const HEADER_SUBSCRIPT: &str = "0";

/// Which representation of field values a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldFormat {
    /// Stored values (`"I"`).
    #[default]
    Internal,
    /// Display values (`"E"`).
    External,
    /// Both (`"IE"`).
    Both,
}

impl FieldFormat {
    fn internal(self) -> bool {
        matches!(self, Self::Internal | Self::Both)
    }

    fn external(self) -> bool {
        matches!(self, Self::External | Self::Both)
    }
}

impl FromStr for FieldFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "I" | "INTERNAL" => Ok(Self::Internal),
            "E" | "EXTERNAL" => Ok(Self::External),
            "IE" | "EI" | "BOTH" => Ok(Self::Both),
            other => Err(format!("unknown field format {other:?}")),
        }
    }
}

/// One field of a [`RecordView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    /// Field number.
    pub field: String,
    /// Display name from the dictionary.
    pub name: String,
    /// Stored value, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<String>,
    /// Display value, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<String>,
}

/// A record as returned by reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    /// Entity name.
    pub entity: String,
    /// Record id.
    pub ien: String,
    /// Fields in field-number order.
    pub fields: Vec<FieldView>,
}

impl RecordView {
    /// Returns a field by number.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&FieldView> {
        let id = canonical_field_id(field);
        self.fields.iter().find(|f| f.field == id)
    }

    /// Returns a field's stored value, if read.
    #[must_use]
    pub fn internal(&self, field: &str) -> Option<&str> {
        self.field(field)?.internal.as_deref()
    }

    /// Returns a field's display value, if read.
    #[must_use]
    pub fn external(&self, field: &str) -> Option<&str> {
        self.field(field)?.external.as_deref()
    }
}

/// One row of [`FileBot::list_entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    /// Record id.
    pub ien: String,
    /// The `.01` value, if set.
    pub name: Option<String>,
}

/// How a record lock was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    /// The backend granted the lock.
    Acquired,
    /// The backend has no locking; nothing is held.
    Unsupported,
}

/// A lock released when dropped.
///
/// Backend locks belong to the acquiring thread, so the guard cannot move
/// to another one:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<filebot_core::RecordLock<'static, filebot_storage::InMemoryStore>>();
/// ```
#[must_use = "the lock is released when the guard is dropped"]
pub struct RecordLock<'a, S: GlobalStore> {
    gateway: &'a Gateway<S>,
    global: String,
    subscripts: Vec<String>,
    status: LockStatus,
    held: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl<S: GlobalStore> RecordLock<'_, S> {
    /// How the lock was obtained.
    pub fn status(&self) -> LockStatus {
        self.status
    }

    /// Releases the lock now, reporting any failure.
    pub fn release(mut self) -> FileBotResult<()> {
        self.unlock()
    }

    /// Disarms the guard, leaving the lock held until
    /// [`FileBot::unlock_record`] is called.
    pub fn keep(mut self) -> LockStatus {
        self.held = false;
        self.status
    }

    fn unlock(&mut self) -> FileBotResult<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        let subs: Vec<&str> = self.subscripts.iter().map(String::as_str).collect();
        if let Support::Native(false) = self.gateway.unlock(&self.global, &subs)? {
            warn!(global = %self.global, "lock was not held at release");
        }
        Ok(())
    }
}

impl<S: GlobalStore> Drop for RecordLock<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            warn!(global = %self.global, error = %e, "failed to release lock");
        }
    }
}

impl<S: GlobalStore> fmt::Debug for RecordLock<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLock")
            .field("global", &self.global)
            .field("subscripts", &self.subscripts)
            .field("status", &self.status)
            .field("held", &self.held)
            .finish()
    }
}

/// The `^G(0)` header: `NAME^FILE#^LAST-IEN^COUNT`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
    name: String,
    file: String,
    last: u64,
    count: u64,
}

impl FileHeader {
    fn parse(raw: Option<&str>, entity: &EntityDefinition) -> Self {
        let mut pieces = raw.unwrap_or("").split('^');
        let mut text = |fallback: &str| {
            pieces
                .next()
                .filter(|p| !p.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        let name = text(&entity.name);
        let file = text(&entity.file_number);
        let last = text("0").parse().unwrap_or(0);
        let count = text("0").parse().unwrap_or(0);
        Self {
            name,
            file,
            last,
            count,
        }
    }

    fn render(&self) -> String {
        format!("{}^{}^{}^{}", self.name, self.file, self.last, self.count)
    }
}

/// Validated, index-consistent access to FileMan-style records.
///
/// Every write validates first and touches storage only when validation
/// passes. For each indexed field whose value changes, the old index entry
/// is removed before the value is written and the new entry is added after.
///
/// # Example
///
/// ```
/// use filebot_core::{FileBot, FieldFormat};
/// use filebot_storage::InMemoryStore;
///
/// let bot = FileBot::new(InMemoryStore::new())?;
/// let ien = bot.create("PATIENT", &[(".01", "John Smith"), (".03", "1/1/1985")])?;
///
/// let record = bot.get_record("PATIENT", &ien, FieldFormat::Both)?.unwrap();
/// assert_eq!(record.internal(".01"), Some("SMITH,JOHN"));
/// assert_eq!(record.external(".03"), Some("01/01/1985"));
/// # Ok::<(), filebot_core::FileBotError>(())
/// ```
///
/// # Known gap
///
/// Without `transactional_writes` on a transactional backend, a failure
/// between a value write and its index write leaves the index stale until
/// [`FileBot::rebuild_xrefs`] or [`FileBot::repair_xrefs`] runs.
pub struct FileBot<S> {
    gateway: Gateway<S>,
    dictionary: Dictionary,
    config: FileBotConfig,
    transformer: Transformer,
    validator: Validator,
    stats: OperationStats,
}

impl<S: GlobalStore> FileBot<S> {
    /// Creates an orchestrator over `store` with the standard dictionary.
    pub fn new(store: S) -> FileBotResult<Self> {
        Self::with_config(store, FileBotConfig::default())
    }

    /// Creates an orchestrator with the standard dictionary and `config`.
    pub fn with_config(store: S, config: FileBotConfig) -> FileBotResult<Self> {
        Ok(Self::with_dictionary(store, Dictionary::standard()?, config))
    }

    /// Creates an orchestrator with a caller-built dictionary.
    pub fn with_dictionary(store: S, dictionary: Dictionary, config: FileBotConfig) -> Self {
        Self {
            gateway: Gateway::new(store, config.retry.clone(), config.traversal_cap),
            transformer: Transformer::new(config.year_pivot),
            validator: Validator::new(),
            stats: OperationStats::new(),
            dictionary,
            config,
        }
    }

    // === Writes ===

    /// Creates a record and returns its id.
    ///
    /// `fields` are `(field number, external value)` pairs. Empty values
    /// are not stored.
    ///
    /// # Errors
    ///
    /// - [`FileBotError::Validation`] with every failure; nothing is written
    /// - [`FileBotError::LockTimeout`] if the header lock is busy
    /// - connection and backend errors after retries
    pub fn create(&self, entity: &str, fields: &[(&str, &str)]) -> FileBotResult<String> {
        let result = self.create_record(entity, fields);
        if result.is_ok() {
            self.stats.record_create();
        }
        self.track(result)
    }

    fn create_record(&self, entity_id: &str, fields: &[(&str, &str)]) -> FileBotResult<String> {
        let entity = self.entity(entity_id)?;
        let supplied = self.internal_values(&entity, fields, None)?;
        if supplied.values().all(String::is_empty) {
            return Err(FileBotError::validation(
                &entity.name,
                None,
                vec![FieldError::new(NAME_FIELD, ErrorCode::REQUIRED, "record has no values")],
            ));
        }

        let header_lock = self.acquire(&entity, &[HEADER_SUBSCRIPT])?;
        let index = self.index();
        self.validator
            .validate_record(&entity, &supplied, None, None, Some(&index))?
            .into_result(&entity.name, None)?;

        let (ien, number) = self.next_ien(&entity)?;
        self.write_scope(&entity, "create", || {
            for (field, value) in supplied.iter().filter(|(_, v)| !v.is_empty()) {
                self.gateway.set(value, &entity.global, &[&ien, field.as_str()])?;
                index.add(&entity, &entity.definition_for(field), value, &ien)?;
            }
            let mut header = self.read_header(&entity)?;
            header.last = header.last.max(number);
            header.count = header.count.saturating_add(1);
            self.gateway
                .set(&header.render(), &entity.global, &[HEADER_SUBSCRIPT])
        })?;
        drop(header_lock);

        info!(entity = %entity.name, ien = %ien, fields = supplied.len(), "record created");
        Ok(ien)
    }

    /// Updates fields of an existing record. An empty value clears the
    /// field. Returns the number of fields that changed.
    ///
    /// # Errors
    ///
    /// - [`FileBotError::InvalidId`] if `ien` is not a positive integer
    /// - [`FileBotError::NotFound`] if the record does not exist
    /// - [`FileBotError::Validation`] with every failure; nothing is written
    /// - [`FileBotError::LockTimeout`] if the record lock is busy
    pub fn update(&self, entity: &str, ien: &str, fields: &[(&str, &str)]) -> FileBotResult<usize> {
        let result = self.update_record(entity, ien, fields);
        if result.is_ok() {
            self.stats.record_update();
        }
        self.track(result)
    }

    fn update_record(
        &self,
        entity_id: &str,
        ien: &str,
        fields: &[(&str, &str)],
    ) -> FileBotResult<usize> {
        let entity = self.entity(entity_id)?;
        check_ien(&entity, ien)?;
        let supplied = self.internal_values(&entity, fields, Some(ien))?;

        let _lock = self.acquire(&entity, &[ien])?;
        let existing = self
            .read_values(&entity, ien)?
            .ok_or_else(|| FileBotError::not_found(&entity.name, ien))?;
        // Uniqueness is checked and written under the lock creates hold.
        let claims_unique = supplied
            .iter()
            .any(|(field, value)| !value.is_empty() && entity.definition_for(field).unique);
        let _header_lock = if claims_unique {
            Some(self.acquire(&entity, &[HEADER_SUBSCRIPT])?)
        } else {
            None
        };
        let index = self.index();
        self.validator
            .validate_record(&entity, &supplied, Some(&existing), Some(ien), Some(&index))?
            .into_result(&entity.name, Some(ien))?;

        let changed: Vec<(&String, &String)> = supplied
            .iter()
            .filter(|(field, value)| match existing.get(*field) {
                Some(old) => old != *value,
                None => !value.is_empty(),
            })
            .collect();
        if changed.is_empty() {
            debug!(entity = %entity.name, ien, "update changed nothing");
            return Ok(0);
        }

        self.write_scope(&entity, "update", || {
            for (field, value) in &changed {
                let def = entity.definition_for(field);
                if let Some(old) = existing.get(*field) {
                    index.remove(&entity, &def, old, ien)?;
                }
                if value.is_empty() {
                    self.gateway.kill(&entity.global, &[ien, field.as_str()])?;
                } else {
                    self.gateway.set(value, &entity.global, &[ien, field.as_str()])?;
                    index.add(&entity, &def, value, ien)?;
                }
            }
            Ok(())
        })?;

        info!(entity = %entity.name, ien, changed = changed.len(), "record updated");
        Ok(changed.len())
    }

    /// Deletes a record and every index entry pointing at it.
    ///
    /// # Errors
    ///
    /// - [`FileBotError::InvalidId`] if `ien` is not a positive integer
    /// - [`FileBotError::NotFound`] if the record does not exist
    /// - [`FileBotError::LockTimeout`] if a lock is busy
    pub fn delete(&self, entity: &str, ien: &str) -> FileBotResult<()> {
        let result = self.delete_record(entity, ien);
        if result.is_ok() {
            self.stats.record_delete();
        }
        self.track(result)
    }

    fn delete_record(&self, entity_id: &str, ien: &str) -> FileBotResult<()> {
        let entity = self.entity(entity_id)?;
        check_ien(&entity, ien)?;

        let _lock = self.acquire(&entity, &[ien])?;
        let existing = self
            .read_values(&entity, ien)?
            .ok_or_else(|| FileBotError::not_found(&entity.name, ien))?;
        let _header_lock = self.acquire(&entity, &[HEADER_SUBSCRIPT])?;
        let index = self.index();

        self.write_scope(&entity, "delete", || {
            for def in entity.indexed_fields() {
                if let Some(value) = existing.get(&def.field) {
                    index.remove(&entity, def, value, ien)?;
                }
            }
            self.gateway.kill(&entity.global, &[ien])?;
            let mut header = self.read_header(&entity)?;
            header.count = header.count.saturating_sub(1);
            self.gateway
                .set(&header.render(), &entity.global, &[HEADER_SUBSCRIPT])
        })?;

        info!(entity = %entity.name, ien, "record deleted");
        Ok(())
    }

    // === Reads ===

    /// Reads a record. Returns `None` if it does not exist.
    pub fn get_record(
        &self,
        entity: &str,
        ien: &str,
        format: FieldFormat,
    ) -> FileBotResult<Option<RecordView>> {
        let entity = self.entity(entity)?;
        check_ien(&entity, ien)?;
        self.stats.record_read();
        let values = self.track(self.read_ordered(&entity, ien))?;
        Ok(values.map(|values| self.view(&entity, ien, values, format)))
    }

    /// Reads several records, skipping those that do not exist.
    pub fn get_records_batch(
        &self,
        entity: &str,
        iens: &[&str],
        format: FieldFormat,
    ) -> FileBotResult<Vec<RecordView>> {
        let mut out = Vec::with_capacity(iens.len());
        for ien in iens {
            if let Some(view) = self.get_record(entity, ien, format)? {
                out.push(view);
            }
        }
        Ok(out)
    }

    /// Reads one stored field value.
    pub fn get_field(&self, entity: &str, ien: &str, field: &str) -> FileBotResult<Option<String>> {
        let entity = self.entity(entity)?;
        check_ien(&entity, ien)?;
        self.stats.record_read();
        let field = canonical_field_id(field);
        self.track(self.gateway.get(&entity.global, &[ien, &field]))
    }

    /// Reads one field value in display form.
    pub fn get_field_external(
        &self,
        entity_id: &str,
        ien: &str,
        field: &str,
    ) -> FileBotResult<Option<String>> {
        let Some(internal) = self.get_field(entity_id, ien, field)? else {
            return Ok(None);
        };
        let entity = self.entity(entity_id)?;
        let def = entity.definition_for(field);
        Ok(Some(self.transformer.to_external(&def, &internal)))
    }

    /// Lists up to `limit` records after `start_after`, in id order, with
    /// their `.01` values.
    pub fn list_entries(
        &self,
        entity: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> FileBotResult<Vec<ListEntry>> {
        let entity = self.entity(entity)?;
        let mut iens = Vec::new();
        self.track(self.gateway.walk(&entity.global, &[], start_after.unwrap_or(""), |sub| {
            if iens.len() >= limit {
                return Ok(false);
            }
            if is_ien(sub) {
                iens.push(sub.to_string());
                return Ok(true);
            }
            Ok(is_canonical_number(sub))
        }))?;

        let mut out = Vec::with_capacity(iens.len());
        for ien in iens {
            let name = self.gateway.get(&entity.global, &[&ien, NAME_FIELD])?;
            out.push(ListEntry { ien, name });
        }
        Ok(out)
    }

    /// Finds records whose `field` equals `value` (case-insensitive).
    ///
    /// `value` is converted to internal form first. Indexed fields use the
    /// cross-reference; other fields are found by scanning every record.
    pub fn find_entries(
        &self,
        entity: &str,
        field: &str,
        value: &str,
        limit: usize,
    ) -> FileBotResult<XrefMatches> {
        let entity = self.entity(entity)?;
        let def = entity.definition_for(field);
        let internal = self.transformer.to_internal(&def, value);
        if internal.is_empty() {
            return Ok(XrefMatches::default());
        }
        if def.is_indexed() {
            self.stats.record_index_lookup();
            return self.track(self.index().find_page(&entity, &def, &internal, None, limit));
        }

        self.stats.record_scan();
        debug!(entity = %entity.name, field = %def.field, "scanning records for unindexed field");
        let key = index_key(&internal);
        let mut matches = XrefMatches::default();
        self.track(self.gateway.walk(&entity.global, &[], "", |sub| {
            if !is_ien(sub) {
                return Ok(is_canonical_number(sub));
            }
            let stored = self.gateway.get(&entity.global, &[sub, &def.field])?;
            if stored.is_some_and(|v| index_key(&v) == key) {
                if matches.ids.len() >= limit {
                    matches.truncated = true;
                    return Ok(false);
                }
                matches.ids.push(sub.to_string());
            }
            Ok(true)
        }))?;
        Ok(matches)
    }

    /// Finds index entries starting with `prefix`, up to `limit` hits or the
    /// configured prefix search limit. `"SMITH*"` and `"SMITH"` are
    /// equivalent.
    ///
    /// # Errors
    ///
    /// [`FileBotError::Unsupported`] if `field` is not indexed.
    pub fn search_prefix(
        &self,
        entity: &str,
        field: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> FileBotResult<PrefixMatches> {
        let entity = self.entity(entity)?;
        let def = entity.definition_for(field);
        if !def.is_indexed() {
            return Err(FileBotError::Unsupported {
                capability: format!("prefix search on unindexed field {}", def.field),
            });
        }
        self.stats.record_index_lookup();
        let limit = limit.unwrap_or(self.config.prefix_search_limit);
        self.track(self.index().find_prefix(&entity, &def, prefix, limit))
    }

    // === Locks ===

    /// Locks a record until the returned guard drops.
    ///
    /// On a backend without locking the guard holds nothing and reports
    /// [`LockStatus::Unsupported`].
    pub fn lock_record(&self, entity: &str, ien: &str) -> FileBotResult<RecordLock<'_, S>> {
        let entity = self.entity(entity)?;
        check_ien(&entity, ien)?;
        self.acquire(&entity, &[ien])
    }

    /// Releases one level of a record lock kept with [`RecordLock::keep`].
    pub fn unlock_record(&self, entity: &str, ien: &str) -> FileBotResult<LockStatus> {
        let entity = self.entity(entity)?;
        check_ien(&entity, ien)?;
        Ok(match self.gateway.unlock(&entity.global, &[ien])? {
            Support::Native(_) => LockStatus::Acquired,
            Support::Unsupported => LockStatus::Unsupported,
        })
    }

    // === Validation and transforms ===

    /// Validates one external value without writing it.
    pub fn validate_field(
        &self,
        entity: &str,
        field: &str,
        external: &str,
        ien: Option<&str>,
    ) -> FileBotResult<ValidationResult> {
        let entity = self.entity(entity)?;
        let def = entity.definition_for(field);
        let internal = self.transformer.to_internal(&def, external);
        let index = self.index();
        self.validator
            .validate_field(&entity, &def, &internal, ien, Some(&index))
    }

    /// Validates a set of external values as a create (`ien` of `None`)
    /// or as an update of the stored record.
    pub fn validate_record(
        &self,
        entity: &str,
        fields: &[(&str, &str)],
        ien: Option<&str>,
    ) -> FileBotResult<ValidationResult> {
        let entity = self.entity(entity)?;
        let supplied = match self.internal_values(&entity, fields, ien) {
            Ok(values) => values,
            Err(FileBotError::Validation { errors, .. }) => {
                return Ok(ValidationResult { errors });
            }
            Err(e) => return Err(e),
        };
        let existing = match ien {
            Some(ien) => {
                check_ien(&entity, ien)?;
                Some(
                    self.read_values(&entity, ien)?
                        .ok_or_else(|| FileBotError::not_found(&entity.name, ien))?,
                )
            }
            None => None,
        };
        let index = self.index();
        self.validator
            .validate_record(&entity, &supplied, existing.as_ref(), ien, Some(&index))
    }

    /// Converts an external value to its stored form.
    #[must_use]
    pub fn to_internal(&self, entity: &str, field: &str, external: &str) -> String {
        let def = self.dictionary.definition_for(entity, field);
        self.transformer.to_internal(&def, external)
    }

    /// Converts a stored value to its display form.
    #[must_use]
    pub fn to_external(&self, entity: &str, field: &str, internal: &str) -> String {
        let def = self.dictionary.definition_for(entity, field);
        self.transformer.to_external(&def, internal)
    }

    // === Index maintenance ===

    /// Re-adds the index entries for one record. Returns entries written.
    pub fn rebuild_xrefs(&self, entity: &str, ien: &str) -> FileBotResult<usize> {
        let entity = self.entity(entity)?;
        check_ien(&entity, ien)?;
        self.track(self.index().rebuild(&entity, ien))
    }

    /// Compares every index of an entity against its records.
    pub fn verify_xrefs(&self, entity: &str) -> FileBotResult<XrefReport> {
        let entity = self.entity(entity)?;
        self.track(self.index().verify(&entity))
    }

    /// Removes stale index entries and adds missing ones.
    pub fn repair_xrefs(&self, entity: &str) -> FileBotResult<XrefReport> {
        let entity = self.entity(entity)?;
        let _header_lock = self.acquire(&entity, &[HEADER_SUBSCRIPT])?;
        self.track(self.index().repair(&entity))
    }

    // === Accessors ===

    /// Round-trips a scratch value through the backend.
    pub fn test_connection(&self) -> ConnectionResult {
        self.gateway.test_connection()
    }

    /// Backend capabilities.
    pub fn capabilities(&self) -> Capabilities {
        self.gateway.capabilities()
    }

    /// A snapshot of the operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The field dictionary.
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// The configuration.
    pub fn config(&self) -> &FileBotConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.gateway.store()
    }

    /// Consumes the orchestrator, returning the store.
    pub fn into_store(self) -> S {
        self.gateway.into_store()
    }

    /// Closes the underlying store.
    pub fn close(&self) -> FileBotResult<()> {
        Ok(self.gateway.store().close()?)
    }

    // === Internals ===

    fn entity(&self, id: &str) -> FileBotResult<Cow<'_, EntityDefinition>> {
        self.dictionary
            .resolve(id)
            .ok_or_else(|| FileBotError::UnknownEntity(id.to_string()))
    }

    fn index(&self) -> CrossReferenceIndex<'_, S> {
        CrossReferenceIndex::new(&self.gateway, self.config.xref_match_limit)
    }

    fn track<T>(&self, result: FileBotResult<T>) -> FileBotResult<T> {
        match &result {
            Err(FileBotError::Validation { .. }) => self.stats.record_validation_failure(),
            Err(_) => self.stats.record_error(),
            Ok(_) => {}
        }
        result
    }

    /// Converts `(field, external)` pairs to canonical ids and internal values.
    fn internal_values(
        &self,
        entity: &EntityDefinition,
        fields: &[(&str, &str)],
        ien: Option<&str>,
    ) -> FileBotResult<FieldValues> {
        let mut values = FieldValues::new();
        let mut errors = Vec::new();
        for (field, external) in fields {
            let id = canonical_field_id(field);
            if id.is_empty() || id == HEADER_SUBSCRIPT {
                errors.push(FieldError::new(
                    id,
                    ErrorCode::INVALID_TYPE,
                    format!("{field:?} is not a field number"),
                ));
                continue;
            }
            let def = entity.definition_for(&id);
            values.insert(id, self.transformer.to_internal(&def, external));
        }
        if errors.is_empty() {
            Ok(values)
        } else {
            Err(FileBotError::validation(
                &entity.name,
                ien.map(str::to_string),
                errors,
            ))
        }
    }

    fn acquire(
        &self,
        entity: &EntityDefinition,
        subscripts: &[&str],
    ) -> FileBotResult<RecordLock<'_, S>> {
        let timeout = self.config.lock_timeout;
        let status = match self.gateway.lock(&entity.global, subscripts, timeout)? {
            Support::Native(true) => LockStatus::Acquired,
            Support::Native(false) => {
                return Err(FileBotError::LockTimeout {
                    entity: entity.name.clone(),
                    ien: subscripts.join(","),
                    timeout,
                });
            }
            Support::Unsupported => {
                debug!(entity = %entity.name, "backend has no locking, continuing unlocked");
                LockStatus::Unsupported
            }
        };
        Ok(RecordLock {
            gateway: &self.gateway,
            global: entity.global.clone(),
            subscripts: subscripts.iter().map(|s| s.to_string()).collect(),
            status,
            held: status == LockStatus::Acquired,
            _thread_bound: PhantomData,
        })
    }

    /// Runs `write` inside a backend transaction when configured and
    /// available, rolling back if it fails.
    fn write_scope<T>(
        &self,
        entity: &EntityDefinition,
        operation: &str,
        write: impl FnOnce() -> FileBotResult<T>,
    ) -> FileBotResult<T> {
        if !self.config.transactional_writes {
            return write();
        }
        let mut txn = match self.gateway.begin_transaction()? {
            Support::Native(txn) => txn,
            Support::Unsupported => {
                debug!(
                    entity = %entity.name,
                    operation,
                    "backend has no transactions, writing directly"
                );
                return write();
            }
        };
        match write() {
            Ok(value) => {
                self.gateway.commit_transaction(&mut txn)?;
                Ok(value)
            }
            Err(e) => {
                self.stats.record_rollback();
                if let Err(rollback) = self.gateway.rollback_transaction(&mut txn) {
                    warn!(entity = %entity.name, operation, error = %rollback, "rollback failed");
                }
                warn!(entity = %entity.name, operation, error = %e, "write rolled back");
                Err(e)
            }
        }
    }

    fn read_header(&self, entity: &EntityDefinition) -> FileBotResult<FileHeader> {
        let raw = self.gateway.get(&entity.global, &[HEADER_SUBSCRIPT])?;
        Ok(FileHeader::parse(raw.as_deref(), entity))
    }

    /// The next free record id: one past the larger of the header's last id
    /// and the highest id in use.
    fn next_ien(&self, entity: &EntityDefinition) -> FileBotResult<(String, u64)> {
        let header = self.read_header(entity)?;
        let highest = self.gateway.last_integer_subscript(&entity.global)?.unwrap_or(0);
        let mut candidate = header.last.max(highest).saturating_add(1);
        for _ in 0..self.config.traversal_cap {
            let ien = candidate.to_string();
            if !self.gateway.data(&entity.global, &[ien.as_str()])?.exists() {
                return Ok((ien, candidate));
            }
            candidate = candidate.saturating_add(1);
        }
        Err(FileBotError::backend(format!(
            "no free record id in ^{}",
            entity.global
        )))
    }

    /// Field values of a record in subscript order.
    fn read_ordered(
        &self,
        entity: &EntityDefinition,
        ien: &str,
    ) -> FileBotResult<Option<Vec<(String, String)>>> {
        if !self.gateway.data(&entity.global, &[ien])?.exists() {
            return Ok(None);
        }
        let mut fields = Vec::new();
        self.gateway.walk(&entity.global, &[ien], "", |field| {
            fields.push(field.to_string());
            Ok(true)
        })?;
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(value) = self.gateway.get(&entity.global, &[ien, &field])? {
                values.push((field, value));
            }
        }
        Ok(Some(values))
    }

    fn read_values(
        &self,
        entity: &EntityDefinition,
        ien: &str,
    ) -> FileBotResult<Option<FieldValues>> {
        Ok(self
            .read_ordered(entity, ien)?
            .map(|values| values.into_iter().collect()))
    }

    fn view(
        &self,
        entity: &EntityDefinition,
        ien: &str,
        values: Vec<(String, String)>,
        format: FieldFormat,
    ) -> RecordView {
        let fields = values
            .into_iter()
            .map(|(field, internal)| {
                let def = entity.definition_for(&field);
                let external = format
                    .external()
                    .then(|| self.transformer.to_external(&def, &internal));
                FieldView {
                    name: def.name.clone(),
                    internal: format.internal().then_some(internal),
                    external,
                    field,
                }
            })
            .collect();
        RecordView {
            entity: entity.name.clone(),
            ien: ien.to_string(),
            fields,
        }
    }
}

impl<S> fmt::Debug for FileBot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBot")
            .field("config", &self.config)
            .field("entities", &self.dictionary.entities().count())
            .finish_non_exhaustive()
    }
}

fn check_ien(entity: &EntityDefinition, ien: &str) -> FileBotResult<()> {
    if is_ien(ien) {
        Ok(())
    } else {
        Err(FileBotError::InvalidId {
            entity: entity.name.clone(),
            ien: ien.to_string(),
        })
    }
}
