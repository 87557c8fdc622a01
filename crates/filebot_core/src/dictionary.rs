//! Field dictionary: static per-entity field metadata.
//!
//! Entities are looked up by file number (`"2"`), name (`"PATIENT"`, any
//! case) or global (`"DPT"` / `"^DPT"`). Fields not described by the
//! dictionary, and entities it does not model, fall back to a permissive
//! definition so unmodeled data degrades to unchecked storage.

use crate::date;
use crate::error::{ErrorCode, FieldError};
use filebot_storage::{
    canonicalize_number, is_canonical_number, normalize_global_name, SubscriptKey,
};
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field number of the `.01` (name) field every FileMan file has.
pub const NAME_FIELD: &str = ".01";

/// Length of the permissive fallback field.
pub const FALLBACK_MAX_LENGTH: usize = 255;

/// Field values keyed by canonical field number.
pub type FieldValues = BTreeMap<String, String>;

/// Errors building a dictionary.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// A field pattern did not compile.
    #[error("field {field} of {entity}: invalid pattern: {source}")]
    InvalidPattern {
        /// Entity name.
        entity: String,
        /// Field number.
        field: String,
        /// Compile error.
        source: regex::Error,
    },

    /// Two entities claim the same key.
    #[error("duplicate entity key {0:?}")]
    DuplicateEntity(String),

    /// The global name is malformed.
    #[error("entity {0}: invalid global name")]
    InvalidGlobal(String),

    /// A cross-reference name would collide with record ids.
    #[error("field {field} of {entity}: cross-reference name {xref:?} must not be numeric")]
    InvalidXref {
        /// Entity name.
        entity: String,
        /// Field number.
        field: String,
        /// Offending name.
        xref: String,
    },
}

/// What kind of identifier a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// Nine-digit social security number.
    Ssn,
    /// Ten-digit North American phone number.
    Phone,
    /// Five- or nine-digit ZIP code.
    Zip,
}

impl IdentifierKind {
    /// Returns true if `digits` has an accepted digit count.
    #[must_use]
    pub fn accepts_len(self, len: usize) -> bool {
        match self {
            Self::Ssn => len == 9,
            Self::Phone => len == 10,
            Self::Zip => len == 5 || len == 9,
        }
    }

    /// Describes the accepted shape for error messages.
    #[must_use]
    pub const fn shape(self) -> &'static str {
        match self {
            Self::Ssn => "9 digits",
            Self::Phone => "10 digits",
            Self::Zip => "5 or 9 digits",
        }
    }
}

/// Field data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Free text on one line.
    String,
    /// Integer or decimal number.
    Number,
    /// FileMan internal date.
    Date,
    /// Punctuated identifier stored as digits.
    Identifier(IdentifierKind),
    /// `LAST,FIRST [MIDDLE]` person name.
    Name,
    /// Free text without the one-line restriction.
    Text,
}

/// Transform applied between external and internal forms.
#[derive(Debug, Clone, Copy)]
pub enum TransformId {
    /// Identity.
    None,
    /// Upper-case and trim.
    Uppercase,
    /// Normalize to `LAST,FIRST`.
    NameFormat,
    /// Strip punctuation inbound, re-insert it outbound.
    IdentifierFormat,
    /// Parse or render FileMan dates.
    DateFormat,
    /// Canonical number form.
    NumericFormat,
    /// Caller-supplied conversion. Returning `None` keeps the value.
    Custom(fn(&str) -> Option<String>),
}

/// A custom field validator. `Err` carries the message.
pub type FieldValidator = fn(&str) -> Result<(), String>;

/// Metadata for one field.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// Canonical field number.
    pub field: String,
    /// Display name.
    pub name: String,
    /// Data type.
    pub field_type: FieldType,
    /// Whether an empty value is rejected.
    pub required: bool,
    /// Maximum length of the internal value.
    pub max_length: usize,
    /// Pattern the internal value must match.
    pub pattern: Option<Regex>,
    /// Cross-reference name, when the field is indexed.
    pub xref: Option<String>,
    /// Whether no two records may share a value.
    pub unique: bool,
    /// External-to-internal transform.
    pub input_transform: TransformId,
    /// Internal-to-external transform.
    pub output_transform: TransformId,
    /// Extra check run after the built-in ones.
    pub validator: Option<FieldValidator>,
    pattern_source: Option<String>,
}

impl FieldDefinition {
    /// Creates a field with transforms implied by its type.
    pub fn new(field: &str, name: impl Into<String>, field_type: FieldType) -> Self {
        let transform = match field_type {
            FieldType::String | FieldType::Text => TransformId::None,
            FieldType::Number => TransformId::NumericFormat,
            FieldType::Date => TransformId::DateFormat,
            FieldType::Identifier(_) => TransformId::IdentifierFormat,
            FieldType::Name => TransformId::NameFormat,
        };
        Self {
            field: canonical_field_id(field),
            name: name.into(),
            field_type,
            required: false,
            max_length: default_length(field_type),
            pattern: None,
            xref: None,
            unique: false,
            input_transform: transform,
            output_transform: transform,
            validator: None,
            pattern_source: None,
        }
    }

    /// The permissive definition used for anything the dictionary omits.
    #[must_use]
    pub fn fallback(field: &str) -> Self {
        let mut def = Self::new(field, "unknown", FieldType::String);
        def.max_length = FALLBACK_MAX_LENGTH;
        def
    }

    /// Marks the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = len;
        self
    }

    /// Sets a pattern; compiled when the dictionary is built.
    #[must_use]
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern_source = Some(pattern.to_string());
        self
    }

    /// Indexes the field under cross-reference `name`.
    #[must_use]
    pub fn xref(mut self, name: &str) -> Self {
        self.xref = Some(name.to_string());
        self
    }

    /// Marks the field unique. Unique fields must be indexed.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets both transforms.
    #[must_use]
    pub fn transform(mut self, transform: TransformId) -> Self {
        self.input_transform = transform;
        self.output_transform = transform;
        self
    }

    /// Sets the inbound transform only.
    #[must_use]
    pub fn input_transform(mut self, transform: TransformId) -> Self {
        self.input_transform = transform;
        self
    }

    /// Sets the outbound transform only.
    #[must_use]
    pub fn output_transform(mut self, transform: TransformId) -> Self {
        self.output_transform = transform;
        self
    }

    /// Adds a custom validator.
    #[must_use]
    pub fn validator(mut self, validator: FieldValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Returns true if the field has a cross-reference.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.xref.is_some()
    }

    fn compile(&mut self, entity: &str) -> Result<(), DictionaryError> {
        if let Some(source) = &self.pattern_source {
            let regex = Regex::new(source).map_err(|e| DictionaryError::InvalidPattern {
                entity: entity.to_string(),
                field: self.field.clone(),
                source: e,
            })?;
            self.pattern = Some(regex);
        }
        Ok(())
    }
}

fn default_length(field_type: FieldType) -> usize {
    match field_type {
        FieldType::String => 80,
        FieldType::Number => 15,
        FieldType::Date => 7,
        FieldType::Identifier(_) => 10,
        FieldType::Name => 30,
        FieldType::Text => FALLBACK_MAX_LENGTH,
    }
}

/// Canonicalizes a field number: `"0.01"` and `".010"` become `".01"`.
/// Non-numeric ids are only trimmed.
#[must_use]
pub fn canonical_field_id(field: &str) -> String {
    canonicalize_number(field).unwrap_or_else(|| field.trim().to_string())
}

/// A rule over a whole record, run after per-field checks.
#[derive(Debug, Clone, Copy)]
pub struct RecordRule {
    /// Rule name used in logs.
    pub name: &'static str,
    /// Returns every failure for the record's internal values.
    pub check: fn(&FieldValues) -> Vec<FieldError>,
}

/// One entity type (a FileMan file).
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    /// File number.
    pub file_number: String,
    /// File name.
    pub name: String,
    /// Bare global name.
    pub global: String,
    fields: BTreeMap<SubscriptKey, FieldDefinition>,
    rules: Vec<RecordRule>,
    modeled: bool,
}

impl EntityDefinition {
    /// Starts an entity definition.
    pub fn new(file_number: &str, name: impl Into<String>, global: &str) -> Self {
        Self {
            file_number: canonical_field_id(file_number),
            name: name.into(),
            global: global.strip_prefix('^').unwrap_or(global).to_string(),
            fields: BTreeMap::new(),
            rules: Vec::new(),
            modeled: true,
        }
    }

    fn unmodeled(id: &str, global: &str) -> Self {
        let mut entity = Self::new(id, id, global);
        entity.modeled = false;
        entity
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, def: FieldDefinition) -> Self {
        self.fields.insert(SubscriptKey::new(def.field.clone()), def);
        self
    }

    /// Adds a record rule.
    #[must_use]
    pub fn rule(mut self, rule: RecordRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns true unless this is a permissive stand-in.
    #[must_use]
    pub fn is_modeled(&self) -> bool {
        self.modeled
    }

    /// Returns the definition for a field, or the permissive fallback.
    #[must_use]
    pub fn definition_for(&self, field: &str) -> Cow<'_, FieldDefinition> {
        let id = canonical_field_id(field);
        match self.fields.get(&SubscriptKey::new(id.clone())) {
            Some(def) => Cow::Borrowed(def),
            None => Cow::Owned(FieldDefinition::fallback(&id)),
        }
    }

    /// Returns the modeled definition for a field, if any.
    #[must_use]
    pub fn field_definition(&self, field: &str) -> Option<&FieldDefinition> {
        self.fields
            .get(&SubscriptKey::new(canonical_field_id(field)))
    }

    /// Modeled fields in field-number order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Modeled fields that carry a cross-reference.
    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values().filter(|f| f.is_indexed())
    }

    /// Finds the field indexed under cross-reference `xref`.
    #[must_use]
    pub fn field_for_xref(&self, xref: &str) -> Option<&FieldDefinition> {
        self.indexed_fields()
            .find(|f| f.xref.as_deref() == Some(xref))
    }

    /// Record-level rules.
    #[must_use]
    pub fn rules(&self) -> &[RecordRule] {
        &self.rules
    }

    fn compile(&mut self) -> Result<(), DictionaryError> {
        normalize_global_name(&self.global)
            .map_err(|_| DictionaryError::InvalidGlobal(self.name.clone()))?;
        for def in self.fields.values_mut() {
            def.compile(&self.name)?;
            if def.unique && def.xref.is_none() {
                def.xref = Some(format!("U{}", def.field));
            }
            if let Some(xref) = def
                .xref
                .as_deref()
                .filter(|x| x.is_empty() || is_canonical_number(x))
            {
                return Err(DictionaryError::InvalidXref {
                    entity: self.name.clone(),
                    field: def.field.clone(),
                    xref: xref.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Static lookup of entity and field metadata.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entities: Vec<EntityDefinition>,
    keys: BTreeMap<String, usize>,
}

/// Builds a [`Dictionary`].
#[derive(Debug, Default)]
pub struct DictionaryBuilder {
    entities: Vec<EntityDefinition>,
}

impl DictionaryBuilder {
    /// Adds an entity.
    #[must_use]
    pub fn entity(mut self, entity: EntityDefinition) -> Self {
        self.entities.push(entity);
        self
    }

    /// Compiles patterns and indexes entity keys.
    pub fn build(self) -> Result<Dictionary, DictionaryError> {
        let mut dictionary = Dictionary::default();
        for mut entity in self.entities {
            entity.compile()?;
            let index = dictionary.entities.len();
            for key in [
                entity.file_number.clone(),
                entity.name.to_ascii_uppercase(),
                entity.global.clone(),
            ] {
                match dictionary.keys.get(&key) {
                    Some(&existing) if existing != index => {
                        return Err(DictionaryError::DuplicateEntity(key));
                    }
                    _ => {
                        dictionary.keys.insert(key, index);
                    }
                }
            }
            dictionary.entities.push(entity);
        }
        Ok(dictionary)
    }
}

impl Dictionary {
    /// Starts a dictionary.
    #[must_use]
    pub fn builder() -> DictionaryBuilder {
        DictionaryBuilder::default()
    }

    /// The standard dictionary: PATIENT (file 2) and HOSPITAL LOCATION (file 44).
    pub fn standard() -> Result<Self, DictionaryError> {
        Self::builder()
            .entity(patient())
            .entity(hospital_location())
            .build()
    }

    /// Looks up a modeled entity.
    #[must_use]
    pub fn entity(&self, id: &str) -> Option<&EntityDefinition> {
        let id = id.trim();
        let bare = id.strip_prefix('^').unwrap_or(id);
        self.keys
            .get(bare)
            .or_else(|| self.keys.get(&bare.to_ascii_uppercase()))
            .or_else(|| self.keys.get(&canonical_field_id(bare)))
            .and_then(|&i| self.entities.get(i))
    }

    /// Looks up an entity, standing in a permissive definition whose
    /// global is the id itself when it is not modeled.
    ///
    /// Returns `None` only if the id is not usable as a global name.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<Cow<'_, EntityDefinition>> {
        if let Some(entity) = self.entity(id) {
            return Some(Cow::Borrowed(entity));
        }
        let global = normalize_global_name(id.trim()).ok()?;
        Some(Cow::Owned(EntityDefinition::unmodeled(global, global)))
    }

    /// Returns the definition for `(entity, field)`, falling back to the
    /// permissive default.
    #[must_use]
    pub fn definition_for(&self, entity: &str, field: &str) -> Cow<'_, FieldDefinition> {
        match self.entity(entity) {
            Some(e) => e.definition_for(field),
            None => Cow::Owned(FieldDefinition::fallback(&canonical_field_id(field))),
        }
    }

    /// Modeled entities.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.entities.iter()
    }
}

/// PATIENT, file 2, stored in `^DPT`.
#[must_use]
pub fn patient() -> EntityDefinition {
    EntityDefinition::new("2", "PATIENT", "DPT")
        .field(
            FieldDefinition::new(".01", "NAME", FieldType::Name)
                .required()
                .max_length(30)
                .xref("B"),
        )
        .field(
            FieldDefinition::new(".02", "SEX", FieldType::String)
                .max_length(1)
                .pattern("^[MF]$")
                .transform(TransformId::Uppercase),
        )
        .field(FieldDefinition::new(".03", "DATE OF BIRTH", FieldType::Date).required())
        .field(
            FieldDefinition::new(
                ".09",
                "SOCIAL SECURITY NUMBER",
                FieldType::Identifier(IdentifierKind::Ssn),
            )
            .max_length(9)
            .xref("SSN")
            .unique(),
        )
        .field(
            FieldDefinition::new(".111", "STREET ADDRESS [LINE 1]", FieldType::String)
                .max_length(35),
        )
        .field(FieldDefinition::new(".114", "CITY", FieldType::String).max_length(15))
        .field(
            FieldDefinition::new(".115", "STATE", FieldType::String)
                .max_length(2)
                .pattern("^[A-Z]{2}$")
                .transform(TransformId::Uppercase),
        )
        .field(
            FieldDefinition::new(".116", "ZIP CODE", FieldType::Identifier(IdentifierKind::Zip))
                .max_length(9),
        )
        .field(
            FieldDefinition::new(
                ".131",
                "PHONE NUMBER [RESIDENCE]",
                FieldType::Identifier(IdentifierKind::Phone),
            )
            .max_length(10),
        )
        .rule(RecordRule {
            name: "dob_not_future",
            check: dob_not_future,
        })
        .rule(RecordRule {
            name: "age_limit",
            check: age_limit,
        })
        .rule(RecordRule {
            name: "name_plausible",
            check: name_plausible,
        })
        .rule(RecordRule {
            name: "ssn_plausible",
            check: ssn_plausible,
        })
}

/// HOSPITAL LOCATION, file 44, stored in `^SC`.
#[must_use]
pub fn hospital_location() -> EntityDefinition {
    EntityDefinition::new("44", "HOSPITAL LOCATION", "SC")
        .field(
            FieldDefinition::new(".01", "NAME", FieldType::String)
                .required()
                .max_length(30)
                .transform(TransformId::Uppercase)
                .xref("B")
                .unique(),
        )
        .field(
            FieldDefinition::new("1", "ABBREVIATION", FieldType::String)
                .max_length(7)
                .transform(TransformId::Uppercase)
                .xref("C"),
        )
        .field(
            FieldDefinition::new("2", "TYPE", FieldType::String)
                .max_length(2)
                .pattern("^(C|M|W|Z|N|F|I|OR)$")
                .transform(TransformId::Uppercase),
        )
        .field(FieldDefinition::new("8", "STOP CODE NUMBER", FieldType::Number).max_length(3))
}

/// Maximum plausible age in years.
pub const MAX_AGE_YEARS: u32 = 150;

fn dob_not_future(values: &FieldValues) -> Vec<FieldError> {
    let Some(dob) = values.get(".03").and_then(|v| date::decode(v).ok()) else {
        return Vec::new();
    };
    if dob > date::today() {
        return vec![FieldError::new(
            ".03",
            ErrorCode::CROSS_FIELD,
            "date of birth cannot be in the future",
        )];
    }
    Vec::new()
}

fn age_limit(values: &FieldValues) -> Vec<FieldError> {
    let Some(dob) = values.get(".03").and_then(|v| date::decode(v).ok()) else {
        return Vec::new();
    };
    if date::age_between(dob, date::today()) > MAX_AGE_YEARS {
        return vec![FieldError::new(
            ".03",
            ErrorCode::CROSS_FIELD,
            format!("date of birth implies an age over {MAX_AGE_YEARS} years"),
        )];
    }
    Vec::new()
}

fn name_plausible(values: &FieldValues) -> Vec<FieldError> {
    match values.get(NAME_FIELD) {
        Some(name) if !name.is_empty() && name.len() < 3 => vec![FieldError::new(
            NAME_FIELD,
            ErrorCode::CROSS_FIELD,
            "name must be at least 3 characters",
        )],
        _ => Vec::new(),
    }
}

fn ssn_plausible(values: &FieldValues) -> Vec<FieldError> {
    let Some(ssn) = values
        .get(".09")
        .filter(|s| s.len() == 9 && s.bytes().all(|b| b.is_ascii_digit()))
    else {
        return Vec::new();
    };
    let (area, group, serial) = (&ssn[0..3], &ssn[3..5], &ssn[5..9]);
    if area == "000" || area == "666" || area.starts_with('9') || group == "00" || serial == "0000"
    {
        return vec![FieldError::new(
            ".09",
            ErrorCode::CROSS_FIELD,
            "social security number is not a plausible assignment",
        )];
    }
    Vec::new()
}
