//! Validation of internal field values against the dictionary.
//!
//! Checks never stop at the first failure: callers get the complete set of
//! errors for a field or record.

use crate::date;
use crate::dictionary::{EntityDefinition, FieldDefinition, FieldType, FieldValues};
use crate::error::{ErrorCode, FieldError, FileBotError, FileBotResult};
use serde::Serialize;
use tracing::debug;

/// The outcome of validating a field or record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Every failure found, in check order.
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub fn valid() -> Self {
        Self::default()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Appends the failures of another result.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    /// Converts a failing result into [`FileBotError::Validation`].
    pub fn into_result(self, entity: &str, ien: Option<&str>) -> FileBotResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(FileBotError::validation(
                entity,
                ien.map(str::to_string),
                self.errors,
            ))
        }
    }

    fn push(&mut self, field: &str, code: ErrorCode, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, code, message));
    }
}

/// Answers "which records already hold this value" for unique fields.
pub trait UniquenessProbe {
    /// Returns the ids of records indexed under `internal` for `def`.
    fn owners(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        internal: &str,
    ) -> FileBotResult<Vec<String>>;
}

/// Validates field values.
///
/// Values are expected in internal form; run them through the
/// [`crate::Transformer`] first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Creates a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validates one field value.
    ///
    /// Order: required, type, length, pattern, uniqueness, custom. An empty
    /// optional value passes without further checks. A type failure skips
    /// the remaining checks for that field.
    ///
    /// Uniqueness is checked only when `probe` is given; `ien` is the record
    /// being written and is not counted as a conflicting owner.
    pub fn validate_field(
        &self,
        entity: &EntityDefinition,
        def: &FieldDefinition,
        internal: &str,
        ien: Option<&str>,
        probe: Option<&dyn UniquenessProbe>,
    ) -> FileBotResult<ValidationResult> {
        let mut result = ValidationResult::valid();
        let field = def.field.as_str();

        if internal.is_empty() {
            if def.required {
                result.push(field, ErrorCode::REQUIRED, format!("{} is required", def.name));
            }
            return Ok(result);
        }

        if let Err((code, message)) = check_type(def, internal) {
            result.push(field, code, message);
            return Ok(result);
        }

        let len = internal.chars().count();
        if len > def.max_length {
            result.push(
                field,
                ErrorCode::TOO_LONG,
                format!("{} is {len} characters, maximum is {}", def.name, def.max_length),
            );
        }

        if let Some(pattern) = &def.pattern {
            if !pattern.is_match(internal) {
                result.push(
                    field,
                    ErrorCode::PATTERN_MISMATCH,
                    format!("{} does not match {}", def.name, pattern.as_str()),
                );
            }
        }

        if def.unique {
            if let Some(probe) = probe {
                let owners = probe.owners(entity, def, internal)?;
                if let Some(owner) = owners.iter().find(|o| Some(o.as_str()) != ien) {
                    debug!(
                        entity = %entity.name,
                        field,
                        owner = %owner,
                        "unique value already owned"
                    );
                    result.push(
                        field,
                        ErrorCode::DUPLICATE,
                        format!("{} {internal:?} is already used by record {owner}", def.name),
                    );
                }
            }
        }

        if let Some(validator) = def.validator {
            if let Err(message) = validator(internal) {
                result.push(field, ErrorCode::CUSTOM_RULE, message);
            }
        }

        Ok(result)
    }

    /// Validates a whole record.
    ///
    /// Each supplied field is validated, then every required field missing
    /// from the merged record (existing values overlaid with `supplied`) is
    /// reported, then the entity's record rules run over the merged record.
    pub fn validate_record(
        &self,
        entity: &EntityDefinition,
        supplied: &FieldValues,
        existing: Option<&FieldValues>,
        ien: Option<&str>,
        probe: Option<&dyn UniquenessProbe>,
    ) -> FileBotResult<ValidationResult> {
        let mut result = ValidationResult::valid();
        for (field, value) in supplied {
            let def = entity.definition_for(field);
            result.merge(self.validate_field(entity, &def, value, ien, probe)?);
        }

        let merged = merge_values(existing, supplied);
        for def in entity.fields().filter(|d| d.required) {
            if supplied.contains_key(&def.field) {
                continue;
            }
            if merged.get(&def.field).map_or(true, String::is_empty) {
                result.push(
                    &def.field,
                    ErrorCode::REQUIRED,
                    format!("{} is required", def.name),
                );
            }
        }

        for rule in entity.rules() {
            let failures = (rule.check)(&merged);
            if !failures.is_empty() {
                debug!(
                    entity = %entity.name,
                    rule = rule.name,
                    count = failures.len(),
                    "record rule failed"
                );
            }
            result.errors.extend(failures);
        }
        Ok(result)
    }
}

/// Overlays `supplied` on `existing`. Empty supplied values clear a field.
#[must_use]
pub fn merge_values(existing: Option<&FieldValues>, supplied: &FieldValues) -> FieldValues {
    let mut merged = existing.cloned().unwrap_or_default();
    for (field, value) in supplied {
        if value.is_empty() {
            merged.remove(field);
        } else {
            merged.insert(field.clone(), value.clone());
        }
    }
    merged
}

fn check_type(def: &FieldDefinition, value: &str) -> Result<(), (ErrorCode, String)> {
    let invalid = |what: &str| {
        Err((
            ErrorCode::INVALID_TYPE,
            format!("{} must be {what}", def.name),
        ))
    };
    match def.field_type {
        FieldType::String => {
            if value.contains('^') || value.chars().any(char::is_control) {
                return invalid("a single line without '^'");
            }
        }
        FieldType::Text => {
            if value.contains('^') {
                return invalid("text without '^'");
            }
        }
        FieldType::Number => {
            if !is_number(value) {
                return invalid("a number");
            }
        }
        FieldType::Date => {
            if let Err(e) = date::decode(value) {
                return Err((ErrorCode::INVALID_DATE, format!("{}: {e}", def.name)));
            }
        }
        FieldType::Identifier(kind) => {
            if !value.bytes().all(|b| b.is_ascii_digit()) || !kind.accepts_len(value.len()) {
                return invalid(kind.shape());
            }
        }
        FieldType::Name => {
            if !is_name(value) {
                return invalid("in LAST,FIRST form");
            }
        }
    }
    Ok(())
}

/// Integer or decimal with an optional leading sign.
fn is_number(value: &str) -> bool {
    let unsigned = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    !(whole.is_empty() && fraction.is_empty())
        && digits(whole)
        && digits(fraction)
        && !unsigned.ends_with('.')
}

/// `LAST,FIRST [MIDDLE]` in upper case.
fn is_name(value: &str) -> bool {
    let Some((last, first)) = value.split_once(',') else {
        return false;
    };
    let allowed = |s: &str| {
        s.chars()
            .all(|c| c.is_ascii_uppercase() || matches!(c, ' ' | '\'' | '-'))
    };
    !last.trim().is_empty()
        && !first.trim().is_empty()
        && !first.contains(',')
        && allowed(last)
        && allowed(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use std::collections::BTreeMap;

    struct FixedOwners(BTreeMap<String, Vec<String>>);

    impl FixedOwners {
        fn with(value: &str, owners: &[&str]) -> Self {
            let mut map = BTreeMap::new();
            map.insert(
                value.to_string(),
                owners.iter().map(|s| s.to_string()).collect(),
            );
            Self(map)
        }
    }

    impl UniquenessProbe for FixedOwners {
        fn owners(
            &self,
            _entity: &EntityDefinition,
            _def: &FieldDefinition,
            internal: &str,
        ) -> FileBotResult<Vec<String>> {
            Ok(self.0.get(internal).cloned().unwrap_or_default())
        }
    }

    fn values(pairs: &[(&str, &str)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn codes(result: &ValidationResult) -> Vec<ErrorCode> {
        result.errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn required_and_optional_empties() {
        let dict = Dictionary::standard().unwrap();
        let patient = dict.entity("2").unwrap();
        let v = Validator::new();

        let name = patient.definition_for(".01");
        let result = v.validate_field(patient, &name, "", None, None).unwrap();
        assert_eq!(codes(&result), [ErrorCode::REQUIRED]);

        let sex = patient.definition_for(".02");
        assert!(v.validate_field(patient, &sex, "", None, None).unwrap().is_valid());
    }

    #[test]
    fn type_checks() {
        let dict = Dictionary::standard().unwrap();
        let patient = dict.entity("2").unwrap();
        let clinic = dict.entity("44").unwrap();
        let v = Validator::new();
        let check = |entity: &EntityDefinition, field: &str, value: &str| {
            let def = entity.definition_for(field);
            codes(&v.validate_field(entity, &def, value, None, None).unwrap())
        };

        assert!(check(patient, ".01", "SMITH,JOHN Q").is_empty());
        assert!(check(patient, ".01", "O'BRIEN-KELLY,MARY").is_empty());
        assert_eq!(check(patient, ".01", "John Smith"), [ErrorCode::INVALID_TYPE]);
        assert_eq!(check(patient, ".01", "SMITH,"), [ErrorCode::INVALID_TYPE]);

        assert!(check(patient, ".03", "2850101").is_empty());
        assert_eq!(check(patient, ".03", "2851301"), [ErrorCode::INVALID_DATE]);

        assert!(check(patient, ".09", "123456789").is_empty());
        assert_eq!(check(patient, ".09", "12345"), [ErrorCode::INVALID_TYPE]);

        assert!(check(patient, ".116", "12345").is_empty());
        assert!(check(patient, ".116", "123456789").is_empty());
        assert_eq!(check(patient, ".116", "1234567"), [ErrorCode::INVALID_TYPE]);

        assert!(check(clinic, "8", "301").is_empty());
        assert!(check(clinic, "8", "1.5").is_empty());
        assert!(check(clinic, "8", "-12").is_empty());
        assert_eq!(check(clinic, "8", "abc"), [ErrorCode::INVALID_TYPE]);
        assert_eq!(check(clinic, "8", "1."), [ErrorCode::INVALID_TYPE]);

        assert_eq!(check(patient, ".111", "12 MAIN^ST"), [ErrorCode::INVALID_TYPE]);
    }

    #[test]
    fn length_and_pattern_both_reported() {
        let dict = Dictionary::standard().unwrap();
        let patient = dict.entity("2").unwrap();
        let state = patient.definition_for(".115");
        let result = Validator::new()
            .validate_field(patient, &state, "abc", None, None)
            .unwrap();
        assert_eq!(codes(&result), [ErrorCode::TOO_LONG, ErrorCode::PATTERN_MISMATCH]);
    }

    #[test]
    fn uniqueness_excludes_own_record() {
        let dict = Dictionary::standard().unwrap();
        let patient = dict.entity("2").unwrap();
        let ssn = patient.definition_for(".09");
        let probe = FixedOwners::with("123456789", &["1"]);
        let v = Validator::new();

        let own = v
            .validate_field(patient, &ssn, "123456789", Some("1"), Some(&probe))
            .unwrap();
        assert!(own.is_valid());

        let other = v
            .validate_field(patient, &ssn, "123456789", Some("2"), Some(&probe))
            .unwrap();
        assert_eq!(codes(&other), [ErrorCode::DUPLICATE]);

        let create = v
            .validate_field(patient, &ssn, "123456789", None, Some(&probe))
            .unwrap();
        assert_eq!(codes(&create), [ErrorCode::DUPLICATE]);

        let unprobed = v.validate_field(patient, &ssn, "123456789", None, None).unwrap();
        assert!(unprobed.is_valid());
    }

    #[test]
    fn custom_validator_runs_last() {
        fn even(value: &str) -> Result<(), String> {
            match value.parse::<i64>() {
                Ok(n) if n % 2 == 0 => Ok(()),
                _ => Err("must be even".into()),
            }
        }
        let dict = Dictionary::builder()
            .entity(
                EntityDefinition::new("9000", "TEST", "ZZT").field(
                    FieldDefinition::new("1", "COUNT", FieldType::Number)
                        .max_length(2)
                        .validator(even),
                ),
            )
            .build()
            .unwrap();
        let entity = dict.entity("9000").unwrap();
        let def = entity.definition_for("1");
        let result = Validator::new()
            .validate_field(entity, &def, "123", None, None)
            .unwrap();
        assert_eq!(codes(&result), [ErrorCode::TOO_LONG, ErrorCode::CUSTOM_RULE]);
    }

    #[test]
    fn record_errors_aggregate() {
        let dict = Dictionary::standard().unwrap();
        let patient = dict.entity("2").unwrap();
        let supplied = values(&[(".02", "X"), (".03", "not a date")]);
        let result = Validator::new()
            .validate_record(patient, &supplied, None, None, None)
            .unwrap();
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&".01"));
        assert!(fields.contains(&".02"));
        assert!(fields.contains(&".03"));
    }

    #[test]
    fn update_checks_merged_record() {
        let dict = Dictionary::standard().unwrap();
        let patient = dict.entity("2").unwrap();
        let existing = values(&[(".01", "SMITH,JOHN"), (".03", "2850101")]);
        let v = Validator::new();

        let supplied = values(&[(".02", "M")]);
        assert!(v
            .validate_record(patient, &supplied, Some(&existing), Some("1"), None)
            .unwrap()
            .is_valid());

        let cleared = values(&[(".03", "")]);
        let result = v
            .validate_record(patient, &cleared, Some(&existing), Some("1"), None)
            .unwrap();
        assert_eq!(codes(&result), [ErrorCode::REQUIRED]);
    }

    #[test]
    fn record_rules_see_merged_values() {
        let dict = Dictionary::standard().unwrap();
        let patient = dict.entity("2").unwrap();
        let existing = values(&[(".01", "SMITH,JOHN"), (".03", "2850101")]);
        let supplied = values(&[(".03", "4990101")]);
        let result = Validator::new()
            .validate_record(patient, &supplied, Some(&existing), Some("1"), None)
            .unwrap();
        assert_eq!(codes(&result), [ErrorCode::CROSS_FIELD]);
    }

    #[test]
    fn into_result_carries_context() {
        let mut result = ValidationResult::valid();
        assert!(result.clone().into_result("PATIENT", None).is_ok());
        result.push(".01", ErrorCode::REQUIRED, "NAME is required");
        let err = result.into_result("PATIENT", Some("3")).unwrap_err();
        assert_eq!(err.report().record_id.as_deref(), Some("3"));
    }
}
