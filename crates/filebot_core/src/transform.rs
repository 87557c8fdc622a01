//! External/internal value conversion.
//!
//! Transforms never fail: when a value cannot be converted it is returned
//! unchanged and validation decides whether it is acceptable.

use crate::date::{self, DateStyle, YearPivot};
use crate::dictionary::{FieldDefinition, FieldType, IdentifierKind, TransformId};
use filebot_storage::canonicalize_number;

const NAME_SUFFIXES: [&str; 7] = ["JR", "SR", "II", "III", "IV", "V", "MD"];

/// Converts field values between their external and internal forms.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    pivot: YearPivot,
    date_style: DateStyle,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(YearPivot::default())
    }
}

impl Transformer {
    /// Creates a transformer using `pivot` for two-digit years.
    #[must_use]
    pub fn new(pivot: YearPivot) -> Self {
        Self {
            pivot,
            date_style: DateStyle::Standard,
        }
    }

    /// Sets the style dates are rendered in externally.
    #[must_use]
    pub fn date_style(mut self, style: DateStyle) -> Self {
        self.date_style = style;
        self
    }

    /// Converts an entered value to its stored form.
    #[must_use]
    pub fn to_internal(&self, def: &FieldDefinition, external: &str) -> String {
        let converted = match def.input_transform {
            TransformId::None => None,
            TransformId::Uppercase => Some(external.trim().to_uppercase()),
            TransformId::NameFormat => normalize_name(external),
            TransformId::IdentifierFormat => strip_separators(external),
            TransformId::DateFormat => match date::parse_external(external, self.pivot) {
                Ok(Some(internal)) => Some(internal),
                Ok(None) => Some(String::new()),
                Err(_) => None,
            },
            TransformId::NumericFormat => canonicalize_number(external),
            TransformId::Custom(f) => f(external),
        };
        converted.unwrap_or_else(|| external.to_string())
    }

    /// Converts a stored value to its display form.
    #[must_use]
    pub fn to_external(&self, def: &FieldDefinition, internal: &str) -> String {
        if internal.is_empty() {
            return String::new();
        }
        let converted = match def.output_transform {
            TransformId::None | TransformId::Uppercase | TransformId::NameFormat => None,
            TransformId::IdentifierFormat => match def.field_type {
                FieldType::Identifier(kind) => format_identifier(kind, internal),
                _ => None,
            },
            TransformId::DateFormat => date::external_format(internal, self.date_style).ok(),
            TransformId::NumericFormat => canonicalize_number(internal),
            TransformId::Custom(f) => f(internal),
        };
        converted.unwrap_or_else(|| internal.to_string())
    }
}

/// Normalizes a person name to `LAST,FIRST MIDDLE`.
///
/// Accepts `Last, First Middle` and `First Middle Last [Suffix]`. Periods
/// are dropped and whitespace collapsed. Returns `None` for a single word.
#[must_use]
pub fn normalize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw.replace('.', " ").to_uppercase();
    if let Some((last, rest)) = cleaned.split_once(',') {
        let last = collapse(last);
        let rest = collapse(rest);
        if last.is_empty() {
            return None;
        }
        return Some(format!("{last},{rest}"));
    }

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    let has_suffix = words.len() > 2 && words.last().is_some_and(|w| NAME_SUFFIXES.contains(w));
    let suffix = if has_suffix { words.pop() } else { None };
    let last = words.pop()?;
    if words.is_empty() {
        return None;
    }
    let mut given = words.join(" ");
    if let Some(suffix) = suffix {
        given.push(' ');
        given.push_str(suffix);
    }
    Some(format!("{last},{given}"))
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops the punctuation identifiers are commonly typed with (spaces,
/// dashes, dots and parentheses). Any other character is kept so
/// validation can reject it. Returns `None` if nothing remains.
#[must_use]
pub fn strip_separators(raw: &str) -> Option<String> {
    let kept: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    (!kept.is_empty()).then_some(kept)
}

/// Re-inserts standard punctuation into a stored identifier.
#[must_use]
pub fn format_identifier(kind: IdentifierKind, digits: &str) -> Option<String> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) || !kind.accepts_len(digits.len()) {
        return None;
    }
    Some(match (kind, digits.len()) {
        (IdentifierKind::Ssn, _) => format!("{}-{}-{}", &digits[..3], &digits[3..5], &digits[5..]),
        (IdentifierKind::Phone, _) => {
            format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
        }
        (IdentifierKind::Zip, 9) => format!("{}-{}", &digits[..5], &digits[5..]),
        (IdentifierKind::Zip, _) => digits.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;

    #[test]
    fn names() {
        assert_eq!(normalize_name("John Q Smith").as_deref(), Some("SMITH,JOHN Q"));
        assert_eq!(normalize_name("Smith, John").as_deref(), Some("SMITH,JOHN"));
        assert_eq!(normalize_name("smith,john").as_deref(), Some("SMITH,JOHN"));
        assert_eq!(normalize_name("  O'Brien ,  Mary   Ann ").as_deref(), Some("O'BRIEN,MARY ANN"));
        assert_eq!(normalize_name("John Q. Public Jr.").as_deref(), Some("PUBLIC,JOHN Q JR"));
        assert_eq!(normalize_name("Cher"), None);
        assert_eq!(normalize_name(", John"), None);
    }

    #[test]
    fn identifiers() {
        assert_eq!(strip_separators("123-45-6789").as_deref(), Some("123456789"));
        assert_eq!(strip_separators("(555) 123.4567").as_deref(), Some("5551234567"));
        assert_eq!(strip_separators("12A-45-6789").as_deref(), Some("12A456789"));
        assert_eq!(strip_separators(" - "), None);
        assert_eq!(
            format_identifier(IdentifierKind::Ssn, "123456789").as_deref(),
            Some("123-45-6789")
        );
        assert_eq!(
            format_identifier(IdentifierKind::Phone, "5551234567").as_deref(),
            Some("(555) 123-4567")
        );
        assert_eq!(
            format_identifier(IdentifierKind::Zip, "123456789").as_deref(),
            Some("12345-6789")
        );
        assert_eq!(format_identifier(IdentifierKind::Zip, "12345").as_deref(), Some("12345"));
        assert_eq!(format_identifier(IdentifierKind::Ssn, "1234"), None);
    }

    #[test]
    fn field_round_trips() {
        let dict = Dictionary::standard().unwrap();
        let t = Transformer::default();

        let ssn = dict.definition_for("2", ".09");
        assert_eq!(t.to_internal(&ssn, "123-45-6789"), "123456789");
        assert_eq!(t.to_external(&ssn, "123456789"), "123-45-6789");

        let dob = dict.definition_for("2", ".03");
        assert_eq!(t.to_internal(&dob, "01/15/1985"), "2850115");
        assert_eq!(t.to_internal(&dob, "2850115"), "2850115");
        assert_eq!(t.to_internal(&dob, ""), "");
        assert_eq!(t.to_external(&dob, "2850115"), "01/15/1985");

        let sex = dict.definition_for("2", ".02");
        assert_eq!(t.to_internal(&sex, " f "), "F");

        let stop = dict.definition_for("44", "8");
        assert_eq!(t.to_internal(&stop, "0301"), "301");
    }

    #[test]
    fn failures_return_input_unchanged() {
        let dict = Dictionary::standard().unwrap();
        let t = Transformer::default();
        let dob = dict.definition_for("2", ".03");
        assert_eq!(t.to_internal(&dob, "sometime"), "sometime");
        assert_eq!(t.to_external(&dob, "2851399"), "2851399");

        let name = dict.definition_for("2", ".01");
        assert_eq!(t.to_internal(&name, "Cher"), "Cher");

        let stop = dict.definition_for("44", "8");
        assert_eq!(t.to_internal(&stop, "abc"), "abc");
    }

    #[test]
    fn date_style_is_configurable() {
        let dict = Dictionary::standard().unwrap();
        let t = Transformer::default().date_style(DateStyle::FileMan);
        assert_eq!(t.to_external(&dict.definition_for("2", ".03"), "2850115"), "JAN 15,1985");
    }
}
