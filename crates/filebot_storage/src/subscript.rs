//! Subscript collation and global name handling.
//!
//! Globals collate their subscripts the way MUMPS does: canonical numbers
//! first, in numeric order, then every other string in byte order. A string
//! like `"01"` or `"0.5"` is *not* a canonical number and collates with the
//! strings.

use crate::error::{StoreError, StoreResult};
use std::cmp::Ordering;
use std::fmt;

/// Returns true if `s` is a canonical MUMPS number.
///
/// Canonical numbers have no leading `+`, no leading zeros in the integer
/// part, no trailing zeros in the fraction, no trailing `.`, and no integer
/// part at all when it would be zero (`.5`, not `0.5`). `-0` is not
/// canonical; `0` is.
#[must_use]
pub fn is_canonical_number(s: &str) -> bool {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if body.is_empty() {
        return false;
    }

    let (int, frac) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };

    if !int.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if let Some(f) = frac {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) || f.ends_with('0') {
            return false;
        }
    }

    if int.is_empty() {
        return frac.is_some();
    }
    if int == "0" {
        return frac.is_none() && !negative;
    }
    !int.starts_with('0')
}

/// Converts a numeric-looking string into its canonical form.
///
/// Accepts an optional sign, digits, and at most one decimal point
/// (`"0.01"` becomes `".01"`, `"+007"` becomes `"7"`). Returns `None` if the
/// input is not numeric.
#[must_use]
pub fn canonicalize_number(s: &str) -> Option<String> {
    let s = s.trim();
    let (negative, body) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let (int, frac) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');

    let mut out = String::with_capacity(s.len());
    if int.is_empty() && frac.is_empty() {
        return Some("0".to_string());
    }
    if negative {
        out.push('-');
    }
    out.push_str(int);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}

/// Compares two subscripts in store collation order.
///
/// The empty string sorts before everything; it is the "before the first"
/// sentinel used by ordered traversal.
#[must_use]
pub fn collate(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    match (is_canonical_number(a), is_canonical_number(b)) {
        (true, true) => numeric_cmp(a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.as_bytes().cmp(b.as_bytes()),
    }
}

/// Compares two canonical numbers exactly, without going through floats.
fn numeric_cmp(a: &str, b: &str) -> Ordering {
    let (a_neg, a_mag) = split_sign(a);
    let (b_neg, b_mag) = split_sign(b);
    match (a_neg, b_neg) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => magnitude_cmp(a_mag, b_mag),
        (true, true) => magnitude_cmp(b_mag, a_mag),
    }
}

fn split_sign(s: &str) -> (bool, &str) {
    match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    }
}

fn magnitude_cmp(a: &str, b: &str) -> Ordering {
    let (a_int, a_frac) = a.split_once('.').unwrap_or((a, ""));
    let (b_int, b_frac) = b.split_once('.').unwrap_or((b, ""));
    // "0" has an integer part but no magnitude; treat it like ".0".
    let a_int = if a_int == "0" { "" } else { a_int };
    let b_int = if b_int == "0" { "" } else { b_int };

    a_int
        .len()
        .cmp(&b_int.len())
        .then_with(|| a_int.cmp(b_int))
        .then_with(|| a_frac.cmp(b_frac))
}

/// A subscript wrapped so that `Ord` follows store collation.
///
/// Equality is plain string equality, which agrees with [`collate`] because
/// two distinct canonical numbers never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptKey(String);

impl SubscriptKey {
    /// Wraps a subscript.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the subscript text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the subscript text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Ord for SubscriptKey {
    fn cmp(&self, other: &Self) -> Ordering {
        collate(&self.0, &other.0)
    }
}

impl PartialOrd for SubscriptKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SubscriptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a global name: strips an optional leading `^` and checks the
/// remaining characters.
///
/// # Errors
///
/// Returns [`StoreError::InvalidGlobalName`] if the name is empty or contains
/// characters other than ASCII alphanumerics, `%` and `_`.
pub fn normalize_global_name(name: &str) -> StoreResult<&str> {
    let bare = name.strip_prefix('^').unwrap_or(name);
    if bare.is_empty()
        || !bare
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'%' || b == b'_')
    {
        return Err(StoreError::InvalidGlobalName(name.to_string()));
    }
    Ok(bare)
}

/// Renders a global reference like `^DPT(1,".01")` for logs and lock paths.
#[must_use]
pub fn render_reference(global: &str, subscripts: &[&str]) -> String {
    let bare = global.strip_prefix('^').unwrap_or(global);
    let mut out = format!("^{bare}");
    if subscripts.is_empty() {
        return out;
    }
    out.push('(');
    for (i, sub) in subscripts.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if is_canonical_number(sub) {
            out.push_str(sub);
        } else {
            out.push('"');
            out.push_str(&sub.replace('"', "\"\""));
            out.push('"');
        }
    }
    out.push(')');
    out
}

/// Rejects null subscripts, which no node may be addressed by.
pub(crate) fn check_subscripts(subscripts: &[&str]) -> StoreResult<()> {
    if let Some(pos) = subscripts.iter().position(|s| s.is_empty()) {
        return Err(StoreError::invalid_subscripts(format!(
            "null subscript at position {}",
            pos + 1
        )));
    }
    Ok(())
}

/// Splits an ordered-traversal path into the parent level and the current
/// subscript. Only the last subscript may be empty.
pub(crate) fn split_order_path<'a>(
    subscripts: &'a [&'a str],
) -> StoreResult<(&'a [&'a str], &'a str)> {
    let Some((current, parent)) = subscripts.split_last() else {
        return Err(StoreError::invalid_subscripts(
            "ordered traversal needs at least one subscript",
        ));
    };
    check_subscripts(parent)?;
    Ok((parent, current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_subscripts_rejected() {
        assert!(check_subscripts(&["1", ".01"]).is_ok());
        assert!(check_subscripts(&["1", ""]).is_err());
        assert!(split_order_path(&[]).is_err());
        assert!(split_order_path(&["", "1"]).is_err());

        let (parent, current) = split_order_path(&["B", "SMITH", ""]).unwrap();
        assert_eq!(parent, &["B", "SMITH"]);
        assert_eq!(current, "");
    }

    #[test]
    fn canonical_numbers() {
        for s in ["0", "1", "42", "-7", ".5", "-.5", "1.25", "100"] {
            assert!(is_canonical_number(s), "{s} should be canonical");
        }
        for s in ["", "-", "-0", "01", "0.5", "1.", ".", "1.50", "+1", "1e3", "A", " 1"] {
            assert!(!is_canonical_number(s), "{s} should not be canonical");
        }
    }

    #[test]
    fn canonicalize() {
        assert_eq!(canonicalize_number("0.01").as_deref(), Some(".01"));
        assert_eq!(canonicalize_number("+007").as_deref(), Some("7"));
        assert_eq!(canonicalize_number("1.500").as_deref(), Some("1.5"));
        assert_eq!(canonicalize_number("-0.0").as_deref(), Some("0"));
        assert_eq!(canonicalize_number("-3.10").as_deref(), Some("-3.1"));
        assert_eq!(canonicalize_number("."), None);
        assert_eq!(canonicalize_number("12a"), None);
    }

    #[test]
    fn numbers_before_strings() {
        assert_eq!(collate("999", "A"), Ordering::Less);
        assert_eq!(collate("B", "10"), Ordering::Greater);
        // Non-canonical numeric strings collate as strings.
        assert_eq!(collate("01", "2"), Ordering::Greater);
    }

    #[test]
    fn numeric_order_is_by_value() {
        let mut subs = vec!["10", "2", "-1", ".5", "0", "1.5", "-.25", "SMITH", "B"];
        subs.sort_by(|a, b| collate(a, b));
        assert_eq!(
            subs,
            vec!["-1", "-.25", "0", ".5", "1.5", "2", "10", "B", "SMITH"]
        );
    }

    #[test]
    fn long_numbers_compare_exactly() {
        assert_eq!(
            collate("12345678901234567890", "12345678901234567891"),
            Ordering::Less
        );
    }

    #[test]
    fn empty_sorts_first() {
        assert_eq!(collate("", "-5"), Ordering::Less);
        assert_eq!(collate("A", ""), Ordering::Greater);
    }

    #[test]
    fn global_names() {
        assert_eq!(normalize_global_name("^DPT").unwrap(), "DPT");
        assert_eq!(normalize_global_name("DPT").unwrap(), "DPT");
        assert!(normalize_global_name("^").is_err());
        assert!(normalize_global_name("D PT").is_err());
    }

    #[test]
    fn reference_rendering() {
        assert_eq!(render_reference("DPT", &[]), "^DPT");
        assert_eq!(render_reference("^DPT", &["1", ".01"]), "^DPT(1,.01)");
        assert_eq!(
            render_reference("DPT", &["B", "O\"BRIEN", "3"]),
            "^DPT(\"B\",\"O\"\"BRIEN\",3)"
        );
    }
}
