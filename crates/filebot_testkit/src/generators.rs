//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use chrono::{Days, NaiveDate};
use filebot_storage::canonicalize_number;
use proptest::prelude::*;

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(1800, 1, 1).expect("1800-01-01 is a valid date")
}

/// Number of days in the supported range, 1800-01-01 through 2199-12-31.
pub fn supported_day_count() -> u64 {
    let last = NaiveDate::from_ymd_opt(2199, 12, 31).expect("2199-12-31 is a valid date");
    (last - first_day()).num_days() as u64 + 1
}

/// Strategy for generating calendar dates inside the FileMan range.
pub fn fileman_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0..supported_day_count()).prop_map(|offset| {
        first_day()
            .checked_add_days(Days::new(offset))
            .expect("Offset stays inside the supported range")
    })
}

/// Strategy for generating canonical numeric subscripts: integers,
/// negatives and decimals.
pub fn numeric_subscript_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..100_000).prop_map(|n| n.to_string()),
        (-500i32..500, 1u32..1000).prop_map(|(whole, frac)| {
            let raw = format!("{whole}.{frac:03}");
            canonicalize_number(&raw).unwrap_or(raw)
        }),
    ]
}

/// Strategy for generating non-empty subscripts of mixed kinds.
pub fn subscript_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        numeric_subscript_strategy(),
        prop::string::string_regex("[A-Za-z][A-Za-z0-9 ,.-]{0,10}").expect("Invalid regex"),
    ]
}

/// Strategy for generating patient names already in `LAST,FIRST` form.
pub fn patient_name_strategy() -> impl Strategy<Value = String> {
    ("[A-Z]{3,10}", "[A-Z]{2,10}").prop_map(|(last, first)| format!("{last},{first}"))
}

/// A small pool of plausible SSNs, so generated records collide often.
pub const SSN_POOL: [&str; 5] = [
    "123456789",
    "234567890",
    "345678901",
    "456789012",
    "567890123",
];

/// Strategy for generating a value from [`SSN_POOL`].
pub fn ssn_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(SSN_POOL.to_vec()).prop_map(str::to_string)
}

/// One generated write against the PATIENT file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrudOp {
    /// Create a patient, optionally with an SSN.
    Create {
        /// Internal-form name.
        name: String,
        /// SSN, if any.
        ssn: Option<String>,
    },
    /// Set or clear the SSN of the `slot`th live record.
    UpdateSsn {
        /// Index into the live records, taken modulo their count.
        slot: usize,
        /// New SSN, or `None` to clear.
        ssn: Option<String>,
    },
    /// Rename the `slot`th live record.
    Rename {
        /// Index into the live records, taken modulo their count.
        slot: usize,
        /// New internal-form name.
        name: String,
    },
    /// Delete the `slot`th live record.
    Delete {
        /// Index into the live records, taken modulo their count.
        slot: usize,
    },
}

/// Strategy for generating a single write.
pub fn crud_op_strategy() -> impl Strategy<Value = CrudOp> {
    prop_oneof![
        3 => (patient_name_strategy(), prop::option::of(ssn_strategy()))
            .prop_map(|(name, ssn)| CrudOp::Create { name, ssn }),
        2 => (any::<usize>(), prop::option::of(ssn_strategy()))
            .prop_map(|(slot, ssn)| CrudOp::UpdateSsn { slot, ssn }),
        1 => (any::<usize>(), patient_name_strategy())
            .prop_map(|(slot, name)| CrudOp::Rename { slot, name }),
        1 => any::<usize>().prop_map(|slot| CrudOp::Delete { slot }),
    ]
}

/// Strategy for generating a sequence of writes.
pub fn crud_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<CrudOp>> {
    prop::collection::vec(crud_op_strategy(), 1..max_len.max(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filebot_storage::is_canonical_number;
    use proptest::test_runner::TestRunner;

    #[test]
    fn day_count_covers_four_centuries() {
        // 400 Gregorian years always hold 146,097 days.
        assert_eq!(supported_day_count(), 146_097);
    }

    #[test]
    fn numeric_subscripts_are_canonical() {
        let mut runner = TestRunner::default();
        runner
            .run(&numeric_subscript_strategy(), |s| {
                prop_assert!(is_canonical_number(&s), "{s:?}");
                Ok(())
            })
            .unwrap();
    }
}
