//! Shared date vectors.
//!
//! Fixed FileMan dates with every external rendering, so other
//! implementations of the format can be checked against the same table.

use serde::{Deserialize, Serialize};

/// One FileMan date and its expected renderings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Internal `YYYMMDD` form.
    pub internal: String,
    /// `YYYY-MM-DD`.
    pub iso: String,
    /// `MM/DD/YYYY`.
    pub standard: String,
    /// `MON DD,YYYY`.
    pub fileman: String,
}

fn vector(id: &str, internal: &str, iso: &str, standard: &str, fileman: &str) -> DateVector {
    DateVector {
        id: id.into(),
        internal: internal.into(),
        iso: iso.into(),
        standard: standard.into(),
        fileman: fileman.into(),
    }
}

/// Dates at the range edges, leap days and century boundaries.
pub fn date_vectors() -> Vec<DateVector> {
    vec![
        vector("range_start", "1000101", "1800-01-01", "01/01/1800", "JAN 01,1800"),
        vector("range_end", "4991231", "2199-12-31", "12/31/2199", "DEC 31,2199"),
        vector("dob_1985", "2850101", "1985-01-01", "01/01/1985", "JAN 01,1985"),
        vector("leap_2000", "3000229", "2000-02-29", "02/29/2000", "FEB 29,2000"),
        vector("leap_1904", "2040229", "1904-02-29", "02/29/1904", "FEB 29,1904"),
        vector("century_1900", "2000101", "1900-01-01", "01/01/1900", "JAN 01,1900"),
        vector("eve_2100", "3991231", "2099-12-31", "12/31/2099", "DEC 31,2099"),
        vector("mid_year", "3240715", "2024-07-15", "07/15/2024", "JUL 15,2024"),
    ]
}

/// Internal strings that must not decode.
pub fn invalid_internal_dates() -> Vec<&'static str> {
    vec![
        "0991231", // 1799
        "5000101", // 2200
        "2851301", // month 13
        "2850132", // day 32
        "2850230", // Feb 30
        "1900229", // 1890 is not a leap year
        "285011",  // six digits
        "28501011",
        "285O101",
        "",
    ]
}

/// Generates JSON containing all vectors.
pub fn all_vectors_json() -> String {
    #[derive(Serialize)]
    struct AllVectors {
        dates: Vec<DateVector>,
        invalid_internal: Vec<&'static str>,
    }

    let vectors = AllVectors {
        dates: date_vectors(),
        invalid_internal: invalid_internal_dates(),
    };
    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}
