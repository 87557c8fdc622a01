//! # FileBot Testkit
//!
//! Test utilities for FileBot.
//!
//! This crate provides:
//! - Fixtures: orchestrators over temporary stores, seeded patient files
//! - A fault-injecting store wrapper for retry and degraded-backend tests
//! - Property-based test generators using proptest
//! - Shared date vectors
//!
//! ## Usage
//!
//! ```rust
//! use filebot_testkit::prelude::*;
//!
//! with_memory_bot(|bot| {
//!     let ien = bot.create("PATIENT", &[(".01", "SMITH,JOHN"), (".03", "2850101")]).unwrap();
//!     assert_eq!(ien, "1");
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod flaky;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::flaky::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use flaky::*;
pub use generators::*;
pub use vectors::*;
