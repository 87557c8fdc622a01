//! # FileBot Storage
//!
//! The global store adapter contract and its backends.
//!
//! A global is a named, sparse, ordered tree addressed by a list of string
//! subscripts. Every backend exposes the same minimal capability set
//! ([`GlobalStore`]): get, set, kill, ordered traversal in both directions,
//! and a four-state existence probe. Locking, transactions and native code
//! execution are optional and reported through [`Capabilities`].
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For tests and ephemeral data; supports locking and
//!   transactions
//! - [`JournalStore`] - Persistent append-only journal; supports locking
//! - [`Adapter`] - A configured backend with a cached health probe
//!
//! ## Collation
//!
//! Subscripts collate canonical numbers first, in numeric order, then all
//! other strings in byte order. See [`collate`].
//!
//! ## Example
//!
//! ```rust
//! use filebot_storage::{DataState, GlobalStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.set("DOE,JANE", "DPT", &["2", ".01"]).unwrap();
//! store.set("SMITH,JOHN", "DPT", &["10", ".01"]).unwrap();
//!
//! assert_eq!(store.order("DPT", &[""]).unwrap().as_deref(), Some("2"));
//! assert_eq!(store.order("DPT", &["2"]).unwrap().as_deref(), Some("10"));
//! assert_eq!(store.data("DPT", &["2"]).unwrap(), DataState::DescendantsOnly);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod journal;
mod locks;
mod memory;
mod store;
mod subscript;
mod tree;

pub use adapter::{Adapter, AdapterConfig, AdapterKind, AdapterSpec};
pub use error::{StoreError, StoreResult};
pub use journal::{
    compute_crc32, decode_frames, FileSink, JournalRecord, JournalSink, JournalStats,
    JournalStore, MemorySink, Replay, FRAME_HEADER_SIZE,
};
pub use memory::InMemoryStore;
pub use store::{
    Capabilities, ConnectionResult, DataState, GlobalStore, Support, Transaction, VersionInfo,
};
pub use subscript::{
    canonicalize_number, collate, is_canonical_number, normalize_global_name, render_reference,
    SubscriptKey,
};

/// Crate version, reported through [`VersionInfo`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
