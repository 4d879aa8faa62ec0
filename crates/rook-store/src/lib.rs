//! # rook-store
//!
//! Durable game positions in SQLite.
//!
//! [`BucketStore`] is a small bucketed key-value layer (get, put, ordered
//! scan, create-if-absent). [`GameRepo`] keys game positions by
//! [`rook_core::SessionId`] inside one bucket per [`rook_core::GameKind`], and
//! [`Positions`] adapts one bucket to the [`PositionStore`] capability the
//! session layer persists through.

#![deny(unsafe_code)]

pub mod buckets;
pub mod database;
pub mod error;
pub mod games;
pub mod schema;

pub use buckets::{BucketStore, Entry};
pub use database::Database;
pub use error::StoreError;
pub use games::{GameRecord, GameRepo, PositionStore, Positions};
