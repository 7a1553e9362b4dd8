//! AniMuse Shared Types and Utilities
//!
//! This crate contains the persisted credential records and database
//! utilities shared across the AniMuse platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
