//! AniMuse API
//!
//! Credential and session lifecycle backend: password and OAuth sign-in,
//! JWT access/refresh pairs with rotation, and encrypted at-rest storage of
//! user-supplied AniList API keys.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
