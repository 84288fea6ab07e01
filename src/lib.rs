//! Taproom - admin endpoints for a keg inventory
//!
//! Three POST endpoints guarded by a shared admin secret:
//! - `/adjust` changes a tap's remaining pours by a signed delta, clamped at zero
//! - `/pour` logs a pour through the store's `log_pour_and_decrement` procedure
//! - `/tap-new` registers a newly tapped keg
//!
//! Persistence lives in a hosted Postgres reached through its REST interface.

pub mod api;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
