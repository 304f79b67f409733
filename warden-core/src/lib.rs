//! Warden core library — domain types, policy-document persistence, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs
//! - [`error`] — [`StoreError`]
//! - [`policy`] — read / write one value in a YAML policy document
//!
//! Everything here is synchronous; the async store adapter and the watchdog
//! live in `warden-daemon`.

pub mod error;
pub mod policy;
pub mod types;

pub use error::StoreError;
pub use types::{ChangeEvent, ServiceState, ValueName, WatchedValue};
