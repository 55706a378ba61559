//! Core library for dorma - a client for Dorma time-tracking portals.
//!
//! The portal is a legacy ASP.NET application behind NTLM
//! authentication. One fetch is three sequential HTTP exchanges
//! (login, current bookings, logout) followed by a regex scan of the
//! returned HTML:
//!
//! - [`store::LocalStore`]: host and credential mappings persisted as
//!   JSON files under a per-user config directory
//! - [`prompt`]: terminal input for values missing from the store
//! - [`api::DormaClient`]: the login/fetch/logout session flow
//! - [`parse::parse_entries`]: HTML table rows into [`Entry`] values

pub mod api;
pub mod error;
pub mod models;
pub mod parse;
pub mod prompt;
pub mod store;

pub use api::DormaClient;
pub use error::DormaError;
pub use models::{Credential, Entry, EntryType};
pub use store::LocalStore;
