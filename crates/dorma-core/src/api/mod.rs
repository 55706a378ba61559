//! Session client for the Dorma portal.
//!
//! One logical session goes Unauthenticated -> Authenticated ->
//! Terminated: login issues the session cookie, the bookings fetch
//! uses it, logout invalidates it. The portal authenticates via NTLM;
//! the handshake lives in [`ntlm`] and is driven transparently by the
//! client.

pub mod client;
pub mod ntlm;

pub use client::DormaClient;
