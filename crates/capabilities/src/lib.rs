//! Capability servers for chatgate.
//!
//! A capability server is a remote tool host speaking three endpoints:
//! `GET /tools`, `GET /tools-props` and `POST /tools-execute`. The
//! [`CapabilityClient`] asks every active server at once and merges what
//! comes back; the [`ServerDirectory`] works out which servers are active
//! for a user.

pub mod client;
pub mod directory;

pub use client::CapabilityClient;
pub use directory::ServerDirectory;
