//! Poof core logic.
//!
//! Pure building blocks for a burn-after-reading secret service. Nothing in
//! this crate performs I/O: the storage backends and the HTTP surface live in
//! `poof-server` and plug in a concrete [`Environment`].
//!
//! # Keys
//!
//! Secrets are addressed by content, not by a random identifier:
//!
//! ```text
//! key = SHA-256(seed || ciphertext)
//! ```
//!
//! The seed is private to a store instance (or persisted alongside a durable
//! store) so keys cannot be precomputed from a known ciphertext. Keys travel
//! over the wire as URL-safe base64 without padding.
//!
//! # Components
//!
//! - [`Key`], [`Seed`]: content-addressed identifiers and their derivation
//! - [`Environment`]: wall clock, async sleep and OS randomness
//! - [`validate`]: the request rules applied before a store is ever called

#![forbid(unsafe_code)]

pub mod env;
mod error;
mod key;
pub mod validate;

pub use env::Environment;
pub use error::KeyError;
pub use key::{KEY_SIZE, Key, SEED_SIZE, Seed};
