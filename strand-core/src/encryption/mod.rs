//! Encryption subsystem
//!
//! - Fixed-size keys and nonces
//! - Authenticated encryption for the supported cipher suites
//! - Root key store with deterministic per-object key derivation

pub mod cipher;
pub mod key;
pub mod store;

pub use cipher::*;
pub use key::*;
pub use store::*;
