//! ork-keys — minion key management over the Salt master PKI tree.
//!
//! # Layout
//!
//! ```text
//! <pki_dir>/master/
//!   ├── minions/            accepted keys
//!   ├── minions_pre/        pending keys, waiting for acceptance
//!   ├── minions_rejected/
//!   └── minions_denied/
//! ```
//!
//! Each key is a file named after the minion id. Accepting a key moves it
//! from `minions_pre` to `minions`; deleting removes it from every state.

pub mod error;
pub mod store;

pub use error::{KeyError, KeyResult};
pub use store::{Accepted, KeyState, KeyStore, PkiKeyStore};
