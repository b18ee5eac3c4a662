//! ork-core — configuration and message decoding shared by the orkd crates.

pub mod config;
pub mod event;

pub use config::{BackupTarget, DEFAULT_CONFIG_PATH, OrkConfig};
pub use event::{EventKind, ParsedEvent, parse_message};
