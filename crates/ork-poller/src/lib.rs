//! ork-poller — the orkd service loop.
//!
//! # Architecture
//!
//! ```text
//! run()
//!   ├── OrkConfig::load
//!   ├── connect (SqsQueue) ── None ──▶ PollerError::Connect
//!   ├── purge (optional)
//!   └── Poller loop
//!       ├── receive ≤10 messages, 20s long poll
//!       │     └── error ──▶ back off (1s doubling, 60s cap), retry
//!       ├── parse_message → Dispatcher::dispatch → Outcome
//!       ├── mutated? && backup target? → Backup::sync
//!       └── sleep PollPause
//! ```
//!
//! A message is deleted only when it was handled: the key action
//! succeeded, it was a test notification, or it was unknown and the
//! config says to drop unknown messages. Anything else stays in the
//! queue and is redelivered.

pub mod dispatcher;
pub mod error;
pub mod poller;

pub use dispatcher::{Dispatcher, Outcome};
pub use error::{PollerError, PollerResult};
pub use poller::{CycleReport, Poller, RunOptions, receive_backoff, run, run_with};
