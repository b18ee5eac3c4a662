//! ork-backup — one-way mirror of the PKI directory to object storage.
//!
//! The mirror shells out to `aws s3 sync --delete` rather than linking an
//! S3 client: the CLI already implements diffing and deletion of objects
//! that disappeared locally. Objects are written with the
//! `bucket-owner-full-control` ACL so the bucket owner keeps full control
//! when the bucket lives in another account.
//!
//! A failed sync is reported to the caller, which logs it and moves on;
//! the next cycle that changes a key syncs the then-current state.

pub mod error;
pub mod s3;

use std::future::Future;
use std::pin::Pin;

pub use error::{BackupError, BackupResult};
pub use ork_core::BackupTarget;
pub use s3::S3Sync;

/// Boxed future alias for backup operations.
pub type BackupFuture<'a> = Pin<Box<dyn Future<Output = BackupResult<()>> + Send + 'a>>;

pub trait Backup: Send + Sync {
    /// Mirror the trust-store directory to `target`.
    fn sync<'a>(&'a self, target: &'a BackupTarget) -> BackupFuture<'a>;
}
