//! `aws s3 sync` invocation.

use std::ffi::OsString;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, info};

use crate::{Backup, BackupError, BackupFuture, BackupTarget};

/// Prepended to `PATH` so a pip-installed CLI is found under init systems
/// that start daemons with a minimal environment.
const EXTRA_PATH: &str = "/usr/local/bin";

/// Mirrors a local directory with the aws CLI.
#[derive(Debug, Clone)]
pub struct S3Sync {
    program: PathBuf,
    source: PathBuf,
}

impl S3Sync {
    /// Sync `source` using the `aws` binary found on `PATH`.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("aws"),
            source: source.into(),
        }
    }

    /// Use a specific CLI binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to the CLI, without the program itself.
    pub fn args(&self, target: &BackupTarget) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["s3".into()];
        if let Some(region) = &target.region {
            args.push("--region".into());
            args.push(region.into());
        }
        args.extend(
            ["sync", "--delete", "--acl", "bucket-owner-full-control"]
                .into_iter()
                .map(OsString::from),
        );
        args.push(self.source.clone().into_os_string());
        args.push(target.url.clone().into());
        args
    }
}

impl Backup for S3Sync {
    fn sync<'a>(&'a self, target: &'a BackupTarget) -> BackupFuture<'a> {
        Box::pin(async move {
            let args = self.args(target);
            debug!(
                program = %self.program.display(),
                args = ?args,
                "executing pki sync"
            );

            let output = Command::new(&self.program)
                .args(&args)
                .env("PATH", search_path())
                .output()
                .await
                .map_err(|source| BackupError::Spawn {
                    program: self.program.display().to_string(),
                    source,
                })?;

            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            if !output.status.success() {
                return Err(BackupError::Failed {
                    code: output.status.code().unwrap_or(-1),
                    output: combined.trim().to_string(),
                });
            }

            info!(url = %target.url, output = %combined.trim(), "synced pki to S3");
            Ok(())
        })
    }
}

fn search_path() -> OsString {
    let mut path = OsString::from(EXTRA_PATH);
    if let Some(existing) = std::env::var_os("PATH") {
        path.push(":");
        path.push(existing);
    }
    path
}
