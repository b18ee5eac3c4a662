//! aws_ork.conf configuration parser.
//!
//! The file is a flat YAML mapping (`QueueName: SaltMasterQueue`). Every
//! key is optional: keys present in the file overlay the built-in
//! defaults, absent keys keep their default, and unrecognised keys are
//! ignored. An empty file is the same as no file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Location read when no `--config` flag is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/aws_ork.conf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrkConfig {
    #[serde(rename = "SQS_Region")]
    pub sqs_region: String,
    #[serde(rename = "QueueName")]
    pub queue_name: String,
    /// Seconds to sleep between poll cycles.
    #[serde(rename = "PollPause")]
    pub poll_pause: u64,
    #[serde(rename = "BucketUrl")]
    pub bucket_url: Option<String>,
    #[serde(rename = "BucketRegion")]
    pub bucket_region: Option<String>,
    #[serde(rename = "DeleteUnknownMessages")]
    pub delete_unknown_messages: bool,
    /// Root of the Salt PKI tree, mirrored verbatim by the backup.
    #[serde(rename = "PkiDir")]
    pub pki_dir: PathBuf,
}

impl Default for OrkConfig {
    fn default() -> Self {
        Self {
            sqs_region: "us-west-2".to_string(),
            queue_name: "SaltMasterTestQueue".to_string(),
            poll_pause: 0,
            bucket_url: None,
            bucket_region: None,
            delete_unknown_messages: true,
            pki_dir: PathBuf::from("/etc/salt/pki"),
        }
    }
}

/// Where the PKI directory is mirrored after a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    pub url: String,
    pub region: Option<String>,
}

impl OrkConfig {
    /// Strict parse: fails on unreadable or malformed files.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: OrkConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config at `path`, falling back to defaults.
    ///
    /// A missing file is normal (defaults are used silently); a file that
    /// exists but cannot be read or parsed is logged and also yields
    /// defaults. This never fails.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not load config, using defaults"
                );
                Self::default()
            }
        }
    }

    pub fn poll_pause(&self) -> Duration {
        Duration::from_secs(self.poll_pause)
    }

    /// The backup target, present only when `BucketUrl` is set.
    pub fn backup_target(&self) -> Option<BackupTarget> {
        self.bucket_url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| BackupTarget {
                url: url.clone(),
                region: self.bucket_region.clone(),
            })
    }
}
