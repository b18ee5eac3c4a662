//! Filesystem key store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{KeyError, KeyResult};

/// The state directory a minion key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Accepted,
    Pending,
    Rejected,
    Denied,
}

impl KeyState {
    pub const ALL: [KeyState; 4] = [
        KeyState::Accepted,
        KeyState::Pending,
        KeyState::Rejected,
        KeyState::Denied,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            KeyState::Accepted => "minions",
            KeyState::Pending => "minions_pre",
            KeyState::Rejected => "minions_rejected",
            KeyState::Denied => "minions_denied",
        }
    }
}

/// Minion ids whose keys an accept call moved to the accepted set.
///
/// Empty when there was no pending key to accept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accepted {
    pub minions: Vec<String>,
}

impl Accepted {
    pub fn is_empty(&self) -> bool {
        self.minions.is_empty()
    }
}

/// Trust key operations used by the event dispatcher.
pub trait KeyStore: Send + Sync {
    /// Accept the pending key of `id`.
    ///
    /// A missing pending key is not an error; it yields an empty
    /// [`Accepted`].
    fn accept(&self, id: &str) -> KeyResult<Accepted>;

    /// Delete every key of `id`, returning the states it was removed from.
    ///
    /// Deleting a key that does not exist succeeds with an empty list.
    fn delete(&self, id: &str) -> KeyResult<Vec<KeyState>>;
}

/// Key store over `<pki_dir>/master`.
#[derive(Debug, Clone)]
pub struct PkiKeyStore {
    master_dir: PathBuf,
}

impl PkiKeyStore {
    pub fn new(pki_dir: impl AsRef<Path>) -> Self {
        Self {
            master_dir: pki_dir.as_ref().join("master"),
        }
    }

    pub fn master_dir(&self) -> &Path {
        &self.master_dir
    }

    pub fn key_path(&self, state: KeyState, id: &str) -> PathBuf {
        self.master_dir.join(state.dir_name()).join(id)
    }

    /// The state `id` is currently in, checking accepted first.
    pub fn state_of(&self, id: &str) -> KeyResult<Option<KeyState>> {
        validate_id(id)?;
        Ok(KeyState::ALL
            .into_iter()
            .find(|state| self.key_path(*state, id).is_file()))
    }

    /// Minion ids in one state, sorted.
    pub fn list(&self, state: KeyState) -> KeyResult<Vec<String>> {
        let dir = self.master_dir.join(state.dir_name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(state.dir_name(), e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(state.dir_name(), e))?;
            if entry.path().is_file() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl KeyStore for PkiKeyStore {
    fn accept(&self, id: &str) -> KeyResult<Accepted> {
        validate_id(id)?;

        let pending = self.key_path(KeyState::Pending, id);
        if !pending.is_file() {
            debug!(minion = id, "no pending key");
            return Ok(Accepted::default());
        }

        let accepted_dir = self.master_dir.join(KeyState::Accepted.dir_name());
        fs::create_dir_all(&accepted_dir).map_err(|e| io_error(id, e))?;

        match fs::rename(&pending, accepted_dir.join(id)) {
            Ok(()) => {}
            // Someone else moved it between the check and the rename.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Accepted::default()),
            Err(e) => return Err(io_error(id, e)),
        }

        debug!(minion = id, "moved key to accepted");
        Ok(Accepted {
            minions: vec![id.to_string()],
        })
    }

    fn delete(&self, id: &str) -> KeyResult<Vec<KeyState>> {
        validate_id(id)?;

        let mut removed = Vec::new();
        for state in KeyState::ALL {
            match fs::remove_file(self.key_path(state, id)) {
                Ok(()) => removed.push(state),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(id, e)),
            }
        }

        debug!(minion = id, states = ?removed, "deleted key");
        Ok(removed)
    }
}

/// Minion ids name files directly, so they must stay a single path component.
fn validate_id(id: &str) -> KeyResult<()> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
    {
        return Err(KeyError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn io_error(id: &str, source: std::io::Error) -> KeyError {
    KeyError::Io {
        id: id.to_string(),
        source,
    }
}
