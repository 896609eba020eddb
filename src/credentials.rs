//! Credential persistence.
//!
//! The credential is the only state that outlives the process.  A
//! [`FileCredentialStore`] keeps it in a JSON file readable only by the owner;
//! [`MemoryCredentialStore`] keeps it for the lifetime of the process.
//! Tokens are never logged.

use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::sync::{Mutex, PoisonError};

use utf8path::Path;

use crate::error::{Error, Result};
use crate::types::Credential;

/// File name of the persisted credential.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Where the credential lives between runs.
pub trait CredentialStore: Debug + Send + Sync {
    /// Load the stored credential, if any.
    fn load(&self) -> Result<Option<Credential>>;

    /// Replace the stored credential.
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential.  Clearing an empty store succeeds.
    fn clear(&self) -> Result<()>;
}

/// A credential store that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a credential.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// A credential store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: Path<'static>,
}

impl FileCredentialStore {
    /// Store the credential at `path`.
    pub fn new(path: Path<'static>) -> Self {
        Self { path }
    }

    /// Store the credential in the default location.
    ///
    /// That is `$SMARTASSET_HOME/credentials.json`, or
    /// `~/.config/smartasset/credentials.json` when the variable is unset.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(default_path()?))
    }

    /// The file this store reads and writes.
    pub fn path(&self) -> &Path<'static> {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let contents = match fs::read_to_string(self.path.as_str()) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::io(
                    format!("failed to read credentials from {}", self.path.as_str()),
                    err,
                ));
            }
        };
        let credential = serde_json::from_str(&contents).map_err(|err| {
            Error::serialization(
                format!("failed to parse credentials in {}", self.path.as_str()),
                Some(Box::new(err)),
            )
        })?;
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = std::path::Path::new(self.path.as_str()).parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::io(
                    format!("failed to create directory {}", parent.display()),
                    err,
                )
            })?;
        }
        let contents = serde_json::to_string_pretty(credential)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(self.path.as_str()).map_err(|err| {
            Error::io(
                format!("failed to open {} for writing", self.path.as_str()),
                err,
            )
        })?;
        file.write_all(contents.as_bytes())
            .map_err(|err| Error::io(format!("failed to write {}", self.path.as_str()), err))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.path.as_str()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(
                format!("failed to remove {}", self.path.as_str()),
                err,
            )),
        }
    }
}

/// The default credential path.
pub fn default_path() -> Result<Path<'static>> {
    if let Ok(home) = std::env::var("SMARTASSET_HOME") {
        return Ok(Path::from(home.as_str()).join(CREDENTIALS_FILE).into_owned());
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::config("could not determine home directory"))?;
    let home = home
        .to_str()
        .ok_or_else(|| Error::encoding("home directory is not valid UTF-8", None))?;
    Ok(Path::from(home)
        .join(".config")
        .join("smartasset")
        .join(CREDENTIALS_FILE)
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_path(name: &str) -> Path<'static> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir().join(format!(
            "smartasset-{name}-{}-{nanos}",
            std::process::id()
        ));
        Path::from(dir.to_str().unwrap())
            .join(CREDENTIALS_FILE)
            .into_owned()
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&Credential::new("a", "r")).unwrap();
        assert_eq!(store.load().unwrap(), Some(Credential::new("a", "r")));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let store = FileCredentialStore::new(scratch_path("missing"));
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = scratch_path("reopen");
        let store = FileCredentialStore::new(path.clone());
        store.save(&Credential::new("access", "refresh")).unwrap();

        let reopened = FileCredentialStore::new(path.clone());
        assert_eq!(
            reopened.load().unwrap(),
            Some(Credential::new("access", "refresh"))
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(path.as_str()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        reopened.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let path = scratch_path("corrupt");
        let store = FileCredentialStore::new(path.clone());
        store.save(&Credential::new("a", "r")).unwrap();
        fs::write(path.as_str(), "not json").unwrap();
        assert!(store.load().is_err());
        store.clear().unwrap();
    }
}
