//! SSH private key resolution

use std::env;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tracing::debug;

/// Where the private key for a remote target comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Explicit path to a key file
    Path(PathBuf),
    /// Name of an environment variable holding a base64-encoded key
    Env(String),
}

impl KeySource {
    /// Resolve the key source to a file on disk
    ///
    /// For `Env`, decodes base64 and writes the key to an owner-only temp file
    /// that is removed when the returned `ResolvedKey` is dropped.
    ///
    /// # Errors
    /// Returns `KeyError` if the file is missing or too open, or the
    /// environment variable is unset or not valid base64.
    pub fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        match self {
            KeySource::Path(path) => {
                validate_key_permissions(path)?;
                Ok(ResolvedKey::Path(path.clone()))
            }
            KeySource::Env(var_name) => {
                let base64_key =
                    env::var(var_name).map_err(|_| KeyError::EnvNotSet(var_name.clone()))?;
                let key_data = base64_decode(&base64_key).map_err(|_| KeyError::InvalidBase64)?;

                let temp_path = write_temp_key(&key_data)?;
                Ok(ResolvedKey::Temp(temp_path))
            }
        }
    }
}

/// Resolved key location
#[derive(Debug)]
pub enum ResolvedKey {
    /// Path to key file
    Path(PathBuf),
    /// Temporary file (deleted on drop)
    Temp(TempPath),
}

impl ResolvedKey {
    /// Path handed to the SSH library
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ResolvedKey::Path(p) => p.as_path(),
            ResolvedKey::Temp(p) => &**p,
        }
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KeyError::NotFound(path.display().to_string())
        } else {
            KeyError::Io(e)
        }
    })?;

    // group and other bits must be clear
    if metadata.permissions().mode() & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

/// Write key material to a uniquely named file, created with mode 0600
fn write_temp_key(key_data: &[u8]) -> Result<TempPath, KeyError> {
    let mut file = tempfile::Builder::new()
        .prefix("rigger_ssh_key_")
        .tempfile()?;
    file.write_all(key_data)?;
    file.flush()?;

    let temp_path = file.into_temp_path();
    debug!(path = %temp_path.display(), "wrote temporary SSH key");

    Ok(temp_path)
}
