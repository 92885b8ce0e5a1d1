//! Error types for key loading.

use std::io;
use std::path::{Path, PathBuf};

/// Why a key could not be turned into a signing identity.
///
/// Wrong passwords and corrupted ciphertext both surface as
/// [`DecryptionFailed`](Self::DecryptionFailed).  Callers must not expect to
/// tell them apart.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyErrorKind {
    #[error("unable to read key file: {0}")]
    FileUnreadable(#[from] io::Error),

    #[error("no PEM block found")]
    NoPemBlock,

    #[error("no password provided for encrypted key")]
    NoPasswordSupplied,

    #[error("decryption failed (wrong password or corrupted key)")]
    DecryptionFailed,

    #[error("unsupported private key type {0:?}")]
    UnsupportedKeyType(String),

    #[error("malformed {label}: {reason}")]
    MalformedKeyStructure { label: String, reason: String },
}

impl KeyErrorKind {
    pub(crate) fn malformed(label: &str, reason: impl std::fmt::Display) -> Self {
        Self::MalformedKeyStructure {
            label: label.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A [`KeyErrorKind`] together with the file that produced it.
///
/// Every failure of [`KeyPair::signer`](crate::KeyPair::signer) is returned as
/// a `KeyError`; nothing is swallowed or retried.
#[derive(Debug, thiserror::Error)]
#[error("key error {path:?}: {kind}")]
pub struct KeyError {
    path: PathBuf,
    #[source]
    kind: KeyErrorKind,
}

impl KeyError {
    pub fn new(path: impl Into<PathBuf>, kind: KeyErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// The key file the error originated from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &KeyErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> KeyErrorKind {
        self.kind
    }
}
