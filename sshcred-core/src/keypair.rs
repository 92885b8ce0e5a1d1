//! Key references and the load pipeline.
//!
//! ```text
//! KeyPair::signer
//!   read file ─► pem::decode ─► is_encrypted?
//!                                 │ yes: label ─► password ─► decrypt ─► PemKeyType::parse
//!                                 │ no:  OPENSSH / PKCS#8 generic parser, or PemKeyType::parse
//!                                 ▼
//!                           SigningIdentity
//! ```
//!
//! Any failure is returned as a [`KeyError`] naming the file.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ssh_key::private::KeypairData;
use tracing::debug;
use zeroize::Zeroizing;

use crate::debug::{DebugSink, debug_log};
use crate::decrypt;
use crate::dispatch::{self, OPENSSH_LABEL, PKCS8_LABEL, PemKeyType};
use crate::error::{KeyError, KeyErrorKind};
use crate::pem::{self, PemBlock};
use crate::signer::SigningIdentity;

/// A private key file, optionally paired with the password that decrypts it.
///
/// Immutable once built.  The password lives in a zeroizing buffer and is only
/// read by the decryption step.
#[derive(Clone)]
pub struct KeyPair {
    path: PathBuf,
    password: Option<Zeroizing<Vec<u8>>>,
    debug: Option<Arc<dyn DebugSink>>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("path", &self.path)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// A key file that is not password-protected.
    pub fn key(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            password: None,
            debug: None,
        }
    }

    /// A password-protected key file.
    pub fn encrypted_key(path: impl Into<PathBuf>, password: impl AsRef<[u8]>) -> Self {
        Self {
            path: path.into(),
            password: Some(Zeroizing::new(password.as_ref().to_vec())),
            debug: None,
        }
    }

    /// A key file relative to the current user's `~/.ssh`.
    pub fn user_key(name: impl AsRef<Path>) -> Self {
        Self::key(ssh_dir(name))
    }

    /// A password-protected key file relative to the current user's `~/.ssh`.
    pub fn encrypted_user_key(name: impl AsRef<Path>, password: impl AsRef<[u8]>) -> Self {
        Self::encrypted_key(ssh_dir(name), password)
    }

    /// Route this key's diagnostics to `sink` instead of the process-wide one.
    pub fn with_debug(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug = Some(sink);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Load the key and return a ready-to-use signing identity.
    ///
    /// Each call re-reads the file; no state is kept between calls.
    pub fn signer(&self) -> Result<SigningIdentity, KeyError> {
        self.load().map_err(|kind| {
            debug_log!(
                self.debug.as_ref(),
                "key {} failed to load: {kind}",
                self.path.display()
            );
            KeyError::new(&self.path, kind)
        })
    }

    fn load(&self) -> Result<SigningIdentity, KeyErrorKind> {
        let contents = Zeroizing::new(fs::read(&self.path)?);
        let block = pem::decode(&contents).ok_or(KeyErrorKind::NoPemBlock)?;

        debug!(
            path = %self.path.display(),
            label = %block.label,
            encrypted = block.is_encrypted(),
            "found PEM block"
        );

        if block.is_encrypted() {
            self.load_encrypted(&block)
        } else {
            self.load_plain(&block)
        }
    }

    fn load_encrypted(&self, block: &PemBlock) -> Result<SigningIdentity, KeyErrorKind> {
        // The label decides the parser before any password is involved, so
        // unsupported encrypted blocks fail the same way with or without one.
        let key_type = PemKeyType::from_label(&block.label)?;
        let password = self
            .password
            .as_ref()
            .ok_or(KeyErrorKind::NoPasswordSupplied)?;

        let der = decrypt::decrypt_block(block, password)?;

        // A wrong password occasionally yields valid padding; the garbage that
        // follows must not be reported differently from a padding failure.
        let key_data = key_type
            .parse(&der)
            .map_err(|_| KeyErrorKind::DecryptionFailed)?;
        self.identity(key_data, key_type.label())
    }

    fn load_plain(&self, block: &PemBlock) -> Result<SigningIdentity, KeyErrorKind> {
        match block.label.as_str() {
            OPENSSH_LABEL => {
                let mut key = dispatch::parse_openssh(&block.body)?;
                if key.comment().is_empty() {
                    key.set_comment(self.path.display().to_string());
                }
                SigningIdentity::from_private_key(key)
                    .map_err(|e| KeyErrorKind::malformed(OPENSSH_LABEL, e))
            }
            PKCS8_LABEL => {
                let key_data = dispatch::parse_pkcs8(&block.body)?;
                self.identity(key_data, PKCS8_LABEL)
            }
            label => {
                let key_type = PemKeyType::from_label(label)?;
                let key_data = key_type.parse(&block.body)?;
                self.identity(key_data, key_type.label())
            }
        }
    }

    fn identity(&self, key_data: KeypairData, label: &str) -> Result<SigningIdentity, KeyErrorKind> {
        SigningIdentity::new(key_data, self.path.display().to_string())
            .map_err(|e| KeyErrorKind::malformed(label, e))
    }
}

/// Resolve `file` inside the current user's `~/.ssh` directory.
///
/// If the home directory cannot be determined, `file` is returned unchanged
/// and a diagnostic is emitted.
pub fn ssh_dir(file: impl AsRef<Path>) -> PathBuf {
    resolve_ssh_dir(dirs::home_dir(), file.as_ref(), None)
}

fn resolve_ssh_dir(
    home: Option<PathBuf>,
    file: &Path,
    sink: Option<&Arc<dyn DebugSink>>,
) -> PathBuf {
    let Some(home) = home else {
        debug_log!(
            sink,
            "unable to find current user's home directory; using {} as given",
            file.display()
        );
        return file.to_path_buf();
    };

    let mut path = home.join(".ssh");
    // `~/.ssh/<file>` even when `file` looks absolute.
    path.extend(
        file.components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_))),
    );
    clean(&path)
}

/// Lexically normalise `path`: drop `.` and resolve `..` where possible.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}
