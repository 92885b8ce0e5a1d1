//! Load SSH private keys from disk and turn them into signing identities.
//!
//! ```no_run
//! use sshcred_core::KeyPair;
//!
//! let identity = KeyPair::encrypted_user_key("id_rsa", "hunter2").signer()?;
//! println!("{}", identity.public_key_openssh()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Supported formats: PKCS#1 RSA, SEC1 EC, OpenSSL DSA (plain or with legacy
//! `DEK-Info` encryption), unencrypted PKCS#8 and unencrypted OpenSSH keys.

pub mod config;
pub mod debug;
pub mod decrypt;
pub mod dispatch;
pub mod error;
pub mod keypair;
pub mod pem;
pub mod signer;

pub use debug::{DebugSink, StderrSink, clear_debug, set_debug, set_debug_arc};
pub use dispatch::PemKeyType;
pub use error::{KeyError, KeyErrorKind};
pub use keypair::{KeyPair, ssh_dir};
pub use signer::SigningIdentity;

/// Serializes tests that install or clear the process-wide debug sink.
#[cfg(test)]
pub(crate) static TEST_GLOBAL_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
